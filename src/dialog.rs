//! Scripted intake dialog.
//!
//! A closed-world linear script: `landing -> consent -> chat -> thank_you`.
//! In the chat phase each non-blank answer fills the next [`ProfileField`]
//! and the next fixed question is emitted; after the seventh answer the
//! dialog hands out the completed profile for the recommendation step.

use crate::errors::AppError;
use crate::models::{ChatMessage, Profile, ProfileField};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const OPENING_QUESTION: &str = "I'm here to help you find the perfect credit card! What card do you have in mind, or are you exploring options?";

/// Asked after answers 1 through 6, in order.
pub const FOLLOW_UP_QUESTIONS: [&str; 6] = [
    "Great! What is your primary spending category? (e.g., groceries, gas, travel, dining, or general purchases)",
    "Perfect! What is your approximate annual income? (e.g., $40K, $60K, $80K, $100K+)",
    "Understood. Do you typically pay your balance in full each month, or do you carry a balance?",
    "Good to know! Are you interested in cashback rewards, travel points, or other specific benefits?",
    "Excellent! Do you have any preference for annual fees? (e.g., no fee, willing to pay for premium benefits)",
    "Last question! How important is a welcome bonus or signup offer to you? (very important, somewhat, not important)",
];

pub const ANALYZING_MESSAGE: &str =
    "🤔 Analyzing your responses and finding the best match for you...";

pub const CONSENT_REQUIRED_MESSAGE: &str = "Please fill all fields and accept terms";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Landing,
    Consent,
    Chat,
    ThankYou,
}

/// Contents of the consent form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsentForm {
    pub user_name: String,
    pub user_email: String,
    pub consent: bool,
}

/// Who is being advised, once consent has been given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub name: String,
    pub email: String,
}

impl ConsentForm {
    /// Checks that name, email and consent are all present.
    pub fn validate(&self) -> Result<UserIdentity, AppError> {
        let name = self.user_name.trim();
        let email = self.user_email.trim();

        if name.is_empty() || email.is_empty() || !self.consent {
            return Err(AppError::BadRequest(CONSENT_REQUIRED_MESSAGE.to_string()));
        }

        if !is_valid_email(email) {
            return Err(AppError::BadRequest(format!(
                "'{}' is not a valid email address",
                email
            )));
        }

        Ok(UserIdentity {
            name: name.to_string(),
            email: email.to_string(),
        })
    }
}

/// Email shape check with the same rule as an HTML `type=email` input:
/// a non-empty local part and one or more dot-separated domain labels.
pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    let re = EMAIL_RE.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .expect("email regex is valid")
    });
    re.is_match(email)
}

/// Outcome of one chat submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Blank input; nothing changed.
    Ignored,
    /// Answer stored; this is the next question.
    Next(&'static str),
    /// Seventh answer stored; the profile is ready for a recommendation.
    Complete(Profile),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeDialog {
    phase: Phase,
    user: Option<UserIdentity>,
    question_index: usize,
    profile: Profile,
    transcript: Vec<ChatMessage>,
    completed: bool,
}

impl Default for IntakeDialog {
    fn default() -> Self {
        Self::new()
    }
}

impl IntakeDialog {
    pub fn new() -> Self {
        Self {
            phase: Phase::Landing,
            user: None,
            question_index: 0,
            profile: Profile::default(),
            transcript: Vec::new(),
            completed: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    pub fn question_index(&self) -> usize {
        self.question_index
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), AppError> {
        if self.phase != expected {
            return Err(AppError::Conflict(format!(
                "intake is in phase {:?}, expected {:?}",
                self.phase, expected
            )));
        }
        Ok(())
    }

    /// Landing -> consent.
    pub fn start(&mut self) -> Result<(), AppError> {
        self.expect_phase(Phase::Landing)?;
        self.phase = Phase::Consent;
        Ok(())
    }

    /// Consent -> chat. Call only after the consent record has been stored.
    pub fn enter_chat(&mut self, identity: UserIdentity) -> Result<&[ChatMessage], AppError> {
        self.expect_phase(Phase::Consent)?;

        let start = self.transcript.len();
        self.transcript.push(ChatMessage::bot(format!(
            "Hi {}, my name is Sai - your AI assistant. How are you doing today? 😊",
            identity.name
        )));
        self.transcript.push(ChatMessage::bot(OPENING_QUESTION));

        self.user = Some(identity);
        self.question_index = 0;
        self.phase = Phase::Chat;

        Ok(&self.transcript[start..])
    }

    /// Records one answer and advances the script.
    pub fn submit(&mut self, input: &str) -> Result<Submission, AppError> {
        self.expect_phase(Phase::Chat)?;
        if self.completed {
            return Err(AppError::Conflict(
                "all questions have already been answered".to_string(),
            ));
        }

        if input.trim().is_empty() {
            return Ok(Submission::Ignored);
        }

        let field = ProfileField::at(self.question_index).ok_or_else(|| {
            AppError::InternalError(format!("no question at index {}", self.question_index))
        })?;

        self.transcript.push(ChatMessage::user(input));
        self.profile.set(field, input);

        match FOLLOW_UP_QUESTIONS.get(self.question_index) {
            Some(&next) => {
                self.transcript.push(ChatMessage::bot(next));
                self.question_index += 1;
                Ok(Submission::Next(next))
            }
            None => {
                self.completed = true;
                self.transcript.push(ChatMessage::bot(ANALYZING_MESSAGE));
                Ok(Submission::Complete(self.profile.clone()))
            }
        }
    }

    /// Chat -> thank you, once every question has been answered.
    pub fn finish(&mut self) -> Result<&ChatMessage, AppError> {
        self.expect_phase(Phase::Chat)?;
        if !self.completed {
            return Err(AppError::Conflict(format!(
                "{} of {} questions answered",
                self.profile.answered(),
                ProfileField::ALL.len()
            )));
        }

        let email = self.user.as_ref().map(|u| u.email.as_str()).unwrap_or("");
        self.transcript.push(ChatMessage::bot(format!(
            "✅ Perfect! I've analyzed your needs and found the ideal credit card for you.\n\n📧 I've sent a detailed recommendation with the card details and application link to {}.\n\nPlease check your email (including spam folder) for the full recommendation!",
            email
        )));
        self.phase = Phase::ThankYou;

        Ok(&self.transcript[self.transcript.len() - 1])
    }
}
