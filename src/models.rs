use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============ Profile ============

/// One of the seven questionnaire answers, in the order they are asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    CardInMind,
    SpendingCategory,
    AnnualIncome,
    PaymentBehavior,
    RewardPreference,
    FeePreference,
    BonusImportance,
}

impl ProfileField {
    /// All fields in asking order.
    pub const ALL: [ProfileField; 7] = [
        ProfileField::CardInMind,
        ProfileField::SpendingCategory,
        ProfileField::AnnualIncome,
        ProfileField::PaymentBehavior,
        ProfileField::RewardPreference,
        ProfileField::FeePreference,
        ProfileField::BonusImportance,
    ];

    /// Storage key used in `conversation_data`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::CardInMind => "card_in_mind",
            Self::SpendingCategory => "spending_category",
            Self::AnnualIncome => "annual_income",
            Self::PaymentBehavior => "payment_behavior",
            Self::RewardPreference => "reward_preference",
            Self::FeePreference => "fee_preference",
            Self::BonusImportance => "bonus_importance",
        }
    }

    /// Label used when the profile is written into the advisor prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CardInMind => "Card Interest",
            Self::SpendingCategory => "Primary Spending",
            Self::AnnualIncome => "Annual Income",
            Self::PaymentBehavior => "Payment Behavior",
            Self::RewardPreference => "Reward Preference",
            Self::FeePreference => "Fee Preference",
            Self::BonusImportance => "Bonus Importance",
        }
    }

    /// Field asked at `index` (0-based), if any.
    pub fn at(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// The user's stated card preferences, keyed by [`ProfileField`].
///
/// Serializes to a flat JSON object holding only the answered keys.
/// Unknown keys are ignored on the way in, and non-string answers are read
/// as their text form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_answer")]
    pub card_in_mind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_answer")]
    pub spending_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_answer")]
    pub annual_income: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_answer")]
    pub payment_behavior: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_answer")]
    pub reward_preference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_answer")]
    pub fee_preference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_answer")]
    pub bonus_importance: Option<String>,
}

/// Accepts any JSON value as an answer. `null` means unanswered; anything
/// other than a string keeps its JSON text.
fn lenient_answer<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

impl Profile {
    pub fn get(&self, field: ProfileField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn set(&mut self, field: ProfileField, answer: impl Into<String>) {
        *self.slot_mut(field) = Some(answer.into());
    }

    /// Number of answered fields.
    pub fn answered(&self) -> usize {
        ProfileField::ALL
            .iter()
            .filter(|f| self.get(**f).is_some())
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.answered() == ProfileField::ALL.len()
    }

    fn slot(&self, field: ProfileField) -> &Option<String> {
        match field {
            ProfileField::CardInMind => &self.card_in_mind,
            ProfileField::SpendingCategory => &self.spending_category,
            ProfileField::AnnualIncome => &self.annual_income,
            ProfileField::PaymentBehavior => &self.payment_behavior,
            ProfileField::RewardPreference => &self.reward_preference,
            ProfileField::FeePreference => &self.fee_preference,
            ProfileField::BonusImportance => &self.bonus_importance,
        }
    }

    fn slot_mut(&mut self, field: ProfileField) -> &mut Option<String> {
        match field {
            ProfileField::CardInMind => &mut self.card_in_mind,
            ProfileField::SpendingCategory => &mut self.spending_category,
            ProfileField::AnnualIncome => &mut self.annual_income,
            ProfileField::PaymentBehavior => &mut self.payment_behavior,
            ProfileField::RewardPreference => &mut self.reward_preference,
            ProfileField::FeePreference => &mut self.fee_preference,
            ProfileField::BonusImportance => &mut self.bonus_importance,
        }
    }
}

// ============ Recommendation ============

/// A single-card suggestion, as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub card_name: String,
    pub issuer: String,
    pub reason: String,
    #[serde(default)]
    pub key_benefits: Vec<String>,
    #[serde(default)]
    pub apply_url: String,
}

/// Body of `POST /api/recommend`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendRequest {
    pub conversation_data: Profile,
    pub user_name: String,
}

/// Response of `POST /api/recommend`. `success` is always true; failures
/// upstream surface as the fallback recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub success: bool,
    pub recommendation: Recommendation,
}

// ============ Conversation record ============

/// Row of the `user_conversations` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub user_name: String,
    pub user_email: String,
    pub user_ip: String,
    pub consent_given: bool,
    pub conversation_data: Profile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_card_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ConversationRecord {
    /// Record written when the user consents: empty profile, no recommendation yet.
    pub fn at_consent(user_name: &str, user_email: &str, user_ip: &str) -> Self {
        Self {
            user_name: user_name.to_string(),
            user_email: user_email.to_string(),
            user_ip: user_ip.to_string(),
            consent_given: true,
            conversation_data: Profile::default(),
            recommended_card_name: None,
            recommendation_reason: None,
            created_at: None,
        }
    }
}

// ============ Intake transcript ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Bot,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }
}
