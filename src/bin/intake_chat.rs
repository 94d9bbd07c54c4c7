//! Runs the intake dialog in the terminal against the configured LLM and store.
//!
//! Pass `--no-pacing` to skip the cosmetic pauses between bot messages.

use card_advisor_api::config::Config;
use card_advisor_api::conversation_store;
use card_advisor_api::dialog::{ConsentForm, IntakeDialog, Submission, ANALYZING_MESSAGE};
use card_advisor_api::handlers::{finalize_record, START_CHAT_FAILED_MESSAGE};
use card_advisor_api::llm_client::AnthropicClient;
use card_advisor_api::models::{ChatMessage, ConversationRecord};
use card_advisor_api::obs;
use card_advisor_api::recommendation::RecommendationService;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const NEXT_QUESTION_PAUSE: Duration = Duration::from_millis(500);
const ANALYZING_PAUSE: Duration = Duration::from_secs(2);

struct Terminal {
    lines: Lines<BufReader<Stdin>>,
    pacing: bool,
}

impl Terminal {
    async fn ask(&mut self, prompt: &str) -> anyhow::Result<String> {
        println!("{}", prompt);
        match self.lines.next_line().await? {
            Some(line) => Ok(line),
            None => anyhow::bail!("input closed"),
        }
    }

    async fn pause(&self, duration: Duration) {
        if self.pacing {
            tokio::time::sleep(duration).await;
        }
    }

    fn show(&self, message: &ChatMessage) {
        println!("🤖 {}\n", message.text);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obs::init_tracing("card_advisor_api=warn");

    let config = Config::from_env()?;
    let recommender = RecommendationService::new(Arc::new(AnthropicClient::from_config(&config)));
    let store = conversation_store::connect(&config.store).await?;

    let mut term = Terminal {
        lines: BufReader::new(tokio::io::stdin()).lines(),
        pacing: !std::env::args().any(|a| a == "--no-pacing"),
    };

    let mut dialog = IntakeDialog::new();
    println!("Find Your Perfect Credit Card\nSmart AI-powered recommendations in minutes\n");
    term.ask("Press Enter to start the chat.").await?;
    dialog.start()?;

    // Consent: repeat until the form is complete and the record is stored.
    loop {
        let form = ConsentForm {
            user_name: term.ask("Your name:").await?,
            user_email: term.ask("Email address:").await?,
            consent: term
                .ask("I understand this is an educational tool, not financial advice, and consent to my data being stored. [y/N]")
                .await?
                .trim()
                .eq_ignore_ascii_case("y"),
        };

        let identity = match form.validate() {
            Ok(identity) => identity,
            Err(e) => {
                println!("⚠️  {}\n", e);
                continue;
            }
        };

        let record = ConversationRecord::at_consent(&identity.name, &identity.email, "127.0.0.1");
        if let Err(e) = store.insert(&record).await {
            tracing::error!("Error saving user data: {}", e);
            println!("⚠️  {}\n", START_CHAT_FAILED_MESSAGE);
            continue;
        }

        for message in dialog.enter_chat(identity)? {
            term.show(message);
        }
        break;
    }

    let profile = loop {
        let answer = term.ask("> ").await?;
        match dialog.submit(&answer)? {
            Submission::Ignored => continue,
            Submission::Next(question) => {
                term.pause(NEXT_QUESTION_PAUSE).await;
                term.show(&ChatMessage::bot(question));
            }
            Submission::Complete(profile) => break profile,
        }
    };

    term.show(&ChatMessage::bot(ANALYZING_MESSAGE));
    term.pause(ANALYZING_PAUSE).await;

    let (name, email) = dialog
        .user()
        .map(|u| (u.name.clone(), u.email.clone()))
        .ok_or_else(|| anyhow::anyhow!("chat finished without a user"))?;

    let recommendation = recommender.recommend(&name, &profile).await;
    if !finalize_record(store.as_ref(), &email, &profile, &recommendation).await {
        println!("⚠️  Your recommendation could not be saved.\n");
    }

    let closing = dialog.finish()?.clone();
    term.show(&closing);

    println!("✅ Recommendation for {}: {} ({})", name, recommendation.card_name, recommendation.issuer);
    println!("{}", recommendation.reason);
    for benefit in &recommendation.key_benefits {
        println!("  • {}", benefit);
    }
    println!("Apply: {}", recommendation.apply_url);

    Ok(())
}
