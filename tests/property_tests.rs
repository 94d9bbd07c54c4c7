/// Property-based tests using proptest
/// Tests invariants of the dialog and reply parsing for arbitrary inputs
use card_advisor_api::dialog::{IntakeDialog, Submission, UserIdentity};
use card_advisor_api::models::ProfileField;
use card_advisor_api::recommendation::{
    build_prompt, parse_recommendation, strip_code_fences, unparsed_fallback,
    FALLBACK_CARD_NAME, REASON_EXCERPT_CHARS,
};
use proptest::prelude::*;

fn chatting() -> IntakeDialog {
    let mut dialog = IntakeDialog::new();
    dialog.start().unwrap();
    dialog
        .enter_chat(UserIdentity {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
        })
        .unwrap();
    dialog
}

// Property: whitespace never moves the dialog
proptest! {
    #[test]
    fn whitespace_is_always_ignored(input in "[ \t\r\n]*") {
        let mut dialog = chatting();
        prop_assert_eq!(dialog.submit(&input).unwrap(), Submission::Ignored);
        prop_assert_eq!(dialog.question_index(), 0);
        prop_assert_eq!(dialog.transcript().len(), 2);
    }

    #[test]
    fn seven_answers_map_to_seven_keys(answers in prop::collection::vec("[a-zA-Z0-9$ ]{0,20}[a-zA-Z0-9$]", 7)) {
        let mut dialog = chatting();
        let mut completed = None;
        for answer in &answers {
            if let Submission::Complete(profile) = dialog.submit(answer).unwrap() {
                completed = Some(profile);
            }
        }

        let profile = completed.expect("seventh answer completes the profile");
        for (field, answer) in ProfileField::ALL.iter().zip(answers.iter()) {
            prop_assert_eq!(profile.get(*field), Some(answer.as_str()));
        }
    }
}

// Property: reply parsing never panics and fallbacks keep the fixed card
proptest! {
    #[test]
    fn fence_stripping_never_panics(reply in "\\PC*") {
        let cleaned = strip_code_fences(&reply);
        prop_assert_eq!(cleaned.trim(), cleaned.as_str());
    }

    #[test]
    fn non_json_replies_never_parse(reply in "[a-zA-Z ,.!]{1,200}") {
        prop_assert!(parse_recommendation(&reply).is_err());
        let fallback = unparsed_fallback(&reply);
        prop_assert_eq!(fallback.card_name, FALLBACK_CARD_NAME);
        prop_assert!(fallback.reason.chars().count() <= REASON_EXCERPT_CHARS);
    }

    #[test]
    fn prompt_always_lists_every_field(name in "\\PC{0,30}") {
        let prompt = build_prompt(&name, &Default::default());
        for field in ProfileField::ALL {
            let expected = format!("- {}: Not specified", field.label());
            prop_assert!(prompt.contains(&expected));
        }
    }
}
