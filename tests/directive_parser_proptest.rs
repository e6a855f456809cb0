use proptest::prelude::*;

use zeno_backend::directive;

proptest! {
    // Text that never contains the directive marker passes through untouched.
    #[test]
    fn marker_free_text_is_unchanged(text in "[a-zA-Z0-9 ,!?\n]{0,200}") {
        prop_assume!(!text.to_lowercase().contains("[gen_img]"));
        let (cleaned, prompt) = directive::parse(&text);
        prop_assert_eq!(cleaned, text);
        prop_assert!(prompt.is_none());
    }

    // A well-formed directive (period-free, whitespace-free prompt body)
    // always yields its prompt back and strips the marker from the text.
    #[test]
    fn well_formed_directive_round_trips(
        before in "[a-zA-Z0-9 ]{0,40}",
        prompt in "[a-zA-Z0-9][a-zA-Z0-9 ]{0,60}[a-zA-Z0-9]",
    ) {
        prop_assume!(!before.to_lowercase().contains("[gen_img]"));
        let text = format!("{before} [GEN_IMG] {prompt}");
        let (cleaned, found) = directive::parse(&text);
        prop_assert_eq!(found.as_deref(), Some(prompt.as_str()));
        prop_assert!(!cleaned.to_lowercase().contains("[gen_img]"));
    }

    // Whatever the input, parsing never panics and the cleaned text never
    // grows beyond the original.
    #[test]
    fn parse_is_total_and_non_expanding(text in "\\PC{0,300}") {
        let (cleaned, _) = directive::parse(&text);
        prop_assert!(cleaned.len() <= text.len());
    }
}
