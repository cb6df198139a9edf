//! System prompts for single-line and batch translation and for batch review.

use crate::context::ContextMap;

/// Render context entries as a markdown list.
pub fn context_block(context: &ContextMap) -> String {
    if context.is_empty() {
        return "No additional context was provided.".to_string();
    }
    context
        .iter()
        .map(|(k, v)| format!("- {k}: {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt for translating one line given its neighbours and speaker.
pub fn line_system_prompt(context: &ContextMap, input_lang: &str, output_lang: &str) -> String {
    format!(
        "# Role

You are a professional assistant for translators working with foreign-language source material.
Your job is to produce accurate and nuanced translations that support high-quality human translation.

## Instructions

Translate the following {input_lang} text into {output_lang}.
Only output a fluent, idiomatic translation that sounds natural in {output_lang}.
Do not include literal or annotated versions, headings or labels.

When a Japanese personal name carries an honorific suffix (さん, くん, ちゃん, 様, 先輩, etc.),
romanize the name with Hepburn and keep the honorific after a hyphen (葛城さん -> Katsuragi-san).

Pay close attention to tone, speaker intent and social dynamics.
If the context gives the length of the current line in seconds, shorter lines should bias
toward more compact phrasing.

### Context

{context}

## Output Format

Only output the translated text. Do not add speaker names or labels.",
        context = context_block(context),
    )
}

/// Prompt for translating a numbered batch. Describes the line contract the
/// batch decoder depends on.
pub fn batch_system_prompt(context: &ContextMap, input_lang: &str, output_lang: &str) -> String {
    format!(
        "# Role

You are a professional assistant for translators working with foreign-language source material.

## Instructions

You will receive a batch of {input_lang} lines, each formatted as:
`N. Speaker (Xs): Line`

Translate each line into {output_lang}. Preserve the numbering, speaker label and time length exactly.
Only translate the text after the first colon.
Do not add or remove lines. Do not merge or split lines. Each output line must map 1:1 to the
input line with the same number.

When a Japanese personal name carries an honorific suffix (さん, くん, ちゃん, 様, 先輩, etc.),
romanize the name with Hepburn and keep the honorific after a hyphen (葛城さん -> Katsuragi-san).

Pay close attention to tone, speaker intent and social dynamics.
Keep inline formatting tags.

### Context

{context}

## Output Format

Output only the translated lines in the same `N. Speaker (Xs): Line` format, one per line.
Do not add headings, labels or commentary.",
        context = context_block(context),
    )
}

/// Prompt for reviewing a batch of `source => translation` pairs. Replies use
/// the same numbered line contract as batch translation.
pub fn review_system_prompt(context: &ContextMap, input_lang: &str, output_lang: &str) -> String {
    format!(
        "# Role

You are a professional translation reviewer. Your job is to check existing translations for accuracy and naturalness.

## Instructions

You will receive a batch of lines with both source and translated text, formatted as:
`N. Speaker (Xs): [SOURCE] => [TRANSLATION]`

Review each translation and output the corrected translation if needed.
If the translation is already correct, output it unchanged.

### IMPORTANT

- Preserve numbering, speaker label and time length exactly.
- Do not add or remove lines. Do not merge or split lines.
- The source text is in {input_lang}. The translation must be in {output_lang}.
- Only modify the translation text after `=>`.
- Output one line per input line in the same order.

### Context

{context}

## Output Format

`N. Speaker (Xs): [TRANSLATION]`",
        context = context_block(context),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_has_placeholder() {
        assert_eq!(context_block(&ContextMap::new()), "No additional context was provided.");
    }

    #[test]
    fn prompts_carry_languages_and_context() {
        let ctx = ContextMap::from([
            ("characters".to_string(), "Akemi, Rin".to_string()),
            ("current_speaker".to_string(), "Rin".to_string()),
        ]);
        let p = batch_system_prompt(&ctx, "ja", "en");
        assert!(p.contains("batch of ja lines"));
        assert!(p.contains("into en"));
        assert!(p.contains("- characters: Akemi, Rin\n- current_speaker: Rin"));
        assert!(line_system_prompt(&ctx, "ja", "pt-BR").contains("natural in pt-BR"));
        let review = review_system_prompt(&ctx, "ja", "en");
        assert!(review.contains("The source text is in ja. The translation must be in en."));
        assert!(review.contains("- current_speaker: Rin"));
    }
}
