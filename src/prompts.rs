//! Prompt construction for translation and repair requests

use crate::provider::BatchRequest;

/// Order in which known per-key context fields are rendered.
const CONTEXT_FIELDS: [&str; 5] = ["description", "tone", "screen", "domain", "notes"];

/// Human-readable name for a language code, falling back to the code
fn language_name(code: &str) -> &str {
    match code {
        "sv" => "Swedish",
        "en" => "English",
        "de" => "German",
        "fr" => "French",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "nl" => "Dutch",
        "pl" => "Polish",
        "ru" => "Russian",
        "ja" => "Japanese",
        "zh" => "Chinese",
        "ko" => "Korean",
        other => other,
    }
}

/// Escape backslashes so positional tokens display literally in the prompt
fn escape_for_prompt(text: &str) -> String {
    text.replace('\\', "\\\\")
}

/// Build the translation prompt for one batch
///
/// Lists every item as `- key: "text"`, appends per-key context in
/// parentheses when the memory carries any, and demands a JSON-only
/// response that preserves protected tokens exactly.
pub fn build_translation_prompt(request: &BatchRequest) -> String {
    let source_name = language_name(&request.source_lang);
    let target_name = language_name(&request.target_lang);

    let mut item_lines = Vec::with_capacity(request.items.len());
    for item in &request.items {
        let mut line = format!("- {}: \"{}\"", item.key, escape_for_prompt(&item.text));

        if let Some(context) = request.per_key_context.get(&item.key) {
            let rendered: Vec<String> = CONTEXT_FIELDS
                .iter()
                .filter_map(|field| {
                    context
                        .get(*field)
                        .map(|value| format!("{}: {}", capitalize(field), value))
                })
                .collect();
            if !rendered.is_empty() {
                line.push_str(&format!(" ({})", rendered.join("; ")));
            }
        }

        item_lines.push(line);
    }

    let context_section = match &request.global_context {
        Some(context) => format!("\nCONTEXT:\n{}\n", context),
        None => String::new(),
    };

    format!(
        "You are a translation API. Return ONLY valid JSON. No markdown, no commentary, no explanation.\n\
        \n\
        Translate these {source_name} strings to {target_name}:{context_section}\n\
        {items}\n\
        \n\
        RULES:\n\
        - Return ONLY the JSON object below. Nothing else.\n\
        - Preserve protected tokens EXACTLY: {{{{name}}}} stays {{{{name}}}}, \\1 stays \\\\1 in JSON\n\
        - Translate only the text around protected tokens\n\
        - Escape backslashes in JSON: \\1 becomes \\\\1\n\
        - Follow the context and tone guidelines provided above\n\
        \n\
        Return this exact JSON structure (replace with your translations):\n\
        {{\n\
        \x20 \"targetLanguage\": \"{target}\",\n\
        \x20 \"translations\": [\n\
        \x20   {{\"key\": \"error.404\", \"text\": \"Erreur \\\\1: Page non trouvée\"}}\n\
        \x20 ]\n\
        }}\n",
        source_name = source_name,
        target_name = target_name,
        context_section = context_section,
        items = item_lines.join("\n"),
        target = request.target_lang,
    )
}

/// Build a repair prompt embedding the prior invalid output
///
/// Used after a malformed response to coax a compliant one: the invalid
/// output, the validation error and the original request are all quoted
/// back to the model.
pub fn build_repair_prompt(invalid_response: &str, original_prompt: &str, error: &str) -> String {
    format!(
        "The previous translation response was invalid. Please fix it.\n\
        \n\
        ERROR: {error}\n\
        \n\
        INVALID RESPONSE:\n\
        {invalid_response}\n\
        \n\
        ORIGINAL REQUEST:\n\
        {original_prompt}\n\
        \n\
        Please provide a corrected JSON response that:\n\
        1. Is valid JSON (parseable)\n\
        2. Contains all required fields: targetLanguage, translations (array)\n\
        3. Each translation has \"key\" and \"text\" fields\n\
        4. All text fields are non-empty strings\n\
        5. Preserves protected tokens exactly as in the source\n\
        \n\
        Return ONLY the corrected JSON, no markdown, no commentary.\n",
    )
}

fn capitalize(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::BatchItem;
    use std::collections::BTreeMap;

    fn request(items: Vec<BatchItem>) -> BatchRequest {
        BatchRequest {
            source_lang: "sv".to_string(),
            target_lang: "de".to_string(),
            items,
            global_context: None,
            per_key_context: BTreeMap::new(),
        }
    }

    fn item(key: &str, text: &str) -> BatchItem {
        BatchItem {
            key: key.to_string(),
            text: text.to_string(),
            signature: String::new(),
        }
    }

    #[test]
    fn test_prompt_names_languages() {
        let prompt = build_translation_prompt(&request(vec![item("a", "Hej")]));
        assert!(prompt.contains("Swedish strings to German"));
        assert!(prompt.contains("\"targetLanguage\": \"de\""));
    }

    #[test]
    fn test_prompt_falls_back_to_language_code() {
        let mut req = request(vec![item("a", "Hej")]);
        req.target_lang = "xx".to_string();
        let prompt = build_translation_prompt(&req);
        assert!(prompt.contains("Swedish strings to xx"));
    }

    #[test]
    fn test_prompt_lists_items() {
        let prompt = build_translation_prompt(&request(vec![
            item("booking.confirm", "Bekräfta"),
            item("booking.cancel", "Avbryt"),
        ]));
        assert!(prompt.contains("- booking.confirm: \"Bekräfta\""));
        assert!(prompt.contains("- booking.cancel: \"Avbryt\""));
    }

    #[test]
    fn test_prompt_escapes_backslash_tokens() {
        let prompt = build_translation_prompt(&request(vec![item("e", "Fel \\1")]));
        assert!(prompt.contains("Fel \\\\1"));
    }

    #[test]
    fn test_prompt_includes_global_context() {
        let mut req = request(vec![item("a", "Hej")]);
        req.global_context = Some("Mobile app. Friendly tone.".to_string());
        let prompt = build_translation_prompt(&req);
        assert!(prompt.contains("CONTEXT:\nMobile app. Friendly tone."));
    }

    #[test]
    fn test_prompt_renders_per_key_context_fields_in_order() {
        let mut req = request(vec![item("cta", "Boka nu")]);
        let mut context = BTreeMap::new();
        context.insert("tone".to_string(), "urgent".to_string());
        context.insert("description".to_string(), "CTA button".to_string());
        context.insert("ignored".to_string(), "never shown".to_string());
        req.per_key_context.insert("cta".to_string(), context);

        let prompt = build_translation_prompt(&req);
        assert!(prompt.contains("(Description: CTA button; Tone: urgent)"));
        assert!(!prompt.contains("never shown"));
    }

    #[test]
    fn test_repair_prompt_embeds_prior_output_and_error() {
        let prompt = build_repair_prompt("{broken", "the original", "missing translations");
        assert!(prompt.contains("ERROR: missing translations"));
        assert!(prompt.contains("INVALID RESPONSE:\n{broken"));
        assert!(prompt.contains("ORIGINAL REQUEST:\nthe original"));
    }
}
