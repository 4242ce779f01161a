//! Best-effort extraction of structured fields from a model's raw reply.
//!
//! The model is asked for a bare JSON object but is not guaranteed to
//! produce one: replies arrive wrapped in prose, inside markdown fences, or
//! with broken quoting. Extraction therefore runs two strategies in order —
//! a direct parse of the outermost brace span, then independent per-field
//! pattern probes — and always returns a usable structure. Cosmetic
//! formatting problems must never fail a turn.

use crate::models::{OutputText, Sigillo};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Fields recovered from a raw model reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub output: OutputText,
    pub eco: Vec<String>,
    pub frase_finale: String,
    pub sigillo: Option<Sigillo>,
}

/// Longest prefix kept when no structure can be recovered at all.
const RAW_OUTPUT_LIMIT: usize = 300;

static OUTPUT_STRING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""output"\s*:\s*"([^"]*)""#).unwrap());
static OUTPUT_LIST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)"output"\s*:\s*\[(.*?)\]"#).unwrap());
static ECO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?s)"eco"\s*:\s*\[(.*?)\]"#).unwrap());
static FRASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""frase_finale"\s*:\s*"([^"]*)""#).unwrap());
static SIGILLO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)"sigillo"\s*:\s*(\{.*?\})"#).unwrap());

/// Extract `{output, eco, frase_finale, sigillo}` from raw model text.
/// Total: never fails, degrading field by field instead.
pub fn extract(raw: &str) -> Extracted {
    match parse_embedded_object(raw) {
        Some(value) => from_value(&value),
        None => from_patterns(raw),
    }
}

/// Primary strategy: parse the span from the first `{` to the last `}`.
fn parse_embedded_object(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

fn from_value(value: &Value) -> Extracted {
    Extracted {
        output: normalize_output(value.get("output")),
        eco: normalize_eco(value.get("eco")),
        frase_finale: value
            .get("frase_finale")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        sigillo: normalize_sigillo(value.get("sigillo")),
    }
}

/// Collapse the string-or-list union: empty list becomes empty text and a
/// singleton list unwraps to its element.
fn normalize_output(value: Option<&Value>) -> OutputText {
    match value {
        Some(Value::String(text)) => OutputText::Text(text.clone()),
        Some(Value::Array(items)) => collapse_lines(items.iter().map(value_to_string).collect()),
        _ => OutputText::empty(),
    }
}

fn collapse_lines(mut lines: Vec<String>) -> OutputText {
    match lines.len() {
        0 => OutputText::empty(),
        1 => OutputText::Text(lines.remove(0)),
        _ => OutputText::Lines(lines),
    }
}

/// Coerce `eco` to a list: falsy scalars vanish, truthy scalars wrap.
fn normalize_eco(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().map(value_to_string).collect(),
        Some(Value::String(text)) if !text.is_empty() => vec![text.clone()],
        Some(Value::Bool(true)) => vec!["true".to_string()],
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => vec![n.to_string()],
        _ => Vec::new(),
    }
}

/// A sigillo may arrive as an object, or as a JSON string holding one.
/// Anything that does not parse into the full shape is dropped.
fn normalize_sigillo(value: Option<&Value>) -> Option<Sigillo> {
    match value? {
        object @ Value::Object(_) => serde_json::from_value(object.clone()).ok(),
        Value::String(text) => serde_json::from_str(text).ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Secondary strategy: independent pattern probes per field. Each probe
/// that finds nothing leaves its field at the documented degraded value.
fn from_patterns(raw: &str) -> Extracted {
    let trimmed = raw.trim();

    let output = probe_output(raw)
        .filter(|output| !output.is_empty())
        .unwrap_or_else(|| OutputText::Text(truncate_chars(trimmed, RAW_OUTPUT_LIMIT)));

    let eco = ECO_RE
        .captures(raw)
        .map(|caps| parse_bracketed_list(&caps[1]))
        .unwrap_or_default();

    let frase_finale = FRASE_RE
        .captures(raw)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default();

    let sigillo = SIGILLO_RE
        .captures(raw)
        .and_then(|caps| serde_json::from_str(&caps[1]).ok());

    Extracted {
        output,
        eco,
        frase_finale,
        sigillo,
    }
}

fn probe_output(raw: &str) -> Option<OutputText> {
    if let Some(caps) = OUTPUT_STRING_RE.captures(raw) {
        return Some(OutputText::Text(caps[1].to_string()));
    }
    let caps = OUTPUT_LIST_RE.captures(raw)?;
    let inner = caps[1].trim();
    match serde_json::from_str::<Value>(&format!("[{}]", inner)) {
        Ok(Value::Array(items)) => Some(collapse_lines(items.iter().map(value_to_string).collect())),
        _ => Some(OutputText::Text(inner.to_string())),
    }
}

/// Re-wrap matched inner content as a JSON list; if that fails, keep the
/// trimmed content as a single element when non-empty.
fn parse_bracketed_list(inner: &str) -> Vec<String> {
    let inner = inner.trim();
    match serde_json::from_str::<Value>(&format!("[{}]", inner)) {
        Ok(Value::Array(items)) => items.iter().map(value_to_string).collect(),
        _ => {
            let content = inner.trim_matches('"').trim();
            if content.is_empty() {
                Vec::new()
            } else {
                vec![content.to_string()]
            }
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_json_with_singleton_output_unwraps() {
        let raw = r#"{"output": ["un'immagine"], "eco": ["eco breve"], "frase_finale": "Domanda?"}"#;
        let extracted = extract(raw);

        assert_eq!(extracted.output, OutputText::Text("un'immagine".to_string()));
        assert_eq!(extracted.eco, vec!["eco breve".to_string()]);
        assert_eq!(extracted.frase_finale, "Domanda?");
        assert!(extracted.sigillo.is_none());
    }

    #[test]
    fn test_multi_line_output_is_preserved_as_lines() {
        let raw = r#"{"output": ["prima immagine", "seconda immagine"], "eco": []}"#;
        let extracted = extract(raw);

        assert_eq!(
            extracted.output,
            OutputText::Lines(vec![
                "prima immagine".to_string(),
                "seconda immagine".to_string()
            ])
        );
        assert!(extracted.eco.is_empty());
    }

    #[test]
    fn test_empty_output_list_becomes_empty_text() {
        let extracted = extract(r#"{"output": [], "eco": ["eco"]}"#);
        assert_eq!(extracted.output, OutputText::Text(String::new()));
    }

    #[test]
    fn test_falsy_eco_scalars_become_empty_list() {
        assert!(extract(r#"{"eco": null}"#).eco.is_empty());
        assert!(extract(r#"{"eco": false}"#).eco.is_empty());
        assert!(extract(r#"{"eco": ""}"#).eco.is_empty());
        assert!(extract(r#"{"eco": 0}"#).eco.is_empty());
    }

    #[test]
    fn test_truthy_scalar_eco_wraps_into_list() {
        assert_eq!(
            extract(r#"{"eco": "una frase"}"#).eco,
            vec!["una frase".to_string()]
        );
    }

    #[test]
    fn test_json_embedded_in_prose_is_recovered() {
        let raw = concat!(
            "Ecco la risposta che hai chiesto:\n",
            r#"{"output": "un sentiero nel bosco", "eco": ["radici"], "frase_finale": "Dove porta?"}"#,
            "\nSpero sia utile!"
        );
        let extracted = extract(raw);

        assert_eq!(
            extracted.output,
            OutputText::Text("un sentiero nel bosco".to_string())
        );
        assert_eq!(extracted.eco, vec!["radici".to_string()]);
        assert_eq!(extracted.frase_finale, "Dove porta?");
    }

    #[test]
    fn test_no_braces_returns_truncated_raw_text() {
        let raw = "a".repeat(400);
        let extracted = extract(&format!("  {}  ", raw));

        assert_eq!(extracted.output, OutputText::Text("a".repeat(300)));
        assert!(extracted.eco.is_empty());
        assert_eq!(extracted.frase_finale, "");
        assert!(extracted.sigillo.is_none());
    }

    #[test]
    fn test_short_raw_text_is_kept_whole() {
        let extracted = extract("solo prosa, nessuna struttura");
        assert_eq!(
            extracted.output,
            OutputText::Text("solo prosa, nessuna struttura".to_string())
        );
    }

    #[test]
    fn test_sigillo_object_parses() {
        let raw = r##"{
            "output": "testo",
            "eco": ["eco"],
            "frase_finale": "Fine.",
            "sigillo": {
                "simbolo_dominante": "🌊",
                "immagine": "Un'onda che torna",
                "colore": "#3366FF",
                "forma": "cerchio",
                "codice_sigillo": "SIG-ONDA-07"
            }
        }"##;
        let sigillo = extract(raw).sigillo.unwrap();
        assert_eq!(sigillo.simbolo_dominante, "🌊");
        assert_eq!(sigillo.codice_sigillo, "SIG-ONDA-07");
    }

    #[test]
    fn test_sigillo_as_json_string_is_reparsed() {
        let raw = r##"{"output": "x", "sigillo": "{\"simbolo_dominante\": \"✨\", \"immagine\": \"i\", \"colore\": \"#FFF\", \"forma\": \"f\", \"codice_sigillo\": \"c\"}"}"##;
        let sigillo = extract(raw).sigillo.unwrap();
        assert_eq!(sigillo.simbolo_dominante, "✨");
    }

    #[test]
    fn test_malformed_sigillo_is_dropped_not_fatal() {
        // Plain string that is not JSON
        let extracted = extract(r#"{"output": "x", "sigillo": "un sigillo dorato"}"#);
        assert!(extracted.sigillo.is_none());
        assert_eq!(extracted.output, OutputText::Text("x".to_string()));

        // Object missing required fields
        let extracted = extract(r#"{"output": "x", "sigillo": {"simbolo_dominante": "✨"}}"#);
        assert!(extracted.sigillo.is_none());
    }

    #[test]
    fn test_pattern_fallback_on_broken_json() {
        // Trailing comma makes the direct parse fail.
        let raw = r#"{"output": "un riflesso", "eco": ["piano", "forte"], "frase_finale": "E ora?",}"#;
        let extracted = extract(raw);

        assert_eq!(extracted.output, OutputText::Text("un riflesso".to_string()));
        assert_eq!(extracted.eco, vec!["piano".to_string(), "forte".to_string()]);
        assert_eq!(extracted.frase_finale, "E ora?");
    }

    #[test]
    fn test_pattern_fallback_output_list() {
        let raw = r#"output incompleto: "output": ["una", "due"] e poi nulla"#;
        let extracted = extract(raw);
        assert_eq!(
            extracted.output,
            OutputText::Lines(vec!["una".to_string(), "due".to_string()])
        );
    }

    #[test]
    fn test_pattern_fallback_unparsable_eco_wraps_content() {
        let raw = r#"niente JSON valido ma "eco": [eco senza apici] qui"#;
        let extracted = extract(raw);
        assert_eq!(extracted.eco, vec!["eco senza apici".to_string()]);
    }

    #[test]
    fn test_pattern_fallback_sigillo_span() {
        let raw = r##"risposta rotta, "frase_finale": "Fine.", "sigillo": {"simbolo_dominante": "✨", "immagine": "i", "colore": "#FFF", "forma": "f", "codice_sigillo": "c"} e poi,"##;
        // Force the fallback path with an unbalanced brace up front.
        let raw = format!("{{{}", raw);
        let extracted = extract(&raw);

        assert_eq!(extracted.frase_finale, "Fine.");
        let sigillo = extracted.sigillo.unwrap();
        assert_eq!(sigillo.codice_sigillo, "c");
    }

    #[test]
    fn test_missing_fields_default_in_primary_path() {
        let extracted = extract(r#"{"frase_finale": "Solo questa."}"#);
        assert_eq!(extracted.output, OutputText::Text(String::new()));
        assert!(extracted.eco.is_empty());
        assert_eq!(extracted.frase_finale, "Solo questa.");
    }
}
