//! Best-effort lead field extraction from free-text replies.
//!
//! A fixed table of regular expressions, each applied on its own. The
//! patterns are permissive and will mis-read plenty of real sentences (the
//! city pattern fires after any "di", "a" or "da"); results are hints for a
//! human to confirm, not parsed data.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use leadflow_core::error::Result;
use leadflow_core::traits::CrmStore;
use leadflow_core::types::{JsonMap, MessageDirection, WhatsappMessage};

/// Field name → extracted text.
pub type ExtractedFields = BTreeMap<String, String>;

const FIELD_PATTERNS: &[(&str, &str)] = &[
    (
        "nome",
        r"(?i)(?:mi chiamo|sono|il mio nome è)\s+([A-Za-zÀ-ÿ]+(?:\s+[A-Za-zÀ-ÿ]+)?)",
    ),
    (
        "cognome",
        r"(?i)(?:di cognome|cognome)\s*(?:è|:)?\s*([A-Za-zÀ-ÿ]+)",
    ),
    ("email", r"([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})"),
    ("telefono", r"(\+?\d[\d\s-]{7,}\d)"),
    (
        "citta",
        r"(?i)(?:\b(?:di|a|da)\s+|città:?\s*)([A-Za-zÀ-ÿ][A-Za-zÀ-ÿ ]*?)\s*(?:[,.;!?]|$)",
    ),
    ("eta", r"(?i)(\d{1,3})\s*anni"),
];

fn patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        FIELD_PATTERNS
            .iter()
            .map(|(field, pattern)| {
                let re = Regex::new(pattern).expect("built-in field pattern compiles");
                (*field, re)
            })
            .collect()
    })
}

/// Regex field extractor for AI/WhatsApp conversations.
pub struct AiResponseParser;

impl AiResponseParser {
    /// Extract every field whose pattern matches `text`.
    pub fn parse_response(text: &str) -> ExtractedFields {
        let mut fields = ExtractedFields::new();
        for (field, re) in patterns() {
            if let Some(value) = re
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim())
                .filter(|v| !v.is_empty())
            {
                fields.insert(field.to_string(), value.to_string());
            }
        }
        fields
    }

    /// Fold `parse_response` over the incoming messages of a thread, oldest
    /// first. A later message overwrites an earlier value for the same field.
    pub fn extract_from_conversation(messages: &[WhatsappMessage]) -> ExtractedFields {
        messages
            .iter()
            .filter(|m| m.direction == MessageDirection::Incoming)
            .fold(ExtractedFields::new(), |mut acc, m| {
                acc.extend(Self::parse_response(&m.message));
                acc
            })
    }
}

/// Write extracted fields onto a lead. Returns `false` when there was nothing
/// to write or the lead does not exist.
pub async fn apply_extracted_fields(
    store: &dyn CrmStore,
    lead_id: &str,
    fields: &ExtractedFields,
) -> Result<bool> {
    if fields.is_empty() {
        return Ok(false);
    }
    let updates: JsonMap = fields
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    let updated = store.update_lead(lead_id, &updates).await?;
    debug!(lead_id, fields = fields.len(), updated, "Extracted fields applied");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn fields(pairs: &[(&str, &str)]) -> ExtractedFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_name_city_age() {
        assert_eq!(
            AiResponseParser::parse_response("Mi chiamo Mario, abito a Roma, ho 30 anni"),
            fields(&[("nome", "Mario"), ("citta", "Roma"), ("eta", "30")])
        );
    }

    #[test]
    fn test_contacts() {
        let parsed = AiResponseParser::parse_response(
            "Sono Luca e vivo a Milano. Scrivimi a luca.verdi@example.com oppure +39 333 1234567",
        );
        assert_eq!(parsed["email"], "luca.verdi@example.com");
        assert_eq!(parsed["telefono"], "+39 333 1234567");
        assert_eq!(parsed["citta"], "Milano");
        // the name pattern swallows the following word
        assert_eq!(parsed["nome"], "Luca e");
    }

    #[test]
    fn test_surname() {
        let parsed = AiResponseParser::parse_response("Il mio cognome è Esposito");
        assert_eq!(parsed.get("cognome").map(String::as_str), Some("Esposito"));
        assert!(!parsed.contains_key("nome"));
    }

    #[test]
    fn test_nothing_to_extract() {
        assert!(AiResponseParser::parse_response("Buongiorno!").is_empty());
        assert!(AiResponseParser::parse_response("").is_empty());
    }

    #[test]
    fn test_conversation_last_write_wins() {
        let now = Utc::now();
        let mut outgoing = WhatsappMessage::incoming("m0", "l1", "Mi chiamo Assistente", now);
        outgoing.direction = MessageDirection::Outgoing;

        let messages = vec![
            outgoing,
            WhatsappMessage::incoming("m1", "l1", "Mi chiamo Giulia", now - Duration::minutes(3)),
            WhatsappMessage::incoming("m2", "l1", "abito a Torino.", now - Duration::minutes(2)),
            WhatsappMessage::incoming("m3", "l1", "anzi abito a Napoli", now),
        ];
        assert_eq!(
            AiResponseParser::extract_from_conversation(&messages),
            fields(&[("nome", "Giulia"), ("citta", "Napoli")])
        );
    }
}
