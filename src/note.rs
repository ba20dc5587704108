use chrono::{DateTime, Utc};
use serde::Serialize;

/// A processed note. Built once after summarization succeeds and never changed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    id: String,
    text: String,
    summary: Option<String>,
    bullets: Vec<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
}

impl Note {
    /// An empty summary (text had no sentences) is stored as `None`.
    pub fn new(id: String, text: String, summary: String, bullets: Vec<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            text,
            summary: if summary.is_empty() { None } else { Some(summary) },
            bullets,
            timestamp,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn bullets(&self) -> &[String] {
        &self.bullets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_serializes_camel_case_with_millis() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let note = Note::new(
            "1700000000123-1".to_string(),
            "A cat sat.".to_string(),
            "A cat sat.".to_string(),
            vec!["A cat sat".to_string()],
            ts,
        );
        let v = serde_json::to_value(&note).unwrap();
        assert_eq!(v["id"], "1700000000123-1");
        assert_eq!(v["summary"], "A cat sat.");
        assert_eq!(v["bullets"][0], "A cat sat");
        assert_eq!(v["timestamp"], 1_700_000_000_123i64);
    }

    #[test]
    fn test_empty_summary_is_null() {
        let note = Note::new("x".into(), "?!".into(), String::new(), Vec::new(), Utc::now());
        assert!(note.summary().is_none());
        let v = serde_json::to_value(&note).unwrap();
        assert!(v["summary"].is_null());
    }
}
