use serde::{Deserialize, Serialize};

use crate::repeat::RepeatSpec;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Configured jobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A repeatable job declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    /// Opaque payload handed to the firing handler.
    #[serde(default = "default_payload")]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub repeat: RepeatSpec,
}

pub fn default_payload() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_job_table_from_toml() {
        let toml_str = r#"
            name = "nightly-report"
            payload = { foo = "bar" }

            [repeat]
            pattern = "0 13 * * *"
            immediately = true
        "#;
        let job: JobDefinition = toml::from_str(toml_str).unwrap();
        assert_eq!(job.name, "nightly-report");
        assert_eq!(job.payload["foo"], "bar");
        assert_eq!(job.repeat.pattern.as_deref(), Some("0 13 * * *"));
        assert!(job.repeat.immediate);
    }

    #[test]
    fn missing_payload_defaults_to_empty_object() {
        let job: JobDefinition = toml::from_str("name = \"x\"").unwrap();
        assert!(job.payload.as_object().is_some_and(|m| m.is_empty()));
        assert!(job.repeat.pattern.is_none());
    }

    #[test]
    fn multiline_rrule_pattern() {
        let toml_str = r#"
            name = "standup"
            [repeat]
            pattern = """
DTSTART;TZID=UTC:20250722T000000Z
RRULE:FREQ=DAILY;INTERVAL=1;BYHOUR=13;BYMINUTE=42;WKST=MO"""
        "#;
        let job: JobDefinition = toml::from_str(toml_str).unwrap();
        let pattern = job.repeat.pattern.unwrap();
        assert!(pattern.starts_with("DTSTART"));
        assert!(pattern.contains("\nRRULE:"));
    }
}
