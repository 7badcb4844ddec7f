//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Telemetry channel client and feed decoding."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One telemetry sample as returned by the channel.
///
/// The numeric fields arrive string-encoded; a missing `created_at` marks
/// the body as carrying no data, which is why the field is mandatory here
/// while everything else defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub entry_id: u64,
    /// Current in amperes, string-encoded.
    #[serde(default)]
    pub field1: Option<String>,
    /// Power in watts, string-encoded.
    #[serde(default)]
    pub field2: Option<String>,
    /// Cumulative energy in kWh, string-encoded.
    #[serde(default)]
    pub field3: Option<String>,
}

impl Feed {
    pub fn current_amps(&self) -> f64 {
        parse_field(self.field1.as_deref())
    }

    pub fn power_watts(&self) -> f64 {
        parse_field(self.field2.as_deref())
    }

    pub fn energy_kwh(&self) -> f64 {
        parse_field(self.field3.as_deref())
    }
}

/// Envelope returned by the history endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedPage {
    #[serde(default)]
    pub channel: serde_json::Value,
    #[serde(default)]
    pub feeds: Vec<Feed>,
}

/// Defensive numeric decode: missing, empty or unparseable values become 0.
fn parse_field(raw: Option<&str>) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_encoded_fields_are_parsed() {
        let feed: Feed = serde_json::from_value(json!({
            "created_at": "2026-08-01T10:15:00Z",
            "entry_id": 120,
            "field1": "1.45",
            "field2": " 512.3 ",
            "field3": "38.90"
        }))
        .unwrap();
        assert_eq!(feed.entry_id, 120);
        assert_eq!(feed.current_amps(), 1.45);
        assert_eq!(feed.power_watts(), 512.3);
        assert_eq!(feed.energy_kwh(), 38.90);
    }

    #[test]
    fn missing_or_garbage_fields_become_zero() {
        let feed: Feed = serde_json::from_value(json!({
            "created_at": "2026-08-01T10:15:00Z",
            "field1": null,
            "field2": "n/a"
        }))
        .unwrap();
        assert_eq!(feed.current_amps(), 0.0);
        assert_eq!(feed.power_watts(), 0.0);
        assert_eq!(feed.energy_kwh(), 0.0);
    }

    #[test]
    fn empty_body_is_not_a_feed() {
        assert!(serde_json::from_value::<Feed>(json!({})).is_err());
    }
}
