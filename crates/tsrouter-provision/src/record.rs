//! Provider response for a created key

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tsrouter_auth::Secret;

/// An issued join key. Used once to join the mesh, never refreshed.
///
/// `Debug` output redacts `key`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthKeyRecord {
    pub id: String,
    pub key: Secret,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    #[serde(default)]
    pub ephemeral: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"id":"k1","key":"tskey-abc123","created":"2024-01-01T00:00:00Z","expires":"2024-01-15T00:00:00Z","ephemeral":true}"#;

    #[test]
    fn test_decode_record() {
        let record: AuthKeyRecord = serde_json::from_str(BODY).unwrap();

        assert_eq!(record.id, "k1");
        assert_eq!(record.key.expose(), "tskey-abc123");
        assert!(record.ephemeral);
        assert_eq!(record.created.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert!(record.expires > record.created);
    }

    #[test]
    fn test_extra_fields_ignored() {
        let body = r#"{"id":"k2","key":"tskey-k2-value","created":"2024-01-01T00:00:00Z","expires":"2024-01-15T00:00:00Z","capabilities":{"devices":{}},"description":""}"#;
        let record: AuthKeyRecord = serde_json::from_str(body).unwrap();

        assert_eq!(record.id, "k2");
        assert!(!record.ephemeral);
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let body = r#"{"id":"k1","created":"2024-01-01T00:00:00Z","expires":"2024-01-15T00:00:00Z"}"#;
        assert!(serde_json::from_str::<AuthKeyRecord>(body).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let record: AuthKeyRecord = serde_json::from_str(BODY).unwrap();
        let debug = format!("{:?}", record);

        assert!(debug.contains("k1"));
        assert!(!debug.contains("tskey-abc123"));
    }
}
