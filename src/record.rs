use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest line accepted from a workload or off the wire, newline excluded.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Longest encoded record accepted by the server. A workload line of
/// [`MAX_LINE_BYTES`] can grow six-fold when every byte is a control
/// character escaped as `\u00XX`; the rest covers keys and identity fields.
pub const MAX_FRAME_BYTES: usize = MAX_LINE_BYTES * 6 + 4096;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// One log line captured from a workload.
///
/// Field names on the wire keep the collector's historical capitalised
/// keys, and the timestamp travels as a decimal string of unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Log")]
    pub message: String,
    #[serde(rename = "ContainerName")]
    pub container_name: String,
    #[serde(rename = "ContainerID")]
    pub container_id: String,
    #[serde(rename = "Timestamp", with = "unix_seconds")]
    pub timestamp: i64,
    #[serde(rename = "Hostname")]
    pub hostname: String,
}

impl Record {
    /// Serialize as a single newline-terminated JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>, RecordError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Serialize as the JSON document stored by the backend.
    pub fn to_document(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Storage collection this record belongs to (one per agent host).
    pub fn collection(&self) -> &str {
        &self.hostname
    }
}

mod unix_seconds {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(seconds: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&seconds.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid unix timestamp: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record {
            message: "GET / HTTP/1.1".to_string(),
            container_name: "web".to_string(),
            container_id: "4f2a9c".to_string(),
            timestamp: 1_700_000_000,
            hostname: "node-1".to_string(),
        }
    }

    #[test]
    fn test_wire_shape_uses_capitalised_keys() {
        let value: serde_json::Value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["Log"], "GET / HTTP/1.1");
        assert_eq!(value["ContainerName"], "web");
        assert_eq!(value["ContainerID"], "4f2a9c");
        assert_eq!(value["Timestamp"], "1700000000");
        assert_eq!(value["Hostname"], "node-1");
    }

    #[test]
    fn test_to_line_is_single_terminated_line() {
        let line = sample().to_line().unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn test_decode_preserves_every_field() {
        let record = sample();
        let line = record.to_line().unwrap();
        let text = std::str::from_utf8(&line).unwrap().trim_end();
        assert_eq!(Record::from_json(text).unwrap(), record);
    }

    #[test]
    fn test_message_with_quotes_and_newlines_survives_framing() {
        let mut record = sample();
        record.message = "say \"hi\"\tand\nleave".to_string();
        let line = record.to_line().unwrap();
        // Embedded newlines are escaped, so the frame stays one line
        assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn test_non_numeric_timestamp_rejected() {
        let text = r#"{"Log":"x","ContainerName":"a","ContainerID":"b","Timestamp":"soon","Hostname":"h"}"#;
        assert!(Record::from_json(text).is_err());
    }

    #[test]
    fn test_missing_field_rejected() {
        let text = r#"{"Log":"x","ContainerName":"a","Timestamp":"1","Hostname":"h"}"#;
        assert!(Record::from_json(text).is_err());
    }
}
