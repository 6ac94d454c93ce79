//! MessagePack wire format shared by every sensor topic.
//!
//! ```text
//! { "ts": "<seconds>" | <seconds>, "labels": ["x", "y", "z"], "data": [[..], [..]] }
//! ```
//!
//! Each row of `data` is aligned positionally with `labels`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chunk timestamp as published: usually a decimal string, sometimes a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Number(f64),
    Text(String),
}

impl WireTimestamp {
    /// Seconds since the Unix epoch.  `None` when the text does not parse or
    /// the value is not finite.
    pub fn seconds(&self) -> Option<f64> {
        let secs = match self {
            WireTimestamp::Number(n) => *n,
            WireTimestamp::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        secs.is_finite().then_some(secs)
    }
}

impl From<f64> for WireTimestamp {
    fn from(secs: f64) -> Self {
        WireTimestamp::Text(secs.to_string())
    }
}

/// One published record before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub ts: WireTimestamp,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

impl RawRecord {
    pub fn new(ts: impl Into<WireTimestamp>, labels: &[&str], data: Vec<Vec<Value>>) -> Self {
        Self {
            ts: ts.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            data,
        }
    }

    /// Position of `label` within each row.
    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
}

/// Deserialize a MessagePack payload.
pub fn decode_record(bytes: &[u8]) -> Result<RawRecord, rmp_serde::decode::Error> {
    rmp_serde::from_slice(bytes)
}

/// Serialize a record as a MessagePack map, the way publishers send it.
pub fn encode_record(record: &RawRecord) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encoded_record_decodes_back() -> Result<(), Box<dyn std::error::Error>> {
        let record = RawRecord::new(
            1_700_000_000.25,
            &["ppi", "skin_contact"],
            vec![vec![json!(800), json!(1)]],
        );
        let bytes = encode_record(&record)?;
        let back = decode_record(&bytes)?;
        assert_eq!(back.labels, record.labels);
        assert_eq!(back.data[0][0].as_f64(), Some(800.0));
        assert_eq!(back.ts.seconds(), Some(1_700_000_000.25));
        Ok(())
    }

    #[test]
    fn numeric_timestamp_is_accepted() -> Result<(), Box<dyn std::error::Error>> {
        #[derive(Serialize)]
        struct NumericTs {
            ts: f64,
            labels: Vec<String>,
            data: Vec<Vec<Value>>,
        }
        let bytes = rmp_serde::to_vec_named(&NumericTs {
            ts: 12.5,
            labels: vec!["level".into()],
            data: vec![vec![json!(0.1)]],
        })?;
        assert_eq!(decode_record(&bytes)?.ts.seconds(), Some(12.5));
        Ok(())
    }

    #[test]
    fn unparsable_timestamp_has_no_seconds() {
        assert_eq!(WireTimestamp::Text("soon".into()).seconds(), None);
        assert_eq!(WireTimestamp::Number(f64::NAN).seconds(), None);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(decode_record(&[0xc1, 0x00, 0x13]).is_err());
    }
}
