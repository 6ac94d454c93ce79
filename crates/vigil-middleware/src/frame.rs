//! Two-part `[topic, payload]` transport frames.

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Build a frame from raw message parts.
    ///
    /// Exactly two parts are accepted and the first must be UTF-8.
    pub fn from_parts(parts: Vec<Vec<u8>>) -> Result<Self, TransportError> {
        let count = parts.len();
        let Ok([topic, payload]) = <[Vec<u8>; 2]>::try_from(parts) else {
            return Err(TransportError::Malformed(format!("expected 2 parts, got {count}")));
        };
        let topic = String::from_utf8(topic)
            .map_err(|e| TransportError::Malformed(format!("topic is not UTF-8: {e}")))?;
        Ok(Self { topic, payload })
    }

    pub fn into_parts(self) -> Vec<Vec<u8>> {
        vec![self.topic.into_bytes(), self.payload]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_parts_make_a_frame() {
        let frame = Frame::from_parts(vec![b"cardiac/ppi".to_vec(), vec![1, 2, 3]]).unwrap();
        assert_eq!(frame, Frame::new("cardiac/ppi", vec![1, 2, 3]));
    }

    #[test]
    fn wrong_part_count_is_malformed() {
        assert!(matches!(Frame::from_parts(vec![b"only".to_vec()]), Err(TransportError::Malformed(_))));
        assert!(matches!(
            Frame::from_parts(vec![b"a".to_vec(), vec![], vec![]]),
            Err(TransportError::Malformed(_))
        ));
        assert!(Frame::from_parts(Vec::new()).is_err());
    }

    #[test]
    fn topic_must_be_utf8() {
        assert!(Frame::from_parts(vec![vec![0xff, 0xfe], vec![]]).is_err());
    }
}
