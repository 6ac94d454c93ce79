//! `vigil-perception` – Decoding layer.
//!
//! Turns the raw MessagePack frames published on each topic into validated,
//! physically scaled [`NormalizedRecord`][vigil_types::NormalizedRecord]s.
//!
//! # Modules
//!
//! - [`topic`] – [`Topic`][topic::Topic]: the closed topic catalog and its
//!   routing to `(SignalType, DataType)`.
//! - [`wire`] – [`RawRecord`][wire::RawRecord] plus the MessagePack codec.
//! - [`convert`] – ADC scaling, PPI → bpm and per-sample timing.
//! - [`decoder`] – [`TopicDecoder`][decoder::TopicDecoder]: schema
//!   validation and per-topic conversion.

pub mod convert;
pub mod decoder;
pub mod topic;
pub mod wire;

pub use decoder::{DecoderConfig, TopicDecoder, TopicSpec};
pub use topic::Topic;
pub use wire::{RawRecord, WireTimestamp, decode_record, encode_record};
