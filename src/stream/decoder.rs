//! Payload decoders.
//!
//! Every connection names the decoder its payloads go through. Payloads are
//! opaque bytes until decoded; the result handed to callbacks is a
//! `serde_json::Value` regardless of the wire format.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DecodeError;

/// Tag of the built-in JSON decoder, used when a connection names none.
pub const JSON_DECODER: &str = "json";

/// Tag of the built-in UTF-8 text decoder.
pub const TEXT_DECODER: &str = "text";

/// Turns raw payload bytes into a structured value.
pub trait PayloadDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<Value, DecodeError>;
}

/// Parses the payload as a JSON document.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl PayloadDecoder for JsonDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Value, DecodeError> {
        serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed {
            decoder: JSON_DECODER.to_string(),
            message: e.to_string(),
        })
    }
}

/// Passes the payload through as a JSON string.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextDecoder;

impl PayloadDecoder for TextDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Value, DecodeError> {
        std::str::from_utf8(payload)
            .map(|text| Value::String(text.to_string()))
            .map_err(|e| DecodeError::Malformed {
                decoder: TEXT_DECODER.to_string(),
                message: e.to_string(),
            })
    }
}

/// Decoders by tag.
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<String, Arc<dyn PayloadDecoder>>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::empty()
            .with_decoder(JSON_DECODER, JsonDecoder)
            .with_decoder(TEXT_DECODER, TextDecoder)
    }
}

impl DecoderRegistry {
    /// A registry with no decoders, not even the built-ins.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register `decoder` under `tag`, replacing any previous one.
    pub fn with_decoder(mut self, tag: impl Into<String>, decoder: impl PayloadDecoder + 'static) -> Self {
        self.decoders.insert(tag.into(), Arc::new(decoder));
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    /// Decode `payload` with the decoder registered under `tag`, or JSON if
    /// `tag` is `None`.
    pub fn decode(&self, tag: Option<&str>, payload: &[u8]) -> Result<Value, DecodeError> {
        let tag = tag.unwrap_or(JSON_DECODER);
        let decoder = self
            .decoders
            .get(tag)
            .ok_or_else(|| DecodeError::UnknownDecoder(tag.to_string()))?;
        decoder.decode(payload)
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.decoders.keys().collect();
        tags.sort();
        f.debug_struct("DecoderRegistry").field("tags", &tags).finish()
    }
}
