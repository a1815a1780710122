//! Inference request payload.
//!
//! Only the routing fields are checked. The body is otherwise opaque:
//! it reaches the worker byte for byte unless `image_data` has to be
//! turned into a data URI, in which case only that value changes.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::{DispatchError, DispatchResult};

#[derive(Debug, Clone, PartialEq)]
pub struct PredictRequest {
    raw: Bytes,
    fields: Map<String, Value>,
}

impl PredictRequest {
    /// Parse and validate a request body.
    pub fn from_bytes(body: Bytes) -> DispatchResult<Self> {
        let fields: Map<String, Value> = serde_json::from_slice(&body)
            .map_err(|e| DispatchError::InvalidRequest(e.to_string()))?;
        let req = Self { raw: body, fields };
        req.validate()?;
        Ok(req)
    }

    pub fn from_slice(body: &[u8]) -> DispatchResult<Self> {
        Self::from_bytes(Bytes::copy_from_slice(body))
    }

    pub fn validate(&self) -> DispatchResult<()> {
        for key in ["model_type", "model_cid"] {
            match self.fields.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => {}
                Some(Value::String(_)) => {
                    return Err(DispatchError::InvalidRequest(format!("{key} must not be empty")));
                }
                Some(_) => {
                    return Err(DispatchError::InvalidRequest(format!("{key} must be a string")));
                }
                None => return Err(DispatchError::InvalidRequest(format!("missing field `{key}`"))),
            }
        }
        Ok(())
    }

    fn str_field(&self, key: &str) -> &str {
        self.fields.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    /// Model id used for worker selection.
    pub fn model(&self) -> &str {
        self.str_field("model_type")
    }

    pub fn model_cid(&self) -> &str {
        self.str_field("model_cid")
    }

    /// Any top-level field, as the caller sent it.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Body sent to the worker.
    ///
    /// The original bytes, unless `image_data` is bare base64; then the
    /// object is re-encoded with that one value rewritten.
    pub fn to_forward_body(&self) -> DispatchResult<Bytes> {
        let normalized = match self.fields.get("image_data") {
            Some(Value::String(data)) => {
                let normalized = normalize_image_data(data);
                if normalized == *data {
                    return Ok(self.raw.clone());
                }
                normalized
            }
            _ => return Ok(self.raw.clone()),
        };

        let mut fields = self.fields.clone();
        fields.insert("image_data".to_string(), Value::String(normalized));
        serde_json::to_vec(&fields)
            .map(Bytes::from)
            .map_err(|e| DispatchError::Internal(format!("failed to encode request: {e}")))
    }
}

/// Base64 prefixes of common image file signatures.
const SIGNATURES: &[(&str, &str)] = &[
    ("/9j/", "jpeg"),
    ("iVBOR", "png"),
    ("R0lGOD", "gif"),
    ("UklGR", "webp"),
];

/// Image type of a bare base64 payload, sniffed from its leading bytes.
pub fn sniff_image_type(b64: &str) -> &'static str {
    SIGNATURES
        .iter()
        .find(|(prefix, _)| b64.starts_with(prefix))
        .map(|(_, kind)| *kind)
        .unwrap_or("png")
}

/// Turn bare base64 image data into a `data:` URI. Data URIs and empty
/// strings pass through unchanged.
pub fn normalize_image_data(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with("data:") {
        return raw.to_string();
    }
    format!("data:image/{};base64,{trimmed}", sniff_image_type(trimmed))
}
