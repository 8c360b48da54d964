use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

use crate::algorithm::Algorithm;
use crate::error::TokenError;

/// Token header. Field order is part of the wire format: the serialized
/// form must be `{"typ":"JWT","alg":...}`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Header {
    pub typ: String,
    pub alg: String,
}

impl Header {
    fn new(algorithm: Algorithm) -> Self {
        Header {
            typ: "JWT".to_string(),
            alg: algorithm.to_string(),
        }
    }
}

/// Encode `payload` as a signed compact token.
///
/// The payload is serialized to JSON, base64url-encoded without padding
/// and joined with the encoded header by `.`; the HMAC digest of those two
/// joined segments, encoded the same way, becomes the third segment.
///
/// The result is deterministic for fixed inputs.
///
/// # Errors
///
/// Returns [`TokenError::MissingKey`] when `secret` is empty, or
/// [`TokenError::Serialization`] when the payload cannot be serialized.
pub fn encode<T: Serialize>(
    payload: &T,
    secret: &str,
    algorithm: Algorithm,
) -> Result<String, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::MissingKey);
    }

    let header_segment = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&Header::new(algorithm))?);
    let payload_segment = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload)?);

    let signing_input = format!("{header_segment}.{payload_segment}");
    let signature = sign(signing_input.as_bytes(), secret.as_bytes(), algorithm);

    Ok(format!("{signing_input}.{signature}"))
}

/// HMAC over the joined header and payload segments, base64url-encoded
/// without padding. The signature covers only those two segments, in that
/// order.
pub(crate) fn sign(input: &[u8], secret: &[u8], algorithm: Algorithm) -> String {
    URL_SAFE_NO_PAD.encode(algorithm.sign(secret, input))
}
