use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;

use crate::algorithm::Algorithm;
use crate::encode::{sign, Header};
use crate::error::TokenError;

/// Decode a token and verify its signature against `secret`.
///
/// The signature is recomputed over the header and payload segments
/// exactly as in [`encode`](crate::encode) and compared with the token's
/// third segment in constant time.
///
/// Expiry is **not** checked here: `exp`, `iat` and `nbf` enforcement is
/// the caller's responsibility, applied after decoding.
///
/// # Errors
///
/// * [`TokenError::MalformedToken`] for structural problems
/// * [`TokenError::UnsupportedAlgorithm`] when the header names an
///   unknown algorithm
/// * [`TokenError::SignatureMismatch`] when the signatures differ
pub fn decode(token: &str, secret: &str) -> Result<Map<String, Value>, TokenError> {
    decode_inner(token, Some(secret))
}

/// Decode a token without verifying its signature.
///
/// Used to read the issuer claim before the shared secret for that issuer
/// is known. The result must not be trusted until a verifying
/// [`decode`] has succeeded.
pub fn decode_unverified(token: &str) -> Result<Map<String, Value>, TokenError> {
    decode_inner(token, None)
}

fn decode_inner(token: &str, secret: Option<&str>) -> Result<Map<String, Value>, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|segment| segment.is_empty()) {
        return Err(TokenError::MalformedToken);
    }
    let (header_segment, payload_segment, signature_segment) =
        (segments[0], segments[1], segments[2]);

    let header: Header = decode_segment(header_segment)?;
    let mut payload: Map<String, Value> = decode_segment(payload_segment)?;

    normalize_aud(&mut payload);

    if let Some(secret) = secret {
        let algorithm = Algorithm::from_str(&header.alg)?;
        let signing_input = format!("{header_segment}.{payload_segment}");
        let expected = sign(signing_input.as_bytes(), secret.as_bytes(), algorithm);

        // Compare in the encoded form so there is no double-decoding
        // ambiguity, and in constant time.
        if !bool::from(expected.as_bytes().ct_eq(signature_segment.as_bytes())) {
            return Err(TokenError::SignatureMismatch);
        }
    }

    Ok(payload)
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::MalformedToken)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::MalformedToken)
}

/// The `aud` claim may be a single value or a list; normalize the single
/// form to a one-element list.
fn normalize_aud(payload: &mut Map<String, Value>) {
    if let Some(aud) = payload.get_mut("aud") {
        if !aud.is_array() && !aud.is_null() {
            let single = aud.take();
            *aud = Value::Array(vec![single]);
        }
    }
}
