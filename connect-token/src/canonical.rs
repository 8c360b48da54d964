//! Canonical request hashing.
//!
//! A token is bound to one HTTP request by embedding the SHA-256 hash of a
//! deterministic string form of that request: upper-cased method, base-path
//! stripped path and sorted query string, joined by `&`. Both the signer
//! and the verifier compute it independently; any divergence in the rules
//! here either rejects legitimate requests or admits forged ones.

use std::collections::BTreeMap;
use std::fmt::Write;

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::TokenError;

/// Separator between the fields of a canonical request.
const CANONICAL_SEPARATOR: char = '&';

/// Query parameter that carries the token itself; it is the signature
/// carrier, never signed data.
const TOKEN_PARAM: &str = "jwt";

/// Query or body parameters, keyed by name. Multi-valued parameters keep
/// every value. The map keeps names in byte-wise lexicographic order,
/// which is exactly the canonical ordering.
pub type QueryParams = BTreeMap<String, Vec<String>>;

/// Borrowed view of one HTTP request.
///
/// Exists only for the duration of a single sign or verify operation;
/// nothing here is stored.
#[derive(Debug, Clone)]
pub struct CanonicalRequest<'a> {
    /// HTTP method token, any case.
    pub method: &'a str,
    /// Request path, before base-path stripping.
    pub path: &'a str,
    /// Parsed query string parameters.
    pub query: &'a QueryParams,
    /// Form parameters from the request body, consulted only when body
    /// fallback is enabled.
    pub body: Option<&'a QueryParams>,
}

/// Build the canonical string form of a request.
///
/// `check_body_for_params` enables the proxy accommodation: when the query
/// string is empty and the method is POST or PUT, parameters are taken
/// from the request body instead. `base_url` supplies the path prefix to
/// strip from the request path.
pub fn create_canonical_request(
    request: &CanonicalRequest<'_>,
    check_body_for_params: bool,
    base_url: &str,
) -> Result<String, TokenError> {
    Ok(format!(
        "{}{}{}{}{}",
        canonicalize_method(request.method),
        CANONICAL_SEPARATOR,
        canonicalize_path(request.path, base_url)?,
        CANONICAL_SEPARATOR,
        canonicalize_query(request, check_body_for_params),
    ))
}

/// SHA-256 digest of the canonical request string, lower-case hex.
pub fn create_query_string_hash(
    request: &CanonicalRequest<'_>,
    check_body_for_params: bool,
    base_url: &str,
) -> Result<String, TokenError> {
    let canonical = create_canonical_request(request, check_body_for_params, base_url)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

fn canonicalize_method(method: &str) -> String {
    method.to_uppercase()
}

fn canonicalize_path(path: &str, base_url: &str) -> Result<String, TokenError> {
    let base_path = Url::parse(base_url)?.path().to_string();

    // Url reports an empty path as "/"; treating that as a prefix would
    // eat the leading slash of every request path.
    let mut path = if base_path != "/" && path.starts_with(base_path.as_str()) {
        path[base_path.len()..].to_string()
    } else {
        path.to_string()
    };

    if path.is_empty() {
        return Ok("/".to_string());
    }

    // If the separator is not escaped, .../project&a=b?x=y and
    // .../project?a=b&x=y produce the same hash.
    path = path.replace(CANONICAL_SEPARATOR, "%26");

    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }

    Ok(path)
}

fn canonicalize_query(request: &CanonicalRequest<'_>, check_body_for_params: bool) -> String {
    let method = request.method.to_uppercase();

    // Some HTTP clients relocate the query string into the body of POST
    // and PUT requests.
    let params = if check_body_for_params
        && request.query.is_empty()
        && (method == "POST" || method == "PUT")
    {
        request.body.unwrap_or(request.query)
    } else {
        request.query
    };

    let mut parts = Vec::new();
    for (name, values) in params {
        if name == TOKEN_PARAM {
            continue;
        }

        let mut sorted = values.clone();
        sorted.sort();
        let value = sorted
            .iter()
            .map(|v| encode_rfc3986(v))
            .collect::<Vec<_>>()
            .join("%2C");

        parts.push(format!("{}={}", encode_rfc3986(name), value));
    }

    parts.join("&")
}

/// Percent-encode everything but the RFC 3986 unreserved characters
/// (`ALPHA / DIGIT / "-" / "." / "_" / "~"`). Unlike a naive URL encoder
/// this also escapes `!`, `'`, `(`, `)` and `*`.
pub fn encode_rfc3986(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(byte as char);
        } else {
            // Infallible for String.
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}
