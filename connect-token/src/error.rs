use thiserror::Error;

/// Errors produced by the token codec and the canonical request hasher.
///
/// All of these are deterministic pure-function failures; none of them is
/// retryable. Callers treat every one of them as an authentication
/// rejection.
#[derive(Error, Debug)]
pub enum TokenError {
    /// The token is structurally invalid: wrong segment count, an empty
    /// segment, invalid base64url, or a segment that does not decode to
    /// the expected JSON shape.
    #[error("malformed token")]
    MalformedToken,

    /// The header (or a caller) named an HMAC variant outside HS256,
    /// HS384 and HS512.
    #[error("algorithm \"{0}\" is not supported")]
    UnsupportedAlgorithm(String),

    /// An empty shared secret was supplied to the signing path.
    #[error("a non-empty signing secret is required")]
    MissingKey,

    /// The recomputed signature does not match the token's third segment.
    #[error("signature verification failed")]
    SignatureMismatch,

    /// The base URL given to the canonical request hasher could not be
    /// parsed.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    /// A claim set could not be serialized to JSON.
    #[error("failed to serialize claims: {0}")]
    Serialization(#[from] serde_json::Error),
}
