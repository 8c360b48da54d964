//! # Connect API
//!
//! HTTP plumbing around the token codec: signing outbound API calls and
//! authenticating inbound webhook requests.
//!
//! [`ConnectClient`] resolves the credential for a target base URL, binds
//! a token to the outgoing request with a query string hash and attaches
//! it as `Authorization: JWT <token>`. [`TokenVerifier`] runs the inverse
//! flow for inbound requests: token extraction, issuer lookup, signature
//! verification, expiry checks and query string hash comparison.
//!
//! Verification rejections are deliberately opaque: callers only see
//! [`ApiError::Unauthorized`], while the specific cause is logged at
//! debug level. Distinct rejection messages would tell a forger which
//! check they got past.

use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;
use url::Url;

use connect_config::CredentialStore;
use connect_token::{
    create_query_string_hash, decode, decode_unverified, encode, Algorithm, CanonicalRequest,
    Claims, QueryParams, TokenError,
};

/// Errors surfaced by the API layer.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// No credential is registered for the request target. Outbound
    /// calls abort before anything is sent.
    #[error("no credential registered for the request target")]
    IssuerUnknown,

    /// Generic inbound rejection; the cause is logged, not returned.
    #[error("request is not authorized")]
    Unauthorized,

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

/// Controls the validity window of minted tokens.
#[derive(Debug, Clone, Copy)]
pub struct TokenTimeConfig {
    /// Optional custom start time (now override).
    pub start_time: Option<i64>,
    /// Validity duration in seconds (default: 180 seconds = 3 minutes).
    pub duration: i64,
}

impl Default for TokenTimeConfig {
    fn default() -> Self {
        Self {
            start_time: None,
            duration: 180,
        }
    }
}

/// Client for making signed outbound API calls.
///
/// Each call resolves the shared secret for the target base URL from the
/// credential store, computes the query string hash for the exact request
/// being made, and mints a short-lived HS256 token carrying it.
#[derive(Debug, Clone)]
pub struct ConnectClient {
    issuer: String,
    store: CredentialStore,
    time_config: TokenTimeConfig,
    http: reqwest::Client,
}

impl ConnectClient {
    /// Create a client that signs requests as `issuer`.
    pub fn new(issuer: impl Into<String>, store: CredentialStore) -> Self {
        Self {
            issuer: issuer.into(),
            store,
            time_config: TokenTimeConfig::default(),
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom reqwest client (timeouts, proxies and TLS settings
    /// are the caller's concern).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Override the token validity window.
    pub fn with_time_config(mut self, time_config: TokenTimeConfig) -> Self {
        self.time_config = time_config;
        self
    }

    /// Mint a signed token for a request to `url` without sending it.
    ///
    /// Exposed so callers with their own transport can attach the token
    /// themselves; the minted token is only valid for this method and
    /// URL.
    ///
    /// # Errors
    ///
    /// [`ApiError::IssuerUnknown`] when no credential matches the URL's
    /// base; signing must abort rather than produce an unsigned call.
    pub fn sign_request(&self, method: &str, url: &str) -> Result<String, ApiError> {
        let url = Url::parse(url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        let base_url = request_base(&url)?;
        let credential = self
            .store
            .find_by_base_url(&base_url)
            .ok_or(ApiError::IssuerUnknown)?;

        let mut path = url.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            path.pop();
        }

        let query = query_params(&url);
        let request = CanonicalRequest {
            method,
            path: &path,
            query: &query,
            body: None,
        };
        let qsh = create_query_string_hash(&request, false, &base_url)?;

        let start_time = self
            .time_config
            .start_time
            .unwrap_or_else(|| Utc::now().timestamp());
        let claims = Claims::new(&self.issuer, start_time, start_time + self.time_config.duration)
            .with_qsh(qsh);

        let token = encode(&claims, &credential.shared_secret, Algorithm::HS256)?;
        debug!(issuer = %self.issuer, %base_url, "signed outbound request token");
        Ok(token)
    }

    /// Send a signed request, with an optional JSON body.
    pub async fn send_signed(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let token = self.sign_request(method.as_str(), url)?;

        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("JWT {token}"));
        if let Some(body) = body {
            request = request.json(body);
        }

        Ok(request.send().await?)
    }
}

/// `scheme://host[:port]` of a request URL, the key used for credential
/// lookup.
fn request_base(url: &Url) -> Result<String, ApiError> {
    let host = url
        .host_str()
        .ok_or_else(|| ApiError::InvalidUrl("missing host".to_string()))?;
    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

fn query_params(url: &Url) -> QueryParams {
    let mut params = QueryParams::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    params
}

/// Plain-data carrier for one inbound HTTP request awaiting
/// authentication.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// HTTP method token.
    pub method: String,
    /// Request path as received.
    pub path: String,
    /// Parsed query string parameters.
    pub query: QueryParams,
    /// Parsed form parameters from the request body, if any.
    pub body_params: QueryParams,
    /// Raw `Authorization` header value, if present.
    pub authorization: Option<String>,
}

/// Internal verification failure causes. Collapsed into
/// [`ApiError::Unauthorized`] before reaching callers.
#[derive(Error, Debug)]
enum VerifyFailure {
    #[error("no token in the request")]
    MissingToken,

    #[error("token has no issuer claim")]
    MissingIssuer,

    #[error("no credential for the claimed issuer")]
    IssuerUnknown,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("query string hash does not match the request")]
    QueryHashMismatch,

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Authenticates inbound requests carrying a Connect token.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    store: CredentialStore,
    base_url: String,
    check_body_for_params: bool,
}

impl TokenVerifier {
    /// Create a verifier for a service reachable under `base_url`; the
    /// base URL's path component is stripped when recomputing query
    /// string hashes.
    pub fn new(store: CredentialStore, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into(),
            check_body_for_params: false,
        }
    }

    /// Accept query parameters relocated into the body of POST and PUT
    /// requests by intermediaries.
    pub fn with_body_param_fallback(mut self, enabled: bool) -> Self {
        self.check_body_for_params = enabled;
        self
    }

    /// Authenticate an inbound request and return its verified claim
    /// payload.
    ///
    /// Expiry (`exp`) and not-before (`nbf`) are enforced here against
    /// current time; the codec itself never reads them. When the token
    /// carries a `qsh` claim the canonical hash of this request is
    /// recomputed and compared in constant time.
    pub fn verify_request(&self, request: &InboundRequest) -> Result<Map<String, Value>, ApiError> {
        self.verify_request_at(request, Utc::now().timestamp())
    }

    fn verify_request_at(
        &self,
        request: &InboundRequest,
        now: i64,
    ) -> Result<Map<String, Value>, ApiError> {
        match self.check(request, now) {
            Ok(payload) => Ok(payload),
            Err(cause) => {
                debug!(%cause, "rejecting inbound request");
                Err(ApiError::Unauthorized)
            }
        }
    }

    fn check(
        &self,
        request: &InboundRequest,
        now: i64,
    ) -> Result<Map<String, Value>, VerifyFailure> {
        let token = extract_token(request).ok_or(VerifyFailure::MissingToken)?;

        // The issuer claim decides which shared secret applies, so it has
        // to be read before the signature can be checked.
        let unverified = decode_unverified(token)?;
        let issuer = unverified
            .get("iss")
            .and_then(Value::as_str)
            .ok_or(VerifyFailure::MissingIssuer)?;
        let credential = self
            .store
            .find_by_client_key(issuer)
            .ok_or(VerifyFailure::IssuerUnknown)?;

        let payload = decode(token, &credential.shared_secret)?;

        if let Some(exp) = payload.get("exp").and_then(Value::as_i64) {
            if exp <= now {
                return Err(VerifyFailure::Expired);
            }
        }
        if let Some(nbf) = payload.get("nbf").and_then(Value::as_i64) {
            if nbf > now {
                return Err(VerifyFailure::NotYetValid);
            }
        }

        if let Some(expected) = payload.get("qsh").and_then(Value::as_str) {
            let canonical = CanonicalRequest {
                method: &request.method,
                path: &request.path,
                query: &request.query,
                body: Some(&request.body_params),
            };
            let computed =
                create_query_string_hash(&canonical, self.check_body_for_params, &self.base_url)?;
            if !bool::from(computed.as_bytes().ct_eq(expected.as_bytes())) {
                return Err(VerifyFailure::QueryHashMismatch);
            }
        }

        Ok(payload)
    }
}

/// Pull the raw token from the `Authorization: JWT <token>` header or the
/// `jwt` query/body parameter.
fn extract_token(request: &InboundRequest) -> Option<&str> {
    if let Some(header) = request.authorization.as_deref() {
        if let Some(token) = header.strip_prefix("JWT ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token);
            }
        }
    }

    request
        .query
        .get("jwt")
        .or_else(|| request.body_params.get("jwt"))
        .and_then(|values| values.first())
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use connect_config::Credential;
    use serde_json::json;

    const BASE_URL: &str = "https://one.example.net";
    const SECRET: &str = "SECRET";

    fn store() -> CredentialStore {
        let mut store = CredentialStore::new();
        store.register(Credential::new("tenant-1", "PUBKEY", SECRET, BASE_URL));
        store
    }

    fn fixed_time_client() -> ConnectClient {
        ConnectClient::new("my-add-on", store()).with_time_config(TokenTimeConfig {
            start_time: Some(1300819380),
            duration: 180,
        })
    }

    fn inbound(method: &str, path: &str, token: &str) -> InboundRequest {
        InboundRequest {
            method: method.to_string(),
            path: path.to_string(),
            authorization: Some(format!("JWT {token}")),
            ..InboundRequest::default()
        }
    }

    #[test]
    fn sign_request_binds_method_path_and_window() {
        let client = fixed_time_client();
        let token = client
            .sign_request("PUT", "https://one.example.net/rest/api/2/issue/10001")
            .unwrap();

        let payload = decode(&token, SECRET).unwrap();
        assert_eq!(payload["iss"], "my-add-on");
        assert_eq!(payload["iat"], 1300819380);
        assert_eq!(payload["exp"], 1300819560);
        assert_eq!(
            payload["qsh"],
            "c19eb54bf171ec213fa4aff10fae97c3ff2606a24198212b098ffaad423e48b5"
        );
    }

    #[test]
    fn sign_request_includes_query_and_trims_trailing_slash() {
        let client = fixed_time_client();
        let token = client
            .sign_request("GET", "https://one.example.net/rest/api/2/search/?b=y&b=x&a=1")
            .unwrap();

        let payload = decode(&token, SECRET).unwrap();

        let query: QueryParams = [
            ("a".to_string(), vec!["1".to_string()]),
            ("b".to_string(), vec!["y".to_string(), "x".to_string()]),
        ]
        .into_iter()
        .collect();
        let expected = create_query_string_hash(
            &CanonicalRequest {
                method: "GET",
                path: "/rest/api/2/search",
                query: &query,
                body: None,
            },
            false,
            BASE_URL,
        )
        .unwrap();
        assert_eq!(payload["qsh"], expected);
    }

    #[test]
    fn sign_request_aborts_without_a_credential() {
        let client = ConnectClient::new("my-add-on", CredentialStore::new());
        assert!(matches!(
            client.sign_request("GET", "https://unknown.example.net/rest"),
            Err(ApiError::IssuerUnknown)
        ));
    }

    #[test]
    fn verify_accepts_a_request_signed_for_it() {
        let client = ConnectClient::new("tenant-1", store());
        let token = client
            .sign_request("GET", "https://one.example.net/rest/api/2/issue/10001")
            .unwrap();

        let verifier = TokenVerifier::new(store(), BASE_URL);
        let payload = verifier
            .verify_request(&inbound("GET", "/rest/api/2/issue/10001", &token))
            .unwrap();
        assert_eq!(payload["iss"], "tenant-1");
    }

    #[test]
    fn verify_accepts_token_from_query_parameter() {
        let client = ConnectClient::new("tenant-1", store());
        let token = client
            .sign_request("GET", "https://one.example.net/rest/api/2/issue/10001")
            .unwrap();

        let mut request = InboundRequest {
            method: "GET".to_string(),
            path: "/rest/api/2/issue/10001".to_string(),
            ..InboundRequest::default()
        };
        request.query.insert("jwt".to_string(), vec![token]);

        let verifier = TokenVerifier::new(store(), BASE_URL);
        assert!(verifier.verify_request(&request).is_ok());
    }

    #[test]
    fn verify_rejects_requests_without_a_token() {
        let verifier = TokenVerifier::new(store(), BASE_URL);

        let bare = InboundRequest {
            method: "GET".to_string(),
            path: "/".to_string(),
            ..InboundRequest::default()
        };
        assert!(matches!(
            verifier.verify_request(&bare),
            Err(ApiError::Unauthorized)
        ));

        let wrong_scheme = InboundRequest {
            authorization: Some("Bearer abc.def.ghi".to_string()),
            ..bare
        };
        assert!(matches!(
            verifier.verify_request(&wrong_scheme),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn verify_rejects_unknown_issuer_and_bad_signature() {
        let verifier = TokenVerifier::new(store(), BASE_URL);
        let now = Utc::now().timestamp();

        let foreign = encode(
            &Claims::new("tenant-unknown", now, now + 180),
            SECRET,
            Algorithm::HS256,
        )
        .unwrap();
        assert!(matches!(
            verifier.verify_request(&inbound("GET", "/", &foreign)),
            Err(ApiError::Unauthorized)
        ));

        let forged = encode(
            &Claims::new("tenant-1", now, now + 180),
            "not the shared secret",
            Algorithm::HS256,
        )
        .unwrap();
        assert!(matches!(
            verifier.verify_request(&inbound("GET", "/", &forged)),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn verify_rejects_expired_and_not_yet_valid_tokens() {
        let verifier = TokenVerifier::new(store(), BASE_URL);
        let now = Utc::now().timestamp();

        let expired = encode(
            &Claims::new("tenant-1", now - 3600, now - 3000),
            SECRET,
            Algorithm::HS256,
        )
        .unwrap();
        assert!(matches!(
            verifier.verify_request(&inbound("GET", "/", &expired)),
            Err(ApiError::Unauthorized)
        ));

        let premature = json!({
            "iss": "tenant-1",
            "iat": now,
            "exp": now + 3600,
            "nbf": now + 1800,
        });
        let token = encode(&premature, SECRET, Algorithm::HS256).unwrap();
        assert!(matches!(
            verifier.verify_request(&inbound("GET", "/", &token)),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn verify_rejects_a_token_bound_to_a_different_request() {
        let client = ConnectClient::new("tenant-1", store());
        let token = client
            .sign_request("GET", "https://one.example.net/rest/api/2/issue/10001")
            .unwrap();

        let verifier = TokenVerifier::new(store(), BASE_URL);
        assert!(matches!(
            verifier.verify_request(&inbound("GET", "/rest/api/2/issue/10002", &token)),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            verifier.verify_request(&inbound("DELETE", "/rest/api/2/issue/10001", &token)),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn verify_accepts_tokens_without_a_qsh_claim() {
        let now = Utc::now().timestamp();
        let token = encode(
            &Claims::new("tenant-1", now, now + 180),
            SECRET,
            Algorithm::HS256,
        )
        .unwrap();

        let verifier = TokenVerifier::new(store(), BASE_URL);
        assert!(verifier
            .verify_request(&inbound("GET", "/anything", &token))
            .is_ok());
    }

    #[test]
    fn verify_honors_body_param_fallback() {
        let now = Utc::now().timestamp();
        let query: QueryParams = [("x".to_string(), vec!["1".to_string()])]
            .into_iter()
            .collect();
        let qsh = create_query_string_hash(
            &CanonicalRequest {
                method: "POST",
                path: "/hook",
                query: &query,
                body: None,
            },
            false,
            BASE_URL,
        )
        .unwrap();
        let token = encode(
            &Claims::new("tenant-1", now, now + 180).with_qsh(qsh),
            SECRET,
            Algorithm::HS256,
        )
        .unwrap();

        // The proxy moved ?x=1 into the body.
        let mut request = inbound("POST", "/hook", &token);
        request
            .body_params
            .insert("x".to_string(), vec!["1".to_string()]);

        let strict = TokenVerifier::new(store(), BASE_URL);
        assert!(strict.verify_request(&request).is_err());

        let lenient = TokenVerifier::new(store(), BASE_URL).with_body_param_fallback(true);
        assert!(lenient.verify_request(&request).is_ok());
    }

    #[test]
    fn request_base_keeps_explicit_ports() {
        let url = Url::parse("http://127.0.0.1:8080/path?q=1").unwrap();
        assert_eq!(request_base(&url).unwrap(), "http://127.0.0.1:8080");

        let url = Url::parse("https://one.example.net/path").unwrap();
        assert_eq!(request_base(&url).unwrap(), "https://one.example.net");
    }
}
