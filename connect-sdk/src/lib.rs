//! # Connect SDK
//!
//! A Rust toolkit for integrations that authenticate with a SaaS host
//! using signed Connect tokens.
//!
//! This crate combines functionality from:
//! - `connect-token`: the token codec and canonical request hasher
//! - `connect-config`: tenant credential records and the credential store
//! - `connect-api`: signed outbound requests and inbound verification
//!
//! ## Features
//!
//! - **Token codec**: compact HS256/HS384/HS512 tokens with a query
//!   string hash binding each token to one request
//! - **Credential management**: install and uninstall lifecycle handling,
//!   with stores loadable from files or the environment
//! - **Outbound signing**: short-lived tokens minted per request and
//!   attached as `Authorization: JWT <token>`
//! - **Inbound verification**: issuer lookup, signature and validity
//!   checks, and canonical request hash comparison
//!
//! ## Feature Flags
//!
//! - `toml`: enables credential store loading from TOML files (on by
//!   default)
//!
//! ## Quick start
//!
//! ```
//! use connect_sdk::{Connect, Credential};
//!
//! # fn main() -> Result<(), connect_sdk::SdkError> {
//! let mut connect = Connect::builder()
//!     .issuer("my-add-on")
//!     .base_url("https://my-add-on.example.com")
//!     .build()?;
//!
//! // Install lifecycle callback from a tenant.
//! connect.install(Credential::new(
//!     "tenant-1",
//!     "-----BEGIN PUBLIC KEY-----...",
//!     "shared secret",
//!     "https://tenant-1.example.net",
//! ))?;
//!
//! // Mint a token for an outbound call to that tenant.
//! let token = connect.sign_request("GET", "https://tenant-1.example.net/rest/api/2/issue/1")?;
//! assert_eq!(token.matches('.').count(), 2);
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

// Re-export everything from the component crates
pub use connect_token::{
    // Canonical request hashing
    create_canonical_request,
    create_query_string_hash,
    // Token codec
    decode,
    decode_unverified,
    encode,
    encode_rfc3986,
    Algorithm,
    CanonicalRequest,
    Claims,
    QueryParams,
    // Token errors
    TokenError,
};

pub use connect_config::{try_load_default_store, ConfigError, Credential, CredentialStore};

pub use connect_api::{
    ApiError, ConnectClient, InboundRequest, TokenTimeConfig, TokenVerifier,
};

/// Errors that can occur in the Connect SDK
#[derive(Error, Debug)]
pub enum SdkError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// API error
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Token error
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Generic(String),
}

/// Unified SDK for Connect integrations
///
/// This struct provides a high-level interface combining functionality
/// from all component crates (token, config, api): credential lifecycle,
/// outbound request signing and inbound request verification against one
/// shared credential store.
pub struct Connect {
    issuer: String,
    base_url: String,
    time_config: TokenTimeConfig,
    http: reqwest::Client,
    check_body_for_params: bool,
    store: CredentialStore,
    client: ConnectClient,
    verifier: TokenVerifier,
}

impl Connect {
    /// Create an SDK instance from an existing credential store.
    ///
    /// `issuer` is this integration's own key, used as the `iss` claim of
    /// outbound tokens. `base_url` is the public base URL this service is
    /// reachable under; inbound hash checks strip its path component.
    pub fn new(
        issuer: impl Into<String>,
        base_url: impl Into<String>,
        store: CredentialStore,
    ) -> Self {
        let issuer = issuer.into();
        let base_url = base_url.into();
        let time_config = TokenTimeConfig::default();
        let http = reqwest::Client::new();

        let client = ConnectClient::new(&issuer, store.clone())
            .with_http_client(http.clone())
            .with_time_config(time_config);
        let verifier = TokenVerifier::new(store.clone(), &base_url);

        Self {
            issuer,
            base_url,
            time_config,
            http,
            check_body_for_params: false,
            store,
            client,
            verifier,
        }
    }

    /// Create a builder for a Connect SDK instance
    pub fn builder() -> ConnectBuilder {
        ConnectBuilder::new()
    }

    /// Handle a tenant install (or re-install) lifecycle callback.
    ///
    /// The record is validated before it is stored; a record for the same
    /// client key is replaced, which is how secret rotation on re-install
    /// works.
    pub fn install(&mut self, credential: Credential) -> Result<(), SdkError> {
        credential.validate()?;
        self.store.register(credential);
        self.rebuild();
        Ok(())
    }

    /// Handle a tenant uninstall lifecycle callback. Returns the removed
    /// record, if the tenant was known.
    pub fn uninstall(&mut self, client_key: &str) -> Option<Credential> {
        let removed = self.store.remove(client_key);
        if removed.is_some() {
            self.rebuild();
        }
        removed
    }

    /// Mint a signed token for an outbound request without sending it.
    pub fn sign_request(&self, method: &str, url: &str) -> Result<String, SdkError> {
        Ok(self.client.sign_request(method, url)?)
    }

    /// Send a signed request to a tenant, with an optional JSON body.
    pub async fn send_signed(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, SdkError> {
        Ok(self.client.send_signed(method, url, body).await?)
    }

    /// Authenticate an inbound request and return its verified claim
    /// payload.
    pub fn verify_request(
        &self,
        request: &InboundRequest,
    ) -> Result<serde_json::Map<String, serde_json::Value>, SdkError> {
        Ok(self.verifier.verify_request(request)?)
    }

    /// Get the client used by this SDK instance
    pub fn client(&self) -> &ConnectClient {
        &self.client
    }

    /// Get the credential store used by this SDK instance
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    // Client and verifier hold snapshots of the store, so both are
    // rebuilt whenever the store changes.
    fn rebuild(&mut self) {
        self.client = ConnectClient::new(&self.issuer, self.store.clone())
            .with_http_client(self.http.clone())
            .with_time_config(self.time_config);
        self.verifier = TokenVerifier::new(self.store.clone(), &self.base_url)
            .with_body_param_fallback(self.check_body_for_params);
    }
}

/// Builder for Connect SDK instances
#[derive(Default)]
pub struct ConnectBuilder {
    issuer: Option<String>,
    base_url: Option<String>,
    store: CredentialStore,
    time_config: Option<TokenTimeConfig>,
    http: Option<reqwest::Client>,
    check_body_for_params: bool,
}

impl ConnectBuilder {
    /// Create a new Connect SDK builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set this integration's own key (the `iss` claim of outbound
    /// tokens)
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the public base URL this service is reachable under
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Start from an existing credential store
    pub fn store(mut self, store: CredentialStore) -> Self {
        self.store = store;
        self
    }

    /// Pre-register a tenant credential
    pub fn credential(mut self, credential: Credential) -> Self {
        self.store.register(credential);
        self
    }

    /// Override the validity window of minted tokens
    pub fn time_config(mut self, time_config: TokenTimeConfig) -> Self {
        self.time_config = Some(time_config);
        self
    }

    /// Use a custom reqwest client for outbound requests
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Accept query parameters relocated into the body of POST and PUT
    /// requests by intermediaries
    pub fn body_param_fallback(mut self, enabled: bool) -> Self {
        self.check_body_for_params = enabled;
        self
    }

    /// Build a Connect SDK instance
    pub fn build(self) -> Result<Connect, SdkError> {
        let issuer = self
            .issuer
            .ok_or_else(|| SdkError::Generic("issuer is required".to_string()))?;
        let base_url = self
            .base_url
            .ok_or_else(|| SdkError::Generic("base URL is required".to_string()))?;
        self.store.validate()?;

        let mut connect = Connect::new(issuer, base_url, self.store);
        if let Some(time_config) = self.time_config {
            connect.time_config = time_config;
        }
        if let Some(http) = self.http {
            connect.http = http;
        }
        connect.check_body_for_params = self.check_body_for_params;
        connect.rebuild();
        Ok(connect)
    }
}
