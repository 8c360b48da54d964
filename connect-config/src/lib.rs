//! # Connect Config
//!
//! Tenant credential records and the credential store used by the Connect
//! SDK.
//!
//! Each SaaS tenant that installs the integration hands over a credential
//! record: its client key, public key, the shared secret used to sign and
//! verify tokens, and the tenant's base URL. The [`CredentialStore`] keeps
//! those records and answers the two lookups the rest of the SDK needs:
//! by client key (inbound verification) and by base URL (outbound
//! signing).
//!
//! Stores can be built in code, loaded from JSON or TOML files, or from
//! environment variables. There is no process-global store: callers pass
//! the store explicitly to the components that need it.
//!
//! ## Examples
//!
//! ```
//! use connect_config::{Credential, CredentialStore};
//!
//! let mut store = CredentialStore::new();
//! store.register(Credential::new(
//!     "tenant-1",
//!     "-----BEGIN PUBLIC KEY-----...",
//!     "shared secret",
//!     "https://tenant-1.example.net",
//! ));
//!
//! assert!(store.find_by_client_key("tenant-1").is_some());
//! assert!(store.find_by_base_url("https://tenant-1.example.net").is_some());
//! ```

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading or validating credentials.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("client key is required but was not provided")]
    MissingClientKey,

    #[error("shared secret is required but was not provided")]
    MissingSharedSecret,

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse credential data: {0}")]
    Parse(String),

    #[error("environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        ConfigError::Parse(error.to_string())
    }
}

#[cfg(feature = "toml")]
impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        ConfigError::Parse(error.to_string())
    }
}

/// One tenant's credential record.
///
/// These fields come from the install lifecycle callback of the SaaS
/// platform and are opaque to the token codec; the shared secret is lent
/// to the codec for the duration of a single sign or verify call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Tenant identifier; matches the `iss` claim of inbound tokens.
    pub client_key: String,
    /// Tenant public key, kept verbatim from the install payload.
    pub public_key: String,
    /// Shared secret used for HMAC signing and verification.
    pub shared_secret: String,
    /// Base URL of the tenant, e.g. `https://tenant.example.net`.
    pub base_url: String,
}

impl Credential {
    /// Create a credential record.
    pub fn new(
        client_key: impl Into<String>,
        public_key: impl Into<String>,
        shared_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Credential {
            client_key: client_key.into(),
            public_key: public_key.into(),
            shared_secret: shared_secret.into(),
            base_url: base_url.into(),
        }
    }

    /// Validate the record.
    ///
    /// Checks that the identifying fields and the secret are present and
    /// that the base URL looks like an absolute HTTP(S) URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_key.is_empty() {
            return Err(ConfigError::MissingClientKey);
        }
        if self.shared_secret.is_empty() {
            return Err(ConfigError::MissingSharedSecret);
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(())
    }
}

/// In-memory registry of tenant credentials.
///
/// Records are keyed by client key; registering a credential for an
/// already-known client key replaces the previous record (re-install).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialStore {
    credentials: Vec<Credential>,
}

impl CredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from a list of records.
    pub fn with_credentials(credentials: Vec<Credential>) -> Self {
        CredentialStore { credentials }
    }

    /// Register a credential, replacing any record with the same client
    /// key.
    pub fn register(&mut self, credential: Credential) {
        self.credentials
            .retain(|existing| existing.client_key != credential.client_key);
        self.credentials.push(credential);
    }

    /// Remove the record for `client_key` (uninstall). Returns the
    /// removed record, if any.
    pub fn remove(&mut self, client_key: &str) -> Option<Credential> {
        let index = self
            .credentials
            .iter()
            .position(|credential| credential.client_key == client_key)?;
        Some(self.credentials.remove(index))
    }

    /// Look up a credential by client key (the issuer of an inbound
    /// token). `None` is a hard authentication failure for callers, not a
    /// retryable condition.
    pub fn find_by_client_key(&self, client_key: &str) -> Option<&Credential> {
        self.credentials
            .iter()
            .find(|credential| credential.client_key == client_key)
    }

    /// Look up a credential by tenant base URL, used when signing an
    /// outbound request to that tenant.
    pub fn find_by_base_url(&self, base_url: &str) -> Option<&Credential> {
        let wanted = base_url.trim_end_matches('/');
        self.credentials
            .iter()
            .find(|credential| credential.base_url.trim_end_matches('/') == wanted)
    }

    /// Number of registered credentials.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Whether the store holds no credentials.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Registered credentials, in registration order.
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// Validate every record in the store.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for credential in &self.credentials {
            credential.validate()?;
        }
        Ok(())
    }

    /// Load a store from a JSON array of credential records.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let store: CredentialStore = serde_json::from_str(json)?;
        store.validate()?;
        Ok(store)
    }

    /// Load a store from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Load a store from a TOML document with a `[[credentials]]` table
    /// array.
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct TomlStore {
            credentials: Vec<Credential>,
        }

        let parsed: TomlStore = toml::from_str(toml_str)?;
        let store = CredentialStore::with_credentials(parsed.credentials);
        store.validate()?;
        Ok(store)
    }

    /// Load a store from a TOML file.
    #[cfg(feature = "toml")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load a single-tenant store from environment variables.
    ///
    /// With the prefix `CONNECT`, the variables are:
    /// - `CONNECT_CLIENT_KEY`
    /// - `CONNECT_PUBLIC_KEY` (optional, defaults to empty)
    /// - `CONNECT_SHARED_SECRET`
    /// - `CONNECT_BASE_URL`
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let client_key = env::var(format!("{prefix}_CLIENT_KEY"))?;
        let shared_secret = env::var(format!("{prefix}_SHARED_SECRET"))?;
        let base_url = env::var(format!("{prefix}_BASE_URL"))?;

        let public_key = match env::var(format!("{prefix}_PUBLIC_KEY")) {
            Ok(key) => key,
            Err(env::VarError::NotPresent) => String::new(),
            Err(e) => return Err(e.into()),
        };

        let store = CredentialStore::with_credentials(vec![Credential::new(
            client_key,
            public_key,
            shared_secret,
            base_url,
        )]);
        store.validate()?;
        Ok(store)
    }
}

/// Try to load a credential store from standard locations.
///
/// Attempts, in order:
/// 1. Environment variables with the prefix `CONNECT`
/// 2. `./connect.json`
/// 3. `~/.connect/credentials.json`
/// 4. `/etc/connect/credentials.json`
/// 5. The TOML variants of the same paths (with the `toml` feature)
///
/// Returns `None` when no location yields a valid store.
pub fn try_load_default_store() -> Option<CredentialStore> {
    if let Ok(store) = CredentialStore::from_env("CONNECT") {
        return Some(store);
    }

    let json_paths = [
        "./connect.json",
        "~/.connect/credentials.json",
        "/etc/connect/credentials.json",
    ];
    for path in expand_paths(&json_paths) {
        if path.exists() {
            if let Ok(store) = CredentialStore::from_json_file(&path) {
                return Some(store);
            }
        }
    }

    #[cfg(feature = "toml")]
    {
        let toml_paths = [
            "./connect.toml",
            "~/.connect/credentials.toml",
            "/etc/connect/credentials.toml",
        ];
        for path in expand_paths(&toml_paths) {
            if path.exists() {
                if let Ok(store) = CredentialStore::from_toml_file(&path) {
                    return Some(store);
                }
            }
        }
    }

    None
}

fn expand_paths(paths: &[&str]) -> Vec<std::path::PathBuf> {
    paths
        .iter()
        .filter_map(|path| {
            if let Some(stripped) = path.strip_prefix("~/") {
                dirs::home_dir().map(|home| home.join(stripped))
            } else {
                Some(Path::new(path).to_path_buf())
            }
        })
        .collect()
}
