use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TokenError;

/// The claim set minted for an outbound signed request.
///
/// The decode path deliberately works on the generic
/// `serde_json::Map<String, Value>` form so unknown claims survive a
/// round trip; this struct is the typed view used when minting, with
/// mapping functions between the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Tenant identifier of the token issuer.
    pub iss: String,
    /// Issued-at, integer seconds since epoch.
    pub iat: i64,
    /// Expiry, integer seconds since epoch. Must be minted strictly
    /// greater than `iat`; the codec does not enforce this, verifying
    /// callers check it against current time.
    pub exp: i64,
    /// Query string hash binding the token to one specific request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qsh: Option<String>,
    /// Intended audience. Decoding normalizes a single value to a
    /// one-element list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Vec<String>>,
}

impl Claims {
    /// Create a claim set with the mandatory claims only.
    pub fn new(iss: impl Into<String>, iat: i64, exp: i64) -> Self {
        Claims {
            iss: iss.into(),
            iat,
            exp,
            qsh: None,
            aud: None,
        }
    }

    /// Attach a query string hash claim.
    pub fn with_qsh(mut self, qsh: impl Into<String>) -> Self {
        self.qsh = Some(qsh.into());
        self
    }

    /// Attach an audience claim.
    pub fn with_aud(mut self, aud: Vec<String>) -> Self {
        self.aud = Some(aud);
        self
    }

    /// Build the typed view from a decoded payload map.
    ///
    /// Fails with [`TokenError::MalformedToken`] when the mandatory
    /// claims are missing or of the wrong type.
    pub fn from_map(payload: &Map<String, Value>) -> Result<Self, TokenError> {
        serde_json::from_value(Value::Object(payload.clone()))
            .map_err(|_| TokenError::MalformedToken)
    }

    /// Convert to the generic map form used by the codec.
    pub fn to_map(&self) -> Result<Map<String, Value>, TokenError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(TokenError::MalformedToken),
        }
    }
}
