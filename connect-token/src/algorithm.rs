use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};

use crate::error::TokenError;

/// The closed set of supported HMAC signing algorithms.
///
/// Each variant selects its hash function at compile time through the
/// `match` in [`Algorithm::sign`]; there is no runtime algorithm table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// HMAC-SHA256 (the default).
    #[default]
    HS256,
    /// HMAC-SHA384.
    HS384,
    /// HMAC-SHA512.
    HS512,
}

impl Algorithm {
    /// Compute the raw HMAC digest of `input` keyed with `secret`.
    pub(crate) fn sign(self, secret: &[u8], input: &[u8]) -> Vec<u8> {
        match self {
            Algorithm::HS256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(secret)
                    .expect("HMAC can take key of any size");
                mac.update(input);
                mac.finalize().into_bytes().to_vec()
            }
            Algorithm::HS384 => {
                let mut mac = Hmac::<Sha384>::new_from_slice(secret)
                    .expect("HMAC can take key of any size");
                mac.update(input);
                mac.finalize().into_bytes().to_vec()
            }
            Algorithm::HS512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(secret)
                    .expect("HMAC can take key of any size");
                mac.update(input);
                mac.finalize().into_bytes().to_vec()
            }
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::HS256 => write!(f, "HS256"),
            Algorithm::HS384 => write!(f, "HS384"),
            Algorithm::HS512 => write!(f, "HS512"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(Algorithm::HS256),
            "HS384" => Ok(Algorithm::HS384),
            "HS512" => Ok(Algorithm::HS512),
            other => Err(TokenError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}
