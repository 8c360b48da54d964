//! # Connect Token
//!
//! Core codec for Connect integration tokens.
//!
//! This crate provides the two security-critical pieces of the SDK: a
//! compact signed token codec (JWT with the HS256/HS384/HS512 HMAC
//! family) and the canonical request hasher that binds a token to one
//! specific HTTP request through the `qsh` claim. It has no networking
//! dependencies and no internal state; every function is a pure,
//! deterministic computation over its inputs and is safe to call
//! concurrently.
//!
//! ## Usage
//!
//! ```
//! use connect_token::{
//!     create_query_string_hash, decode, encode, Algorithm, CanonicalRequest, Claims,
//!     QueryParams,
//! };
//!
//! fn main() -> Result<(), connect_token::TokenError> {
//!     let query = QueryParams::new();
//!     let request = CanonicalRequest {
//!         method: "PUT",
//!         path: "/rest/api/2/issue/10001",
//!         query: &query,
//!         body: None,
//!     };
//!     let qsh = create_query_string_hash(&request, false, "https://tenant.example.net")?;
//!
//!     let claims = Claims::new("my-add-on", 1300819380, 1300819560).with_qsh(qsh);
//!     let token = encode(&claims, "shared secret", Algorithm::HS256)?;
//!
//!     let payload = decode(&token, "shared secret")?;
//!     assert_eq!(payload["iss"], "my-add-on");
//!     Ok(())
//! }
//! ```

mod algorithm;
mod canonical;
mod claims;
mod encode;
mod error;
mod verify;

pub use algorithm::Algorithm;
pub use canonical::{
    create_canonical_request, create_query_string_hash, encode_rfc3986, CanonicalRequest,
    QueryParams,
};
pub use claims::Claims;
pub use encode::encode;
pub use error::TokenError;
pub use verify::{decode, decode_unverified};
