//! # saml-crypto
//!
//! Cryptographic primitives for the SAML 2.0 SSO engines using aws-lc-rs.
//!
//! ## Scope
//!
//! - Message digests for XML-DSig references (SHA-256/384/512) and HMAC-SHA256
//! - RSA PKCS#1 v1.5 and ECDSA signing keys loaded from PKCS#8
//! - X.509 certificate parsing and signature verification
//! - Random protocol identifiers
//!
//! SHA-1 based algorithms are deliberately absent.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod certificate;
pub mod hash;
pub mod keys;
pub mod pem;
pub mod random;
pub mod signature;

pub use algorithm::{HashAlgorithm, KeyType, SignatureScheme};
pub use certificate::Certificate;
pub use hash::{constant_time_eq, digest, hmac_sha256};
pub use keys::SigningKey;
pub use random::generate_id;
pub use signature::SignatureError;
