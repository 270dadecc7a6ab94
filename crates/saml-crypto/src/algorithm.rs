//! Algorithm identifiers.

use serde::{Deserialize, Serialize};

/// Message digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Returns the digest length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// Public key families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// RSA keys.
    Rsa,
    /// Elliptic curve keys (P-256 or P-384).
    Ec,
}

/// Signature schemes usable for XML-DSig and the detached Redirect signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureScheme {
    /// RSA PKCS#1 v1.5 with SHA-256.
    #[default]
    RsaPkcs1Sha256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    RsaPkcs1Sha384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    RsaPkcs1Sha512,
    /// ECDSA on P-256 with SHA-256, fixed-width `r || s` encoding.
    EcdsaP256Sha256,
    /// ECDSA on P-384 with SHA-384, fixed-width `r || s` encoding.
    EcdsaP384Sha384,
}

impl SignatureScheme {
    /// Returns the hash algorithm the scheme signs with.
    #[must_use]
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::RsaPkcs1Sha256 | Self::EcdsaP256Sha256 => HashAlgorithm::Sha256,
            Self::RsaPkcs1Sha384 | Self::EcdsaP384Sha384 => HashAlgorithm::Sha384,
            Self::RsaPkcs1Sha512 => HashAlgorithm::Sha512,
        }
    }

    /// Returns the key family the scheme needs.
    #[must_use]
    pub const fn key_type(self) -> KeyType {
        match self {
            Self::RsaPkcs1Sha256 | Self::RsaPkcs1Sha384 | Self::RsaPkcs1Sha512 => KeyType::Rsa,
            Self::EcdsaP256Sha256 | Self::EcdsaP384Sha384 => KeyType::Ec,
        }
    }
}
