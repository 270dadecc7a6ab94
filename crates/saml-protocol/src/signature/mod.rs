//! Enveloped XML-DSig over SAML elements and detached Redirect signatures.
//!
//! A signature references its parent element by `ID`, applies the
//! enveloped-signature transform followed by exclusive C14N, and is placed
//! as a direct child of the signed element. Verification trusts only the
//! certificate handed in by the caller (normally from peer metadata).
//!
//! Supported methods are RSA PKCS#1 v1.5 with SHA-256/384/512 and ECDSA
//! P-256/P-384. SHA-1 URIs are unknown here and so never verify.

pub mod c14n;
mod signer;
mod validator;

pub use signer::{sign, SigningCredential, XmlSigner};
pub use validator::{verify, XmlSignatureValidator};

use saml_crypto::{HashAlgorithm, SignatureScheme};
use serde::{Deserialize, Serialize};

use crate::types::{
    canonicalization_algorithms as c14n_uri, digest_algorithms as digest_uri,
    signature_algorithms as sig_uri,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureAlgorithm {
    #[default]
    RsaSha256,
    RsaSha384,
    RsaSha512,
    EcdsaSha256,
    EcdsaSha384,
}

impl SignatureAlgorithm {
    const ALL: [Self; 5] = [
        Self::RsaSha256,
        Self::RsaSha384,
        Self::RsaSha512,
        Self::EcdsaSha256,
        Self::EcdsaSha384,
    ];

    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha256 => sig_uri::RSA_SHA256,
            Self::RsaSha384 => sig_uri::RSA_SHA384,
            Self::RsaSha512 => sig_uri::RSA_SHA512,
            Self::EcdsaSha256 => sig_uri::ECDSA_SHA256,
            Self::EcdsaSha384 => sig_uri::ECDSA_SHA384,
        }
    }

    /// Accepts both `SignatureMethod/@Algorithm` and the Redirect `SigAlg`.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.uri() == uri)
    }

    /// The key operation behind this algorithm.
    #[must_use]
    pub const fn scheme(&self) -> SignatureScheme {
        match self {
            Self::RsaSha256 => SignatureScheme::RsaPkcs1Sha256,
            Self::RsaSha384 => SignatureScheme::RsaPkcs1Sha384,
            Self::RsaSha512 => SignatureScheme::RsaPkcs1Sha512,
            Self::EcdsaSha256 => SignatureScheme::EcdsaP256Sha256,
            Self::EcdsaSha384 => SignatureScheme::EcdsaP384Sha384,
        }
    }

    /// Reference digest used unless configured otherwise.
    #[must_use]
    pub const fn digest_algorithm(&self) -> DigestAlgorithm {
        match self {
            Self::RsaSha256 | Self::EcdsaSha256 => DigestAlgorithm::Sha256,
            Self::RsaSha384 | Self::EcdsaSha384 => DigestAlgorithm::Sha384,
            Self::RsaSha512 => DigestAlgorithm::Sha512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    const ALL: [Self; 3] = [Self::Sha256, Self::Sha384, Self::Sha512];

    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Sha256 => digest_uri::SHA256,
            Self::Sha384 => digest_uri::SHA384,
            Self::Sha512 => digest_uri::SHA512,
        }
    }

    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.uri() == uri)
    }

    #[must_use]
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let hash = match self {
            Self::Sha256 => HashAlgorithm::Sha256,
            Self::Sha384 => HashAlgorithm::Sha384,
            Self::Sha512 => HashAlgorithm::Sha512,
        };
        saml_crypto::digest(hash, data)
    }
}

/// Exclusive C14N, with or without comment nodes. Inclusive C14N is not
/// offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CanonicalizationAlgorithm {
    #[default]
    ExclusiveC14n,
    ExclusiveC14nWithComments,
}

impl CanonicalizationAlgorithm {
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::ExclusiveC14n => c14n_uri::EXCLUSIVE_C14N,
            Self::ExclusiveC14nWithComments => c14n_uri::EXCLUSIVE_C14N_WITH_COMMENTS,
        }
    }

    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        [Self::ExclusiveC14n, Self::ExclusiveC14nWithComments]
            .into_iter()
            .find(|c| c.uri() == uri)
    }

    #[must_use]
    pub const fn with_comments(&self) -> bool {
        matches!(self, Self::ExclusiveC14nWithComments)
    }
}

/// What a verified `<ds:Signature>` declared.
#[derive(Debug, Clone)]
pub struct XmlSignature {
    pub algorithm: SignatureAlgorithm,
    pub digest: DigestAlgorithm,
    pub canonicalization: CanonicalizationAlgorithm,
    /// `ID` of the signed element.
    pub reference_id: String,
    /// Base64 DER from `KeyInfo`, informational only.
    pub embedded_certificate: Option<String>,
}

/// How this party signs; part of both engine configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    pub algorithm: SignatureAlgorithm,
    pub digest: DigestAlgorithm,
    pub canonicalization: CanonicalizationAlgorithm,
    /// Embed the signing certificate in `KeyInfo`.
    pub include_certificate: bool,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self::with_algorithm(SignatureAlgorithm::RsaSha256)
    }
}

impl SignatureConfig {
    /// `algorithm` with its usual digest, exclusive C14N and an embedded
    /// certificate.
    #[must_use]
    pub const fn with_algorithm(algorithm: SignatureAlgorithm) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest_algorithm(),
            canonicalization: CanonicalizationAlgorithm::ExclusiveC14n,
            include_certificate: true,
        }
    }
}
