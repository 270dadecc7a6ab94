//! X.509 certificates used as trust anchors for peer signatures.

use std::fmt;

use aws_lc_rs::signature::{
    self, UnparsedPublicKey, ECDSA_P256_SHA256_FIXED, ECDSA_P384_SHA384_FIXED,
    RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_2048_8192_SHA384, RSA_PKCS1_2048_8192_SHA512,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::algorithm::{HashAlgorithm, KeyType, SignatureScheme};
use crate::hash;
use crate::pem;
use crate::signature::SignatureError;

/// A parsed X.509 certificate.
///
/// Only the pieces signature verification needs are retained next to the
/// original DER, so the value is cheap to clone and compare.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    key_type: KeyType,
    public_key: Vec<u8>,
    subject: String,
    not_after: i64,
}

impl Certificate {
    /// Parses a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the DER is invalid or the key is neither RSA nor EC.
    pub fn from_der(der: &[u8]) -> Result<Self, SignatureError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| SignatureError::InvalidCertificate(e.to_string()))?;

        let spki = cert.public_key();
        let key_type = match spki.parsed() {
            Ok(PublicKey::RSA(_)) => KeyType::Rsa,
            Ok(PublicKey::EC(_)) => KeyType::Ec,
            Ok(_) => {
                return Err(SignatureError::InvalidCertificate(
                    "only RSA and EC public keys are supported".into(),
                ))
            }
            Err(e) => return Err(SignatureError::InvalidCertificate(e.to_string())),
        };

        Ok(Self {
            der: der.to_vec(),
            key_type,
            public_key: spki.subject_public_key.data.to_vec(),
            subject: cert.subject().to_string(),
            not_after: cert.validity().not_after.timestamp(),
        })
    }

    /// Parses the first `CERTIFICATE` block of PEM text.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM or the certificate is invalid.
    pub fn from_pem(pem_text: &str) -> Result<Self, SignatureError> {
        let block = pem::decode_first(pem_text, &["CERTIFICATE"])?;
        Self::from_der(&block.der)
    }

    /// Parses bare base64 DER as found in `ds:X509Certificate`.
    /// Whitespace inside the value is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the base64 or the certificate is invalid.
    pub fn from_base64(value: &str) -> Result<Self, SignatureError> {
        let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        let der = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| SignatureError::InvalidCertificate(format!("invalid base64: {e}")))?;
        Self::from_der(&der)
    }

    /// Returns the DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the DER encoding as single-line base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.der)
    }

    /// Returns the subject distinguished name.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the end of the validity period as a Unix timestamp.
    #[must_use]
    pub fn not_after(&self) -> i64 {
        self.not_after
    }

    /// Returns the public key family.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Returns the fingerprint of the DER encoding.
    #[must_use]
    pub fn fingerprint(&self, algorithm: HashAlgorithm) -> Vec<u8> {
        hash::digest(algorithm, &self.der)
    }

    /// Verifies `sig` over `data` with the certificate's public key.
    ///
    /// Returns `false` for a bad signature and for a scheme that does not
    /// fit the key, never an error.
    #[must_use]
    pub fn verify(&self, scheme: SignatureScheme, data: &[u8], sig: &[u8]) -> bool {
        if scheme.key_type() != self.key_type {
            return false;
        }

        let algorithm: &'static dyn signature::VerificationAlgorithm = match scheme {
            SignatureScheme::RsaPkcs1Sha256 => &RSA_PKCS1_2048_8192_SHA256,
            SignatureScheme::RsaPkcs1Sha384 => &RSA_PKCS1_2048_8192_SHA384,
            SignatureScheme::RsaPkcs1Sha512 => &RSA_PKCS1_2048_8192_SHA512,
            SignatureScheme::EcdsaP256Sha256 => &ECDSA_P256_SHA256_FIXED,
            SignatureScheme::EcdsaP384Sha384 => &ECDSA_P384_SHA384_FIXED,
        };

        UnparsedPublicKey::new(algorithm, &self.public_key)
            .verify(data, sig)
            .is_ok()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("key_type", &self.key_type)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}
