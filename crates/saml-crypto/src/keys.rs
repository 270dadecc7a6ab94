//! Private signing keys.
//!
//! Keys arrive already loaded (PEM text or DER bytes); reading them from
//! disk is the caller's job.

use std::fmt;

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{
        self, EcdsaKeyPair, RsaKeyPair, ECDSA_P256_SHA256_FIXED_SIGNING,
        ECDSA_P384_SHA384_FIXED_SIGNING,
    },
};

use crate::algorithm::{KeyType, SignatureScheme};
use crate::pem;
use crate::signature::SignatureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Curve {
    P256,
    P384,
}

enum KeyMaterial {
    Rsa(RsaKeyPair),
    Ecdsa { pair: EcdsaKeyPair, curve: Curve },
}

/// A private key able to produce XML-DSig and Redirect-binding signatures.
pub struct SigningKey {
    material: KeyMaterial,
}

impl SigningKey {
    /// Loads a PKCS#8 DER-encoded RSA or ECDSA (P-256, P-384) private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a supported PKCS#8 key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, SignatureError> {
        if let Ok(pair) = RsaKeyPair::from_pkcs8(der) {
            return Ok(Self {
                material: KeyMaterial::Rsa(pair),
            });
        }
        if let Ok(pair) = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, der) {
            return Ok(Self {
                material: KeyMaterial::Ecdsa {
                    pair,
                    curve: Curve::P256,
                },
            });
        }
        if let Ok(pair) = EcdsaKeyPair::from_pkcs8(&ECDSA_P384_SHA384_FIXED_SIGNING, der) {
            return Ok(Self {
                material: KeyMaterial::Ecdsa {
                    pair,
                    curve: Curve::P384,
                },
            });
        }
        Err(SignatureError::InvalidKey(
            "not a PKCS#8 RSA, P-256 or P-384 private key".into(),
        ))
    }

    /// Loads a DER private key, accepting PKCS#8 or a PKCS#1 `RSAPrivateKey`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are neither.
    pub fn from_der(der: &[u8]) -> Result<Self, SignatureError> {
        Self::from_pkcs8_der(der).or_else(|_| {
            RsaKeyPair::from_der(der)
                .map(|pair| Self {
                    material: KeyMaterial::Rsa(pair),
                })
                .map_err(|e| SignatureError::InvalidKey(format!("invalid RSA key: {e}")))
        })
    }

    /// Loads a key from `PRIVATE KEY` or `RSA PRIVATE KEY` PEM text.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM is malformed or the key unsupported.
    pub fn from_pem(pem_text: &str) -> Result<Self, SignatureError> {
        let block = pem::decode_first(pem_text, &["PRIVATE KEY", "RSA PRIVATE KEY"])?;
        Self::from_der(&block.der)
    }

    /// Returns the key family.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        match self.material {
            KeyMaterial::Rsa(_) => KeyType::Rsa,
            KeyMaterial::Ecdsa { .. } => KeyType::Ec,
        }
    }

    /// Returns the scheme used when the caller has no preference.
    #[must_use]
    pub fn default_scheme(&self) -> SignatureScheme {
        match self.material {
            KeyMaterial::Rsa(_) => SignatureScheme::RsaPkcs1Sha256,
            KeyMaterial::Ecdsa {
                curve: Curve::P256, ..
            } => SignatureScheme::EcdsaP256Sha256,
            KeyMaterial::Ecdsa {
                curve: Curve::P384, ..
            } => SignatureScheme::EcdsaP384Sha384,
        }
    }

    /// Returns true if this key can sign with `scheme`.
    #[must_use]
    pub fn supports(&self, scheme: SignatureScheme) -> bool {
        match (&self.material, scheme) {
            (KeyMaterial::Rsa(_), s) => s.key_type() == KeyType::Rsa,
            (KeyMaterial::Ecdsa { curve, .. }, SignatureScheme::EcdsaP256Sha256) => {
                *curve == Curve::P256
            }
            (KeyMaterial::Ecdsa { curve, .. }, SignatureScheme::EcdsaP384Sha384) => {
                *curve == Curve::P384
            }
            (KeyMaterial::Ecdsa { .. }, _) => false,
        }
    }

    /// Signs `data` with `scheme`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme does not fit the key or signing fails.
    pub fn sign(&self, scheme: SignatureScheme, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        if !self.supports(scheme) {
            return Err(SignatureError::UnsupportedAlgorithm(format!(
                "{scheme:?} cannot be used with a {:?} key",
                self.key_type()
            )));
        }

        let rng = SystemRandom::new();
        match &self.material {
            KeyMaterial::Rsa(pair) => {
                let padding: &'static dyn signature::RsaEncoding = match scheme {
                    SignatureScheme::RsaPkcs1Sha384 => &signature::RSA_PKCS1_SHA384,
                    SignatureScheme::RsaPkcs1Sha512 => &signature::RSA_PKCS1_SHA512,
                    _ => &signature::RSA_PKCS1_SHA256,
                };
                let mut sig = vec![0u8; pair.public_modulus_len()];
                pair.sign(padding, &rng, data, &mut sig)
                    .map_err(|e| SignatureError::Signing(format!("RSA signing failed: {e}")))?;
                Ok(sig)
            }
            KeyMaterial::Ecdsa { pair, .. } => pair
                .sign(&rng, data)
                .map(|sig| sig.as_ref().to_vec())
                .map_err(|e| SignatureError::Signing(format!("ECDSA signing failed: {e}"))),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_type", &self.key_type())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}
