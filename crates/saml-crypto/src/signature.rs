//! Signature error type.

use thiserror::Error;

/// Error type for key handling and signature operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Invalid key format.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// Certificate could not be parsed or carries an unusable key.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// PEM armour could not be decoded.
    #[error("invalid PEM: {0}")]
    InvalidPem(String),

    /// Algorithm not supported by the key.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_failure() {
        let error = SignatureError::UnsupportedAlgorithm("EcdsaP384Sha384 with an RSA key".into());
        assert_eq!(
            error.to_string(),
            "algorithm not supported: EcdsaP384Sha384 with an RSA key"
        );
    }
}
