//! SAML error types.
//!
//! Every validation failure surfaces with its specific kind; nothing is
//! folded into a generic failure. Signature and replay errors are always
//! terminal for the operation that raised them.

use thiserror::Error;

use crate::types::constants::{status_codes, sub_status_codes};

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML protocol errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// The message could not be decoded or is not well-formed SAML.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// An entity descriptor is invalid or incomplete.
    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    /// The issuer is not a registered peer of the expected role.
    #[error("unknown issuer: {0}")]
    UnknownIssuer(String),

    /// The message was addressed to a different endpoint.
    #[error("destination mismatch: expected {expected}, got {actual}")]
    DestinationMismatch {
        /// This endpoint's own URL.
        expected: String,
        /// The destination carried by the message.
        actual: String,
    },

    /// The AuthnRequest is older than the allowed age or dated in the future.
    #[error("request expired: {0}")]
    RequestExpired(String),

    /// A required signature is absent or does not verify.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// The response does not answer an outstanding request.
    #[error("unsolicited response: {0}")]
    UnsolicitedResponse(String),

    /// The response id was already consumed.
    #[error("replayed response: {0}")]
    ReplayedResponse(String),

    /// The binding is not supported for this message.
    #[error("invalid binding: {0}")]
    InvalidBinding(String),

    /// Configuration, key material or peer registration is unusable.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The assertion's `NotOnOrAfter` has passed.
    #[error("assertion expired")]
    AssertionExpired,

    /// The assertion's `NotBefore` lies in the future.
    #[error("assertion not yet valid")]
    AssertionNotYetValid,

    /// The audience restriction does not name this SP.
    #[error("audience mismatch: expected {expected}, got {actual}")]
    AudienceMismatch {
        /// This SP's entity ID.
        expected: String,
        /// The audiences found in the assertion.
        actual: String,
    },

    /// An assertion was issued by someone other than the response issuer.
    #[error("issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// The issuer of the enclosing response.
        expected: String,
        /// The issuer found on the assertion.
        actual: String,
    },

    /// The IdP answered with a non-success status.
    #[error("response status {status}: {message}")]
    StatusNotSuccess {
        /// The top-level (or, when present, second-level) status code URI.
        status: String,
        /// The status message, empty when absent.
        message: String,
    },

    /// The requested NameID format is not offered.
    #[error("unsupported name ID format: {0}")]
    UnsupportedNameIdFormat(String),

    /// The end user could not be authenticated by the external login step.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Key material could not be used.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Serialization failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SamlError {
    /// Returns the SAML top-level status code for this error.
    #[must_use]
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::MalformedMessage(_)
            | Self::UnknownIssuer(_)
            | Self::DestinationMismatch { .. }
            | Self::RequestExpired(_)
            | Self::SignatureInvalid(_)
            | Self::UnsolicitedResponse(_)
            | Self::ReplayedResponse(_)
            | Self::InvalidBinding(_)
            | Self::AssertionExpired
            | Self::AssertionNotYetValid
            | Self::AudienceMismatch { .. }
            | Self::IssuerMismatch { .. }
            | Self::UnsupportedNameIdFormat(_) => status_codes::REQUESTER,
            Self::MalformedMetadata(_)
            | Self::ConfigurationError(_)
            | Self::StatusNotSuccess { .. }
            | Self::AuthenticationFailed(_)
            | Self::Crypto(_)
            | Self::Internal(_) => status_codes::RESPONDER,
        }
    }

    /// Returns a second-level status code if one applies.
    #[must_use]
    pub fn sub_status_code(&self) -> Option<&'static str> {
        match self {
            Self::AuthenticationFailed(_) => Some(sub_status_codes::AUTHN_FAILED),
            Self::UnknownIssuer(_) => Some(sub_status_codes::REQUEST_DENIED),
            Self::InvalidBinding(_) => Some(sub_status_codes::UNSUPPORTED_BINDING),
            Self::UnsupportedNameIdFormat(_) => Some(sub_status_codes::INVALID_NAMEID_POLICY),
            _ => None,
        }
    }

    /// Returns the HTTP status code the web layer should answer with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::MalformedMessage(_) | Self::InvalidBinding(_) | Self::RequestExpired(_) => 400,
            Self::SignatureInvalid(_)
            | Self::UnsolicitedResponse(_)
            | Self::ReplayedResponse(_)
            | Self::AssertionExpired
            | Self::AssertionNotYetValid
            | Self::AudienceMismatch { .. }
            | Self::IssuerMismatch { .. }
            | Self::DestinationMismatch { .. }
            | Self::AuthenticationFailed(_)
            | Self::StatusNotSuccess { .. } => 401,
            Self::UnknownIssuer(_) => 403,
            Self::UnsupportedNameIdFormat(_) => 422,
            Self::MalformedMetadata(_)
            | Self::ConfigurationError(_)
            | Self::Crypto(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Returns true for failures that indicate tampering, forgery or replay.
    #[must_use]
    pub const fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::SignatureInvalid(_)
                | Self::ReplayedResponse(_)
                | Self::UnsolicitedResponse(_)
                | Self::DestinationMismatch { .. }
                | Self::AudienceMismatch { .. }
                | Self::IssuerMismatch { .. }
        )
    }
}

impl From<roxmltree::Error> for SamlError {
    fn from(err: roxmltree::Error) -> Self {
        Self::MalformedMessage(format!("XML is not well-formed: {err}"))
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Internal(format!("XML writer: {err}"))
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::MalformedMessage(format!("base64 decode error: {err}"))
    }
}

impl From<std::io::Error> for SamlError {
    fn from(err: std::io::Error) -> Self {
        Self::MalformedMessage(format!("deflate error: {err}"))
    }
}

impl From<saml_crypto::SignatureError> for SamlError {
    fn from(err: saml_crypto::SignatureError) -> Self {
        Self::Crypto(err.to_string())
    }
}
