//! Transport encodings for the browser profile.
//!
//! HTTP-Redirect carries DEFLATE + base64 in a query string with an optional
//! detached signature over the raw query segments. HTTP-POST carries plain
//! base64 in a form field.
//!
//! Decoders take the raw text as received (a query string or URL for
//! Redirect, a form body for POST) and refuse anything larger than the
//! configured limit before base64-decoding or inflating it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use saml_protocol::bindings::{HttpPostBinding, HttpRedirectBinding, SamlMessageType};
//!
//! let url = HttpRedirectBinding::encode(&xml, "https://idp.example.com/sso", Some("state"),
//!     SamlMessageType::Request, None)?;
//! let decoded = HttpRedirectBinding::decode(&url, 256 * 1024)?;
//! ```

mod post;
mod redirect;

pub use post::*;
pub use redirect::*;

use crate::error::{SamlError, SamlResult};

/// Longest RelayState accepted on either binding, in bytes.
pub const MAX_RELAY_STATE_LEN: usize = 80;

/// Which form or query field a message travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// AuthnRequest message.
    Request,
    /// Response message.
    Response,
}

impl SamlMessageType {
    /// `SAMLRequest` or `SAMLResponse`.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// A detached HTTP-Redirect signature and the octets it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    /// The `SigAlg` URI.
    pub sig_alg: String,
    /// The base64 signature value.
    pub signature: String,
    /// `SAMLRequest=..[&RelayState=..]&SigAlg=..` rebuilt from the raw segments.
    pub signed_query: String,
}

/// A message taken off the wire, not yet parsed.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    /// Message XML, inflated and base64-decoded.
    pub xml: String,
    pub message_type: SamlMessageType,
    pub relay_state: Option<String>,
    /// Query-string signature (Redirect binding only).
    pub detached_signature: Option<DetachedSignature>,
}

/// Rejects a RelayState longer than [`MAX_RELAY_STATE_LEN`].
///
/// # Errors
///
/// Returns `MalformedMessage` when the limit is exceeded.
pub fn check_relay_state(relay_state: Option<&str>) -> SamlResult<()> {
    match relay_state {
        Some(rs) if rs.len() > MAX_RELAY_STATE_LEN => Err(SamlError::MalformedMessage(format!(
            "RelayState is {} bytes, limit is {MAX_RELAY_STATE_LEN}",
            rs.len()
        ))),
        _ => Ok(()),
    }
}

/// Strips whitespace from a base64 value and bounds its length so that the
/// decoded form cannot exceed `max_decoded` bytes.
fn bounded_base64(value: &str, max_decoded: usize) -> SamlResult<String> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let max_encoded = max_decoded.div_ceil(3) * 4;
    if compact.len() > max_encoded {
        return Err(SamlError::MalformedMessage(format!(
            "encoded message is {} bytes, limit is {max_encoded}",
            compact.len()
        )));
    }
    if compact.is_empty() {
        return Err(SamlError::MalformedMessage("empty message".into()));
    }
    Ok(compact)
}

fn utf8(bytes: Vec<u8>) -> SamlResult<String> {
    String::from_utf8(bytes)
        .map_err(|e| SamlError::MalformedMessage(format!("message is not UTF-8: {e}")))
}
