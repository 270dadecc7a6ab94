//! Protocol message codec.
//!
//! Converts [`AuthnRequest`] and [`Response`] values to and from XML, and
//! moves that XML over the two browser bindings through [`MessageCodec`].

mod request;
mod response;

#[cfg(test)]
mod proptest_request;

pub use request::{parse_authn_request, serialize_authn_request};
pub use response::{parse_response, serialize_assertion, serialize_response};

pub(crate) use response::response_from_node;

use chrono::{DateTime, Utc};
use roxmltree::Node;
use tracing::debug;

use crate::bindings::{
    DecodedMessage, HttpPostBinding, HttpRedirectBinding, PostForm, SamlMessageType,
};
use crate::config::CodecConfig;
use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::{AuthnRequest, Response, SamlBinding, SAML_NS};
use crate::xml::{child_element, element_text, parse_instant};

/// A message ready for the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedMessage {
    /// Send the browser to this URL.
    Redirect {
        /// Destination with the message in its query string.
        url: String,
    },
    /// Serve this auto-submitting form.
    Post(PostForm),
}

impl EncodedMessage {
    /// Returns the binding this message travels over.
    #[must_use]
    pub const fn binding(&self) -> SamlBinding {
        match self {
            Self::Redirect { .. } => SamlBinding::HttpRedirect,
            Self::Post(_) => SamlBinding::HttpPost,
        }
    }

    /// Returns what the receiving endpoint will see: the full URL for
    /// Redirect, the form body for POST.
    #[must_use]
    pub fn to_raw(&self) -> String {
        match self {
            Self::Redirect { url } => url.clone(),
            Self::Post(form) => form.to_form_body(),
        }
    }
}

/// Encodes and decodes protocol messages on the browser bindings.
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    max_message_size: usize,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(&CodecConfig::default())
    }
}

impl MessageCodec {
    /// Creates a codec enforcing `config.max_message_size`.
    #[must_use]
    pub const fn new(config: &CodecConfig) -> Self {
        Self {
            max_message_size: config.max_message_size,
        }
    }

    /// Returns the largest decoded message accepted, in bytes.
    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Encodes `request` for `binding`, addressed to its `Destination`.
    ///
    /// With a `signer`, Redirect messages get a detached query signature and
    /// POST messages an enveloped XML signature.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBinding` for bindings other than POST and Redirect,
    /// `MalformedMessage` when the request has no destination.
    pub fn encode_request(
        &self,
        request: &AuthnRequest,
        binding: SamlBinding,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<EncodedMessage> {
        let destination = request.destination.as_deref().ok_or_else(|| {
            SamlError::MalformedMessage("AuthnRequest has no Destination".into())
        })?;
        let xml = serialize_authn_request(request)?;
        debug!(request_id = %request.id, %binding, signed = signer.is_some(), "encoding AuthnRequest");

        match binding {
            SamlBinding::HttpRedirect => Ok(EncodedMessage::Redirect {
                url: HttpRedirectBinding::encode(
                    &xml,
                    destination,
                    relay_state,
                    SamlMessageType::Request,
                    signer,
                )?,
            }),
            SamlBinding::HttpPost => {
                let xml = match signer {
                    Some(signer) => signer.sign(&xml, &request.id)?,
                    None => xml,
                };
                HttpPostBinding::encode(&xml, destination, relay_state, SamlMessageType::Request)
                    .map(EncodedMessage::Post)
            }
            other => Err(unsupported(other)),
        }
    }

    /// Encodes an already signed Response document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBinding` for anything but HTTP-POST: a Response
    /// carrying enveloped signatures does not survive the Redirect binding's
    /// size constraints.
    pub fn encode_response(
        &self,
        xml: &str,
        destination: &str,
        binding: SamlBinding,
        relay_state: Option<&str>,
    ) -> SamlResult<EncodedMessage> {
        match binding {
            SamlBinding::HttpPost => {
                HttpPostBinding::encode(xml, destination, relay_state, SamlMessageType::Response)
                    .map(EncodedMessage::Post)
            }
            other => Err(SamlError::InvalidBinding(format!(
                "responses are only sent with HTTP-POST, not {other}"
            ))),
        }
    }

    /// Decodes the transport encoding of `raw` received on `binding`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBinding` for bindings other than POST and Redirect and
    /// `MalformedMessage` when the payload cannot be decoded.
    pub fn decode(&self, raw: &str, binding: SamlBinding) -> SamlResult<DecodedMessage> {
        match binding {
            SamlBinding::HttpRedirect => HttpRedirectBinding::decode(raw, self.max_message_size),
            SamlBinding::HttpPost => HttpPostBinding::decode(raw, self.max_message_size),
            other => Err(unsupported(other)),
        }
    }

    /// Decodes and parses an AuthnRequest.
    ///
    /// # Errors
    ///
    /// As [`MessageCodec::decode`], plus `MalformedMessage` if the payload
    /// is a response or not a valid AuthnRequest.
    pub fn decode_authn_request(
        &self,
        raw: &str,
        binding: SamlBinding,
    ) -> SamlResult<(AuthnRequest, DecodedMessage)> {
        let decoded = self.decode(raw, binding)?;
        expect_type(&decoded, SamlMessageType::Request)?;
        let request = parse_authn_request(&decoded.xml)?;
        Ok((request, decoded))
    }

    /// Decodes and parses a Response without checking signatures.
    ///
    /// # Errors
    ///
    /// As [`MessageCodec::decode`], plus `MalformedMessage` if the payload
    /// is a request or not a valid Response.
    pub fn decode_response(
        &self,
        raw: &str,
        binding: SamlBinding,
    ) -> SamlResult<(Response, DecodedMessage)> {
        let decoded = self.decode(raw, binding)?;
        expect_type(&decoded, SamlMessageType::Response)?;
        let response = parse_response(&decoded.xml)?;
        Ok((response, decoded))
    }
}

pub(crate) fn expect_type(decoded: &DecodedMessage, expected: SamlMessageType) -> SamlResult<()> {
    if decoded.message_type == expected {
        Ok(())
    } else {
        Err(SamlError::MalformedMessage(format!(
            "expected {} parameter",
            expected.form_param()
        )))
    }
}

fn unsupported(binding: SamlBinding) -> SamlError {
    SamlError::InvalidBinding(format!("{binding} is not supported"))
}

pub(crate) fn required_attr<'a>(node: Node<'a, '_>, name: &str) -> SamlResult<&'a str> {
    node.attribute(name).ok_or_else(|| {
        SamlError::MalformedMessage(format!(
            "{} has no {name} attribute",
            node.tag_name().name()
        ))
    })
}

pub(crate) fn optional_instant(node: Node<'_, '_>, name: &str) -> SamlResult<Option<DateTime<Utc>>> {
    node.attribute(name)
        .map(|v| parse_instant(v).map_err(SamlError::MalformedMessage))
        .transpose()
}

pub(crate) fn required_instant(node: Node<'_, '_>, name: &str) -> SamlResult<DateTime<Utc>> {
    parse_instant(required_attr(node, name)?).map_err(SamlError::MalformedMessage)
}

pub(crate) fn optional_bool(node: Node<'_, '_>, name: &str) -> SamlResult<Option<bool>> {
    match node.attribute(name) {
        None => Ok(None),
        Some("true" | "1") => Ok(Some(true)),
        Some("false" | "0") => Ok(Some(false)),
        Some(other) => Err(SamlError::MalformedMessage(format!(
            "{name} must be a boolean, got {other:?}"
        ))),
    }
}

/// Returns the trimmed text of the `saml:{local}` child, if present.
pub(crate) fn saml_child_text(node: Node<'_, '_>, local: &str) -> Option<String> {
    child_element(node, SAML_NS, local).map(element_text)
}
