//! HTTP-Redirect Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-Redirect binding for sending SAML messages
//! via URL query parameters with DEFLATE compression.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;

use super::{bounded_base64, check_relay_state, utf8, DecodedMessage, DetachedSignature, SamlMessageType};

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Encodes a SAML message for HTTP-Redirect binding.
    ///
    /// Returns `destination` with the message in its query string. With a
    /// `signer`, `SigAlg` and a detached `Signature` are appended.
    ///
    /// # Errors
    ///
    /// Fails on an over-long RelayState or if signing fails.
    pub fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<String> {
        check_relay_state(relay_state)?;

        let compressed = deflate_compress(xml.as_bytes())?;
        let encoded = STANDARD.encode(compressed);

        let mut query = format!(
            "{}={}",
            message_type.form_param(),
            urlencoding::encode(&encoded)
        );
        if let Some(rs) = relay_state {
            query.push_str("&RelayState=");
            query.push_str(&urlencoding::encode(rs));
        }
        if let Some(signer) = signer {
            query.push_str("&SigAlg=");
            query.push_str(&urlencoding::encode(signer.algorithm().uri()));
            let signature = signer.sign_redirect_query(&query)?;
            query.push_str("&Signature=");
            query.push_str(&urlencoding::encode(&signature));
        }

        let separator = if destination.contains('?') { '&' } else { '?' };
        Ok(format!("{destination}{separator}{query}"))
    }

    /// Decodes a message from a full URL or a bare query string.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` for missing, duplicated or oversized
    /// parameters and for payloads that do not inflate to UTF-8 within
    /// `max_message_size` bytes.
    pub fn decode(raw: &str, max_message_size: usize) -> SamlResult<DecodedMessage> {
        let query = query_of(raw)?;
        let params = RawParams::parse(query)?;

        let (message_type, raw_message) = match (params.saml_request, params.saml_response) {
            (Some(m), None) => (SamlMessageType::Request, m),
            (None, Some(m)) => (SamlMessageType::Response, m),
            (Some(_), Some(_)) => {
                return Err(SamlError::MalformedMessage(
                    "both SAMLRequest and SAMLResponse present".into(),
                ))
            }
            (None, None) => {
                return Err(SamlError::MalformedMessage(
                    "no SAMLRequest or SAMLResponse parameter".into(),
                ))
            }
        };

        let relay_state = params.relay_state.map(percent_decode).transpose()?;
        check_relay_state(relay_state.as_deref())?;

        let detached_signature = match (params.sig_alg, params.signature) {
            (Some(sig_alg), Some(signature)) => {
                let mut signed_query = format!("{}={raw_message}", message_type.form_param());
                if let Some(rs) = params.relay_state {
                    signed_query.push_str("&RelayState=");
                    signed_query.push_str(rs);
                }
                signed_query.push_str("&SigAlg=");
                signed_query.push_str(sig_alg);
                Some(DetachedSignature {
                    sig_alg: percent_decode(sig_alg)?,
                    signature: percent_decode(signature)?,
                    signed_query,
                })
            }
            (None, None) => None,
            _ => {
                return Err(SamlError::MalformedMessage(
                    "SigAlg and Signature must appear together".into(),
                ))
            }
        };

        // The compressed form is bounded by the same limit as the inflated one.
        let encoded = bounded_base64(&percent_decode(raw_message)?, max_message_size)?;
        let compressed = STANDARD.decode(encoded)?;
        let xml = utf8(deflate_decompress(&compressed, max_message_size)?)?;

        Ok(DecodedMessage {
            xml,
            message_type,
            relay_state,
            detached_signature,
        })
    }
}

/// The raw, still percent-encoded SAML parameters of a query string.
#[derive(Default)]
struct RawParams<'a> {
    saml_request: Option<&'a str>,
    saml_response: Option<&'a str>,
    relay_state: Option<&'a str>,
    sig_alg: Option<&'a str>,
    signature: Option<&'a str>,
}

impl<'a> RawParams<'a> {
    fn parse(query: &'a str) -> SamlResult<Self> {
        let mut params = Self::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let slot = match key {
                "SAMLRequest" => &mut params.saml_request,
                "SAMLResponse" => &mut params.saml_response,
                "RelayState" => &mut params.relay_state,
                "SigAlg" => &mut params.sig_alg,
                "Signature" => &mut params.signature,
                _ => continue,
            };
            if slot.replace(value).is_some() {
                return Err(SamlError::MalformedMessage(format!(
                    "parameter {key} appears more than once"
                )));
            }
        }
        Ok(params)
    }
}

fn query_of(raw: &str) -> SamlResult<&str> {
    let raw = raw.trim();
    let is_url = raw.contains("://");
    if is_url {
        url::Url::parse(raw).map_err(|e| SamlError::MalformedMessage(format!("URL: {e}")))?;
    }
    let query = match raw.split_once('?') {
        Some((_, query)) => query,
        None if is_url => {
            return Err(SamlError::MalformedMessage("URL has no query string".into()))
        }
        None => raw,
    };
    Ok(query.split('#').next().unwrap_or(query))
}

fn percent_decode(value: &str) -> SamlResult<String> {
    urlencoding::decode(value)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| SamlError::MalformedMessage(format!("URL decoding: {e}")))
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Internal(format!("compression: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Internal(format!("compression: {e}")))
}

/// Inflates DEFLATE data, refusing output beyond `limit` bytes.
fn deflate_decompress(data: &[u8], limit: usize) -> SamlResult<Vec<u8>> {
    let mut decompressed = Vec::new();
    DeflateDecoder::new(data)
        .take(u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1))
        .read_to_end(&mut decompressed)?;
    if decompressed.len() > limit {
        return Err(SamlError::MalformedMessage(format!(
            "inflated message exceeds {limit} bytes"
        )));
    }
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{SignatureConfig, SigningCredential, XmlSignatureValidator};

    const LIMIT: usize = 64 * 1024;

    #[test]
    fn encode_and_decode_request() {
        let xml = r#"<samlp:AuthnRequest>test content here</samlp:AuthnRequest>"#;
        let url = HttpRedirectBinding::encode(
            xml,
            "https://idp.example.com/sso",
            Some("state 123"),
            SamlMessageType::Request,
            None,
        )
        .unwrap();

        assert!(url.starts_with("https://idp.example.com/sso?SAMLRequest="));
        assert!(url.contains("&RelayState=state%20123"));

        let decoded = HttpRedirectBinding::decode(&url, LIMIT).unwrap();
        assert_eq!(decoded.xml, xml);
        assert_eq!(decoded.message_type, SamlMessageType::Request);
        assert_eq!(decoded.relay_state.as_deref(), Some("state 123"));
        assert!(decoded.detached_signature.is_none());
    }

    #[test]
    fn decodes_bare_query_strings() {
        let url = HttpRedirectBinding::encode(
            "<Test/>",
            "https://sp.example.com/acs",
            None,
            SamlMessageType::Response,
            None,
        )
        .unwrap();
        let query = &url[url.find('?').unwrap()..];

        let decoded = HttpRedirectBinding::decode(query, LIMIT).unwrap();
        assert_eq!(decoded.xml, "<Test/>");
        assert_eq!(decoded.message_type, SamlMessageType::Response);
    }

    #[test]
    fn deflate_roundtrip() {
        let original = b"Test data for compression";
        let compressed = deflate_compress(original).unwrap();
        let decompressed = deflate_decompress(&compressed, LIMIT).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn decompression_bomb_is_cut_off() {
        let bomb = deflate_compress(&vec![b'a'; 1024 * 1024]).unwrap();
        assert!(bomb.len() < 4096);
        assert!(matches!(
            deflate_decompress(&bomb, LIMIT),
            Err(SamlError::MalformedMessage(_))
        ));

        let query = format!(
            "SAMLRequest={}",
            urlencoding::encode(&STANDARD.encode(&bomb))
        );
        assert!(matches!(
            HttpRedirectBinding::decode(&query, LIMIT),
            Err(SamlError::MalformedMessage(_))
        ));
    }

    #[test]
    fn oversized_payload_is_refused_before_inflating() {
        let query = format!("SAMLRequest={}", "A".repeat(LIMIT * 2));
        assert!(matches!(
            HttpRedirectBinding::decode(&query, LIMIT),
            Err(SamlError::MalformedMessage(m)) if m.contains("limit")
        ));
    }

    #[test]
    fn duplicate_and_missing_parameters_are_rejected() {
        assert!(HttpRedirectBinding::decode("RelayState=x", LIMIT).is_err());
        assert!(HttpRedirectBinding::decode("SAMLRequest=a&SAMLRequest=b", LIMIT).is_err());
        assert!(HttpRedirectBinding::decode("SAMLRequest=a&SigAlg=b", LIMIT).is_err());
        assert!(HttpRedirectBinding::decode("SAMLRequest=%%%", LIMIT).is_err());
    }

    #[test]
    fn long_relay_state_is_rejected() {
        let rs = "r".repeat(81);
        assert!(HttpRedirectBinding::encode(
            "<a/>",
            "https://idp.example.com/sso",
            Some(&rs),
            SamlMessageType::Request,
            None
        )
        .is_err());
    }

    #[test]
    fn url_with_existing_query() {
        let url = HttpRedirectBinding::encode(
            "<Test/>",
            "https://idp.example.com/sso?existing=param",
            None,
            SamlMessageType::Request,
            None,
        )
        .unwrap();

        assert!(url.contains("?existing=param&SAMLRequest="));
        assert_eq!(HttpRedirectBinding::decode(&url, LIMIT).unwrap().xml, "<Test/>");
    }

    #[test]
    fn signed_query_is_rebuilt_from_raw_segments() {
        let credential = SigningCredential::from_pem(
            include_str!("../../../../fixtures/pki/sp.key"),
            include_str!("../../../../fixtures/pki/sp.crt"),
        )
        .unwrap();
        let cert = credential.certificate().clone();
        let signer = XmlSigner::new(credential, SignatureConfig::default()).unwrap();

        let url = HttpRedirectBinding::encode(
            "<samlp:AuthnRequest/>",
            "https://idp.example.com/sso",
            Some("a/b+c"),
            SamlMessageType::Request,
            Some(&signer),
        )
        .unwrap();

        let decoded = HttpRedirectBinding::decode(&url, LIMIT).unwrap();
        let detached = decoded.detached_signature.unwrap();
        assert!(detached.signed_query.starts_with("SAMLRequest="));
        assert!(detached.signed_query.contains("&RelayState=a%2Fb%2Bc&SigAlg="));
        assert!(!detached.signed_query.contains("Signature="));

        let validator = XmlSignatureValidator::new(&cert);
        validator
            .verify_redirect(&detached.signed_query, &detached.signature, &detached.sig_alg)
            .unwrap();

        let tampered = detached.signed_query.replace("a%2Fb", "a%2Fc");
        assert!(validator
            .verify_redirect(&tampered, &detached.signature, &detached.sig_alg)
            .is_err());
    }
}
