//! XML Signature creation.
//!
//! Provides functionality for signing SAML documents using XML-DSig.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use saml_crypto::{Certificate, SigningKey};
use tracing::debug;

use super::c14n::canonicalize;
use super::{DigestAlgorithm, SignatureAlgorithm, SignatureConfig};
use crate::error::{SamlError, SamlResult};
use crate::types::{canonicalization_algorithms, SAML_NS, XMLDSIG_NS};
use crate::xml::{child_element, find_by_id, parse_document};

const KEY_PROBE: &[u8] = b"saml-signing-credential-probe";

/// A private key together with the certificate that publishes it.
pub struct SigningCredential {
    key: SigningKey,
    certificate: Certificate,
}

impl SigningCredential {
    /// Pairs `key` with `certificate`, proving they belong together.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the certificate does not carry the
    /// public half of `key`.
    pub fn new(key: SigningKey, certificate: Certificate) -> SamlResult<Self> {
        let scheme = key.default_scheme();
        let probe = key.sign(scheme, KEY_PROBE)?;
        if !certificate.verify(scheme, KEY_PROBE, &probe) {
            return Err(SamlError::ConfigurationError(format!(
                "private key does not match certificate {}",
                certificate.subject()
            )));
        }
        Ok(Self { key, certificate })
    }

    /// Loads a credential from PEM-encoded key and certificate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if either block is unusable.
    pub fn from_pem(private_key_pem: &str, certificate_pem: &str) -> SamlResult<Self> {
        let key = SigningKey::from_pem(private_key_pem)
            .map_err(|e| SamlError::ConfigurationError(format!("signing key: {e}")))?;
        let certificate = Certificate::from_pem(certificate_pem)
            .map_err(|e| SamlError::ConfigurationError(format!("certificate: {e}")))?;
        Self::new(key, certificate)
    }

    /// Returns the signing key.
    #[must_use]
    pub fn key(&self) -> &SigningKey {
        &self.key
    }

    /// Returns the certificate published in metadata.
    #[must_use]
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredential")
            .field("key_type", &self.key.key_type())
            .field("certificate", &self.certificate.subject())
            .finish_non_exhaustive()
    }
}

/// XML document signer.
///
/// Signs SAML documents using the configured credential.
#[derive(Debug)]
pub struct XmlSigner {
    credential: SigningCredential,
    config: SignatureConfig,
}

impl XmlSigner {
    /// Creates a signer, checking that the key can produce `config.algorithm`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the algorithm does not fit the key.
    pub fn new(credential: SigningCredential, config: SignatureConfig) -> SamlResult<Self> {
        if !credential.key.supports(config.algorithm.scheme()) {
            return Err(SamlError::ConfigurationError(format!(
                "signature algorithm {} does not fit a {:?} key",
                config.algorithm.uri(),
                credential.key.key_type()
            )));
        }
        Ok(Self { credential, config })
    }

    /// Returns the credential used for signing.
    #[must_use]
    pub fn credential(&self) -> &SigningCredential {
        &self.credential
    }

    /// Returns the signature algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.config.algorithm
    }

    /// Signs the element of `xml` whose `ID` is `reference_id`.
    ///
    /// The `<ds:Signature>` is inserted right after the element's `Issuer`,
    /// as the SAML schema requires.
    ///
    /// # Errors
    ///
    /// Fails if the element cannot be found or the key refuses to sign.
    pub fn sign(&self, xml: &str, reference_id: &str) -> SamlResult<String> {
        let certificate = self
            .config
            .include_certificate
            .then_some(&self.credential.certificate);
        sign_with(
            xml,
            reference_id,
            &self.credential.key,
            certificate,
            &self.config,
        )
    }

    /// Signs an HTTP-Redirect query (`SAMLRequest=..[&RelayState=..]&SigAlg=..`).
    ///
    /// Returns the base64 signature value.
    ///
    /// # Errors
    ///
    /// Fails if the key refuses to sign.
    pub fn sign_redirect_query(&self, signed_query: &str) -> SamlResult<String> {
        let value = self
            .credential
            .key
            .sign(self.config.algorithm.scheme(), signed_query.as_bytes())?;
        Ok(STANDARD.encode(value))
    }
}

/// Signs the element of `xml` whose `ID` is `reference_id` with `key`.
///
/// # Errors
///
/// Fails if the element cannot be found, the ID is not a plain NCName, or
/// the key cannot produce `algorithm`.
pub fn sign(
    xml: &str,
    reference_id: &str,
    key: &SigningKey,
    certificate: Option<&Certificate>,
    digest: DigestAlgorithm,
    algorithm: SignatureAlgorithm,
) -> SamlResult<String> {
    let config = SignatureConfig {
        digest,
        ..SignatureConfig::with_algorithm(algorithm)
    };
    sign_with(xml, reference_id, key, certificate, &config)
}

fn sign_with(
    xml: &str,
    reference_id: &str,
    key: &SigningKey,
    certificate: Option<&Certificate>,
    config: &SignatureConfig,
) -> SamlResult<String> {
    if !is_plain_id(reference_id) {
        return Err(SamlError::MalformedMessage(format!(
            "cannot reference ID {reference_id:?}"
        )));
    }

    let doc = parse_document(xml)?;
    let target = find_by_id(&doc, reference_id).ok_or_else(|| {
        SamlError::Internal(format!("element with ID {reference_id:?} not found"))
    })?;

    let canonical = canonicalize(target, None, config.canonicalization)?;
    let digest_value = STANDARD.encode(config.digest.digest(canonical.as_bytes()));

    let signed_info = build_signed_info(reference_id, &digest_value, config);
    let canonical_signed_info = canonicalize_signed_info(&signed_info, config)?;
    let signature_value = key.sign(config.algorithm.scheme(), canonical_signed_info.as_bytes())?;

    let element = build_signature_element(
        &signed_info,
        &STANDARD.encode(signature_value),
        certificate,
    );

    let position = match child_element(target, SAML_NS, "Issuer") {
        Some(issuer) => issuer.range().end,
        None => target
            .first_child()
            .map(|c| c.range().start)
            .ok_or_else(|| SamlError::Internal("cannot sign an empty element".into()))?,
    };

    debug!(
        reference_id,
        algorithm = config.algorithm.uri(),
        "signed element"
    );

    let mut signed = String::with_capacity(xml.len() + element.len());
    signed.push_str(&xml[..position]);
    signed.push_str(&element);
    signed.push_str(&xml[position..]);
    Ok(signed)
}

/// IDs we emit are NCNames; anything else would need escaping.
fn is_plain_id(id: &str) -> bool {
    id.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn build_signed_info(reference_id: &str, digest_value: &str, config: &SignatureConfig) -> String {
    format!(
        concat!(
            "<ds:SignedInfo>",
            "<ds:CanonicalizationMethod Algorithm=\"{c14n}\"/>",
            "<ds:SignatureMethod Algorithm=\"{sig}\"/>",
            "<ds:Reference URI=\"#{id}\">",
            "<ds:Transforms>",
            "<ds:Transform Algorithm=\"{enveloped}\"/>",
            "<ds:Transform Algorithm=\"{c14n}\"/>",
            "</ds:Transforms>",
            "<ds:DigestMethod Algorithm=\"{digest}\"/>",
            "<ds:DigestValue>{value}</ds:DigestValue>",
            "</ds:Reference>",
            "</ds:SignedInfo>"
        ),
        c14n = config.canonicalization.uri(),
        sig = config.algorithm.uri(),
        id = reference_id,
        enveloped = canonicalization_algorithms::ENVELOPED_SIGNATURE,
        digest = config.digest.uri(),
        value = digest_value,
    )
}

/// Canonicalizes `SignedInfo` as it will appear inside the final signature.
fn canonicalize_signed_info(signed_info: &str, config: &SignatureConfig) -> SamlResult<String> {
    let wrapped = format!("<ds:Signature xmlns:ds=\"{XMLDSIG_NS}\">{signed_info}</ds:Signature>");
    let doc = parse_document(&wrapped)?;
    let node = child_element(doc.root_element(), XMLDSIG_NS, "SignedInfo")
        .ok_or_else(|| SamlError::Internal("SignedInfo vanished".into()))?;
    canonicalize(node, None, config.canonicalization)
}

fn build_signature_element(
    signed_info: &str,
    signature_value: &str,
    certificate: Option<&Certificate>,
) -> String {
    let mut element = format!("<ds:Signature xmlns:ds=\"{XMLDSIG_NS}\">{signed_info}");
    element.push_str("<ds:SignatureValue>");
    element.push_str(signature_value);
    element.push_str("</ds:SignatureValue>");
    if let Some(cert) = certificate {
        element.push_str("<ds:KeyInfo><ds:X509Data><ds:X509Certificate>");
        element.push_str(&cert.to_base64());
        element.push_str("</ds:X509Certificate></ds:X509Data></ds:KeyInfo>");
    }
    element.push_str("</ds:Signature>");
    element
}
