//! XML Signature validation.
//!
//! Verification fails closed: a missing `Signature`, an unknown algorithm,
//! an unexpected transform, a reference to anything but the enclosing
//! element, a digest mismatch or a bad signature value all yield
//! `SignatureInvalid`. Only the caller-supplied certificate is trusted;
//! `KeyInfo` content is reported but never used.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use roxmltree::Node;
use saml_crypto::{constant_time_eq, Certificate};
use tracing::debug;

use super::c14n::canonicalize;
use super::{CanonicalizationAlgorithm, DigestAlgorithm, SignatureAlgorithm, XmlSignature};
use crate::error::{SamlError, SamlResult};
use crate::types::{canonicalization_algorithms, XMLDSIG_NS};
use crate::xml::{child_element, child_elements, element_text, find_by_id, parse_document};

/// XML signature validator bound to one trusted certificate.
#[derive(Debug, Clone, Copy)]
pub struct XmlSignatureValidator<'a> {
    certificate: &'a Certificate,
}

impl<'a> XmlSignatureValidator<'a> {
    /// Creates a validator trusting only `certificate`.
    #[must_use]
    pub const fn new(certificate: &'a Certificate) -> Self {
        Self { certificate }
    }

    /// Returns the direct-child `<ds:Signature>` of `element`, if any.
    ///
    /// # Errors
    ///
    /// Returns `SignatureInvalid` if more than one is present.
    pub fn signature_of<'n, 'input>(
        element: Node<'n, 'input>,
    ) -> SamlResult<Option<Node<'n, 'input>>> {
        let mut signatures = child_elements(element, XMLDSIG_NS, "Signature");
        let first = signatures.next();
        if signatures.next().is_some() {
            return Err(SamlError::SignatureInvalid(
                "more than one Signature on one element".into(),
            ));
        }
        Ok(first)
    }

    /// Verifies `element`'s signature if it has one.
    ///
    /// Returns whether a signature was present.
    ///
    /// # Errors
    ///
    /// Returns `SignatureInvalid` if a present signature does not verify.
    pub fn verify_if_signed(&self, element: Node<'_, '_>) -> SamlResult<bool> {
        if Self::signature_of(element)?.is_none() {
            return Ok(false);
        }
        self.verify_element(element).map(|_| true)
    }

    /// Verifies the enveloped signature carried directly by `element`.
    ///
    /// # Errors
    ///
    /// Returns `SignatureInvalid` on any defect.
    pub fn verify_element(&self, element: Node<'_, '_>) -> SamlResult<XmlSignature> {
        let signature = Self::signature_of(element)?
            .ok_or_else(|| invalid("element is not signed"))?;
        let id = element
            .attribute("ID")
            .ok_or_else(|| invalid("signed element has no ID"))?;

        let signed_info = ds_child(signature, "SignedInfo")?;
        let canonicalization = algorithm_of(ds_child(signed_info, "CanonicalizationMethod")?)
            .and_then(|uri| {
                CanonicalizationAlgorithm::from_uri(uri)
                    .ok_or_else(|| invalid(&format!("unsupported canonicalization {uri}")))
            })?;
        let algorithm = algorithm_of(ds_child(signed_info, "SignatureMethod")?).and_then(|uri| {
            SignatureAlgorithm::from_uri(uri)
                .ok_or_else(|| invalid(&format!("unsupported signature method {uri}")))
        })?;

        let mut references = child_elements(signed_info, XMLDSIG_NS, "Reference");
        let reference = references
            .next()
            .ok_or_else(|| invalid("SignedInfo has no Reference"))?;
        if references.next().is_some() {
            return Err(invalid("SignedInfo must carry exactly one Reference"));
        }
        let expected_uri = format!("#{id}");
        if reference.attribute("URI") != Some(expected_uri.as_str()) {
            return Err(invalid("Reference does not point at the signed element"));
        }

        let transform_c14n = reference_transforms(reference)?;
        let digest = algorithm_of(ds_child(reference, "DigestMethod")?).and_then(|uri| {
            DigestAlgorithm::from_uri(uri)
                .ok_or_else(|| invalid(&format!("unsupported digest method {uri}")))
        })?;
        let expected_digest = decode_b64(&element_text(ds_child(reference, "DigestValue")?))?;

        let canonical = canonicalize(element, Some(signature.id()), transform_c14n)?;
        let actual_digest = digest.digest(canonical.as_bytes());
        if !constant_time_eq(&actual_digest, &expected_digest) {
            return Err(invalid("digest mismatch"));
        }

        let signature_value =
            decode_b64(&element_text(ds_child(signature, "SignatureValue")?))?;
        let canonical_signed_info = canonicalize(signed_info, None, canonicalization)?;
        if !self.certificate.verify(
            algorithm.scheme(),
            canonical_signed_info.as_bytes(),
            &signature_value,
        ) {
            return Err(invalid("signature value does not verify"));
        }

        debug!(reference_id = id, algorithm = algorithm.uri(), "signature verified");

        let embedded_certificate = child_element(signature, XMLDSIG_NS, "KeyInfo")
            .and_then(|k| child_element(k, XMLDSIG_NS, "X509Data"))
            .and_then(|d| child_element(d, XMLDSIG_NS, "X509Certificate"))
            .map(element_text);

        Ok(XmlSignature {
            algorithm,
            digest,
            canonicalization,
            reference_id: id.to_string(),
            embedded_certificate,
        })
    }

    /// Verifies a detached HTTP-Redirect signature.
    ///
    /// `signed_query` is the octet string that was signed, built from the raw
    /// (still URL-encoded) query parameters.
    ///
    /// # Errors
    ///
    /// Returns `SignatureInvalid` for an unknown `SigAlg`, undecodable value
    /// or a signature that does not verify.
    pub fn verify_redirect(
        &self,
        signed_query: &str,
        signature_b64: &str,
        sig_alg: &str,
    ) -> SamlResult<SignatureAlgorithm> {
        let algorithm = SignatureAlgorithm::from_uri(sig_alg)
            .ok_or_else(|| invalid(&format!("unsupported SigAlg {sig_alg}")))?;
        let value = decode_b64(signature_b64)?;
        if !self
            .certificate
            .verify(algorithm.scheme(), signed_query.as_bytes(), &value)
        {
            return Err(invalid("redirect signature does not verify"));
        }
        Ok(algorithm)
    }
}

/// Verifies the signature on the element of `xml` whose `ID` is `reference_id`.
///
/// Returns `false` on any failure, including a missing signature.
#[must_use]
pub fn verify(xml: &str, reference_id: &str, certificate: &Certificate) -> bool {
    let Ok(doc) = parse_document(xml) else {
        return false;
    };
    find_by_id(&doc, reference_id).is_some_and(|element| {
        XmlSignatureValidator::new(certificate)
            .verify_element(element)
            .is_ok()
    })
}

/// Checks the transform chain and returns the canonicalization it ends with.
fn reference_transforms(reference: Node<'_, '_>) -> SamlResult<CanonicalizationAlgorithm> {
    let transforms = ds_child(reference, "Transforms")?;
    let mut enveloped = false;
    let mut c14n = None;
    for transform in child_elements(transforms, XMLDSIG_NS, "Transform") {
        let uri = algorithm_of(transform)?;
        if uri == canonicalization_algorithms::ENVELOPED_SIGNATURE {
            enveloped = true;
        } else if let Some(alg) = CanonicalizationAlgorithm::from_uri(uri) {
            c14n = Some(alg);
        } else {
            return Err(invalid(&format!("unsupported transform {uri}")));
        }
    }
    if !enveloped {
        return Err(invalid("enveloped-signature transform missing"));
    }
    c14n.ok_or_else(|| invalid("exclusive canonicalization transform missing"))
}

fn ds_child<'a, 'input>(node: Node<'a, 'input>, local: &'a str) -> SamlResult<Node<'a, 'input>> {
    child_element(node, XMLDSIG_NS, local).ok_or_else(|| invalid(&format!("{local} missing")))
}

fn algorithm_of<'a>(node: Node<'a, '_>) -> SamlResult<&'a str> {
    node.attribute("Algorithm")
        .ok_or_else(|| invalid(&format!("{} has no Algorithm", node.tag_name().name())))
}

fn decode_b64(value: &str) -> SamlResult<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| invalid(&format!("base64: {e}")))
}

fn invalid(reason: &str) -> SamlError {
    SamlError::SignatureInvalid(reason.to_string())
}
