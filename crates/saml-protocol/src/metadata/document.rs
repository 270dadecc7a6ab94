//! `md:EntityDescriptor` documents.

use roxmltree::{Document, Node};
use saml_crypto::Certificate;
use tracing::debug;

use super::{Endpoint, EntityDescriptor, EntityRole, ServiceType};
use crate::error::{SamlError, SamlResult};
use crate::types::{SamlBinding, MD_NS, SAMLP_NS, XMLDSIG_NS};
use crate::xml::{child_element, child_elements, element_text, is_element, XmlWriter};

/// Parses a metadata document holding exactly one entity.
///
/// # Errors
///
/// Returns `MalformedMetadata` if the document is not UTF-8 XML, holds
/// anything but a single `md:EntityDescriptor`, or that descriptor lacks a
/// signing certificate or an endpoint of its role.
pub fn parse_metadata(bytes: &[u8]) -> SamlResult<EntityDescriptor> {
    let mut entities = parse_entities(bytes)?;
    match entities.len() {
        1 => Ok(entities.remove(0)),
        n => Err(SamlError::MalformedMetadata(format!(
            "expected one EntityDescriptor, found {n}"
        ))),
    }
}

/// Parses an `md:EntityDescriptor` or an `md:EntitiesDescriptor` document.
///
/// # Errors
///
/// Returns `MalformedMetadata` on the first invalid descriptor.
pub fn parse_entities(bytes: &[u8]) -> SamlResult<Vec<EntityDescriptor>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| SamlError::MalformedMetadata(format!("metadata is not UTF-8: {e}")))?;
    let doc = Document::parse(text)
        .map_err(|e| SamlError::MalformedMetadata(format!("XML is not well-formed: {e}")))?;
    let root = doc.root_element();

    if is_element(root, MD_NS, "EntityDescriptor") {
        return Ok(vec![entity_from_node(root)?]);
    }
    if !is_element(root, MD_NS, "EntitiesDescriptor") {
        return Err(SamlError::MalformedMetadata(format!(
            "unexpected root element {}",
            root.tag_name().name()
        )));
    }
    root.descendants()
        .filter(|n| is_element(*n, MD_NS, "EntityDescriptor"))
        .map(entity_from_node)
        .collect()
}

fn entity_from_node(node: Node<'_, '_>) -> SamlResult<EntityDescriptor> {
    let entity_id = node
        .attribute("entityID")
        .ok_or_else(|| SamlError::MalformedMetadata("EntityDescriptor has no entityID".into()))?;

    let idp = role_descriptor(node, "IDPSSODescriptor");
    let sp = role_descriptor(node, "SPSSODescriptor");
    let (role, sso) = match (idp, sp) {
        (Some(d), None) => (EntityRole::Idp, d),
        (None, Some(d)) => (EntityRole::Sp, d),
        (Some(_), Some(_)) => {
            return Err(SamlError::MalformedMetadata(format!(
                "{entity_id} declares both IdP and SP roles"
            )))
        }
        (None, None) => {
            return Err(SamlError::MalformedMetadata(format!(
                "{entity_id} has no SAML 2.0 IdP or SP descriptor"
            )))
        }
    };

    let signing_certificate = signing_certificate(sso)?.ok_or_else(|| {
        SamlError::MalformedMetadata(format!("{entity_id} has no signing certificate"))
    })?;

    let service = role.required_service();
    let mut endpoints = Vec::new();
    for e in child_elements(sso, MD_NS, service.element_name()) {
        let Some(location) = e.attribute("Location") else {
            return Err(SamlError::MalformedMetadata(format!(
                "{} without Location",
                service.element_name()
            )));
        };
        let Some(binding) = e.attribute("Binding").and_then(SamlBinding::from_uri) else {
            debug!(entity_id, location, "skipping endpoint with unrecognized binding");
            continue;
        };
        let index = e
            .attribute("index")
            .map(|i| {
                i.parse::<u16>()
                    .map_err(|_| SamlError::MalformedMetadata(format!("invalid index {i:?}")))
            })
            .transpose()?;
        endpoints.push(Endpoint {
            service,
            location: location.to_string(),
            binding,
            index,
            is_default: flag(e, "isDefault")?,
        });
    }

    let mut descriptor = EntityDescriptor::new(entity_id, role, signing_certificate);
    descriptor.endpoints = endpoints;
    for format in child_elements(sso, MD_NS, "NameIDFormat") {
        descriptor = descriptor.with_name_id_format(element_text(format));
    }
    match role {
        EntityRole::Idp => {
            descriptor.want_authn_requests_signed = flag(sso, "WantAuthnRequestsSigned")?;
        }
        EntityRole::Sp => {
            descriptor.authn_requests_signed = flag(sso, "AuthnRequestsSigned")?;
            descriptor.want_assertions_signed = flag(sso, "WantAssertionsSigned")?;
        }
    }
    descriptor.validate()?;
    Ok(descriptor)
}

/// Returns the role descriptor that advertises SAML 2.0 protocol support.
fn role_descriptor<'a, 'input>(node: Node<'a, 'input>, local: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| {
        is_element(*c, MD_NS, local)
            && c.attribute("protocolSupportEnumeration")
                .is_some_and(|p| p.split_whitespace().any(|uri| uri == SAMLP_NS))
    })
}

/// Returns the first certificate of a `KeyDescriptor` usable for signing.
fn signing_certificate(sso: Node<'_, '_>) -> SamlResult<Option<Certificate>> {
    let Some(key) = child_elements(sso, MD_NS, "KeyDescriptor")
        .find(|k| matches!(k.attribute("use"), None | Some("signing")))
    else {
        return Ok(None);
    };
    let Some(encoded) = child_element(key, XMLDSIG_NS, "KeyInfo")
        .and_then(|ki| child_element(ki, XMLDSIG_NS, "X509Data"))
        .and_then(|data| child_element(data, XMLDSIG_NS, "X509Certificate"))
    else {
        return Ok(None);
    };
    Certificate::from_base64(&element_text(encoded))
        .map(Some)
        .map_err(|e| SamlError::MalformedMetadata(format!("signing certificate: {e}")))
}

fn flag(node: Node<'_, '_>, name: &str) -> SamlResult<bool> {
    match node.attribute(name) {
        None | Some("false" | "0") => Ok(false),
        Some("true" | "1") => Ok(true),
        Some(other) => Err(SamlError::MalformedMetadata(format!(
            "{name} must be a boolean, got {other:?}"
        ))),
    }
}

/// Writes `descriptor` as an `md:EntityDescriptor` document.
///
/// Only endpoints of the descriptor's own role are written. ACS endpoints
/// without an index are numbered by position.
///
/// # Errors
///
/// Returns `Internal` if the XML writer fails.
pub fn serialize_metadata(descriptor: &EntityDescriptor) -> SamlResult<String> {
    let bool_attr = |b: bool| if b { "true" } else { "false" };

    let mut w = XmlWriter::new();
    w.start(
        "md:EntityDescriptor",
        &[
            ("xmlns:md", MD_NS),
            ("xmlns:ds", XMLDSIG_NS),
            ("entityID", descriptor.entity_id.as_str()),
        ],
    )?;

    let role_element = match descriptor.role {
        EntityRole::Idp => {
            w.start(
                "md:IDPSSODescriptor",
                &[
                    (
                        "WantAuthnRequestsSigned",
                        bool_attr(descriptor.want_authn_requests_signed),
                    ),
                    ("protocolSupportEnumeration", SAMLP_NS),
                ],
            )?;
            "md:IDPSSODescriptor"
        }
        EntityRole::Sp => {
            w.start(
                "md:SPSSODescriptor",
                &[
                    ("AuthnRequestsSigned", bool_attr(descriptor.authn_requests_signed)),
                    ("WantAssertionsSigned", bool_attr(descriptor.want_assertions_signed)),
                    ("protocolSupportEnumeration", SAMLP_NS),
                ],
            )?;
            "md:SPSSODescriptor"
        }
    };

    w.start("md:KeyDescriptor", &[("use", "signing")])?;
    w.start("ds:KeyInfo", &[])?;
    w.start("ds:X509Data", &[])?;
    w.text_element(
        "ds:X509Certificate",
        &[],
        &descriptor.signing_certificate.to_base64(),
    )?;
    w.end("ds:X509Data")?;
    w.end("ds:KeyInfo")?;
    w.end("md:KeyDescriptor")?;

    for format in &descriptor.name_id_formats {
        w.text_element("md:NameIDFormat", &[], format)?;
    }

    let service = descriptor.role.required_service();
    let element = format!("md:{}", service.element_name());
    for (position, endpoint) in descriptor.endpoints_for(service).enumerate() {
        let mut attrs = vec![
            ("Binding", endpoint.binding.uri().to_string()),
            ("Location", endpoint.location.clone()),
        ];
        if service == ServiceType::AssertionConsumer {
            let index = endpoint.index.map_or(position, usize::from);
            attrs.push(("index", index.to_string()));
            if endpoint.is_default {
                attrs.push(("isDefault", "true".to_string()));
            }
        }
        let attrs: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        w.empty(&element, &attrs)?;
    }

    w.end(role_element)?;
    w.end("md:EntityDescriptor")?;
    w.finish()
}
