//! `samlp:AuthnRequest` to and from XML.

use roxmltree::Node;

use super::{optional_bool, required_attr, required_instant, saml_child_text};
use crate::error::{SamlError, SamlResult};
use crate::types::{AuthnRequest, NameIdPolicy, SAMLP_NS, SAML_NS};
use crate::xml::{child_element, format_instant, is_element, parse_document, XmlWriter};

/// Serializes `request` as a standalone `samlp:AuthnRequest` document.
///
/// # Errors
///
/// Returns `Internal` if the XML writer fails.
pub fn serialize_authn_request(request: &AuthnRequest) -> SamlResult<String> {
    let issue_instant = format_instant(request.issue_instant);
    let mut attrs = vec![
        ("xmlns:samlp", SAMLP_NS),
        ("xmlns:saml", SAML_NS),
        ("ID", request.id.as_str()),
        ("Version", request.version.as_str()),
        ("IssueInstant", issue_instant.as_str()),
    ];
    push_opt(&mut attrs, "Destination", request.destination.as_deref());
    push_opt(
        &mut attrs,
        "AssertionConsumerServiceURL",
        request.assertion_consumer_service_url.as_deref(),
    );
    push_opt(&mut attrs, "ProtocolBinding", request.protocol_binding.as_deref());
    push_opt(&mut attrs, "ProviderName", request.provider_name.as_deref());
    if request.force_authn {
        attrs.push(("ForceAuthn", "true"));
    }
    if request.is_passive {
        attrs.push(("IsPassive", "true"));
    }

    let mut w = XmlWriter::new();
    w.start("samlp:AuthnRequest", &attrs)?;
    w.text_element("saml:Issuer", &[], &request.issuer)?;
    if let Some(policy) = &request.name_id_policy {
        let mut policy_attrs = Vec::new();
        push_opt(&mut policy_attrs, "Format", policy.format.as_deref());
        push_opt(
            &mut policy_attrs,
            "SPNameQualifier",
            policy.sp_name_qualifier.as_deref(),
        );
        policy_attrs.push((
            "AllowCreate",
            if policy.allow_create { "true" } else { "false" },
        ));
        w.empty("samlp:NameIDPolicy", &policy_attrs)?;
    }
    w.end("samlp:AuthnRequest")?;
    w.finish()
}

/// Parses a `samlp:AuthnRequest` document.
///
/// # Errors
///
/// Returns `MalformedMessage` if the XML is not well-formed or is not a
/// structurally valid SAML 2.0 AuthnRequest.
pub fn parse_authn_request(xml: &str) -> SamlResult<AuthnRequest> {
    let doc = parse_document(xml)?;
    authn_request_from_node(doc.root_element())
}

fn authn_request_from_node(node: Node<'_, '_>) -> SamlResult<AuthnRequest> {
    if !is_element(node, SAMLP_NS, "AuthnRequest") {
        return Err(SamlError::MalformedMessage(format!(
            "expected AuthnRequest, found {}",
            node.tag_name().name()
        )));
    }

    let name_id_policy = child_element(node, SAMLP_NS, "NameIDPolicy")
        .map(|p| -> SamlResult<NameIdPolicy> {
            Ok(NameIdPolicy {
                format: p.attribute("Format").map(String::from),
                sp_name_qualifier: p.attribute("SPNameQualifier").map(String::from),
                allow_create: optional_bool(p, "AllowCreate")?.unwrap_or(false),
            })
        })
        .transpose()?;

    let request = AuthnRequest {
        id: required_attr(node, "ID")?.to_string(),
        version: required_attr(node, "Version")?.to_string(),
        issue_instant: required_instant(node, "IssueInstant")?,
        issuer: saml_child_text(node, "Issuer")
            .ok_or_else(|| SamlError::MalformedMessage("AuthnRequest has no Issuer".into()))?,
        destination: node.attribute("Destination").map(String::from),
        assertion_consumer_service_url: node
            .attribute("AssertionConsumerServiceURL")
            .map(String::from),
        protocol_binding: node.attribute("ProtocolBinding").map(String::from),
        name_id_policy,
        force_authn: optional_bool(node, "ForceAuthn")?.unwrap_or(false),
        is_passive: optional_bool(node, "IsPassive")?.unwrap_or(false),
        provider_name: node.attribute("ProviderName").map(String::from),
    };
    request.validate()?;
    Ok(request)
}

fn push_opt<'a>(attrs: &mut Vec<(&'a str, &'a str)>, name: &'a str, value: Option<&'a str>) {
    if let Some(value) = value {
        attrs.push((name, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NameIdFormat, SamlBinding};
    use chrono::{TimeZone, Utc};

    fn sample() -> AuthnRequest {
        AuthnRequest::with_id(
            "_req1",
            "https://sp.example.com",
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
        .with_destination("https://idp.example.com/sso")
        .with_acs_url("https://sp.example.com/acs?a=1&b=<2>")
        .with_binding(SamlBinding::HttpPost)
        .with_name_id_policy(NameIdPolicy::with_format(NameIdFormat::Persistent).allow_create(true))
        .with_provider_name("Example & Co")
        .force_authn(true)
    }

    #[test]
    fn request_survives_xml() {
        let request = sample();
        let xml = serialize_authn_request(&request).unwrap();
        assert!(xml.starts_with("<samlp:AuthnRequest "));
        assert_eq!(parse_authn_request(&xml).unwrap(), request);

        let minimal = AuthnRequest::with_id("_r2", "sp", request.issue_instant);
        let xml = serialize_authn_request(&minimal).unwrap();
        assert_eq!(parse_authn_request(&xml).unwrap(), minimal);
    }

    #[test]
    fn parses_foreign_prefixes() {
        let xml = concat!(
            r#"<p:AuthnRequest xmlns:p="urn:oasis:names:tc:SAML:2.0:protocol" "#,
            r#"ID="_x" Version="2.0" IssueInstant="2024-05-01T12:00:00.250Z" IsPassive="1">"#,
            r#"<a:Issuer xmlns:a="urn:oasis:names:tc:SAML:2.0:assertion"> https://sp </a:Issuer>"#,
            r#"</p:AuthnRequest>"#
        );
        let request = parse_authn_request(xml).unwrap();
        assert_eq!(request.issuer, "https://sp");
        assert!(request.is_passive);
        assert!(!request.force_authn);
        assert!(request.name_id_policy.is_none());
    }

    #[test]
    fn rejects_structural_problems() {
        let not_request = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"/>"#;
        assert!(matches!(
            parse_authn_request(not_request),
            Err(SamlError::MalformedMessage(_))
        ));

        let xml = serialize_authn_request(&sample()).unwrap();
        for broken in [
            xml.replace("Version=\"2.0\"", "Version=\"1.1\""),
            xml.replace("IssueInstant=\"2024-05-01T12:00:00Z\"", "IssueInstant=\"soon\""),
            xml.replace("ForceAuthn=\"true\"", "ForceAuthn=\"yes\""),
            xml.replace("<saml:Issuer>https://sp.example.com</saml:Issuer>", ""),
            xml[..xml.len() - 5].to_string(),
        ] {
            assert!(
                matches!(parse_authn_request(&broken), Err(SamlError::MalformedMessage(_))),
                "accepted: {broken}"
            );
        }
    }
}
