//! `samlp:Response` and `saml:Assertion` to and from XML.

use roxmltree::Node;

use super::{optional_instant, required_attr, required_instant, saml_child_text};
use crate::error::{SamlError, SamlResult};
use crate::types::{
    Assertion, Attribute, AttributeStatement, AudienceRestriction, AuthnStatement, Conditions,
    NameId, Response, Status, StatusCode, Subject, SubjectConfirmation, SubjectConfirmationData,
    SAMLP_NS, SAML_NS,
};
use crate::xml::{
    child_element, child_elements, element_text, format_instant, is_element, parse_document,
    XmlWriter,
};

/// Serializes `response`, including its assertions, as one document.
///
/// # Errors
///
/// Returns `Internal` if the XML writer fails.
pub fn serialize_response(response: &Response) -> SamlResult<String> {
    let issue_instant = format_instant(response.issue_instant);
    let mut attrs = vec![
        ("xmlns:samlp", SAMLP_NS),
        ("xmlns:saml", SAML_NS),
        ("ID", response.id.as_str()),
        ("Version", response.version.as_str()),
        ("IssueInstant", issue_instant.as_str()),
    ];
    if let Some(destination) = &response.destination {
        attrs.push(("Destination", destination));
    }
    if let Some(in_response_to) = &response.in_response_to {
        attrs.push(("InResponseTo", in_response_to));
    }

    let mut w = XmlWriter::new();
    w.start("samlp:Response", &attrs)?;
    w.text_element("saml:Issuer", &[], &response.issuer)?;
    write_status(&mut w, &response.status)?;
    for assertion in &response.assertions {
        write_assertion(&mut w, assertion)?;
    }
    w.end("samlp:Response")?;
    w.finish()
}

/// Serializes a standalone `saml:Assertion`.
///
/// # Errors
///
/// Returns `Internal` if the XML writer fails.
pub fn serialize_assertion(assertion: &Assertion) -> SamlResult<String> {
    let mut w = XmlWriter::new();
    write_assertion(&mut w, assertion)?;
    w.finish()
}

/// Parses a `samlp:Response` document without checking any signature.
///
/// Every `signed` flag in the result is `false`; the SP engine sets them
/// after verifying the corresponding elements.
///
/// # Errors
///
/// Returns `MalformedMessage` if the XML is not well-formed or is not a
/// structurally valid SAML 2.0 Response.
pub fn parse_response(xml: &str) -> SamlResult<Response> {
    let doc = parse_document(xml)?;
    response_from_node(doc.root_element())
}

fn write_status(w: &mut XmlWriter, status: &Status) -> SamlResult<()> {
    w.start("samlp:Status", &[])?;
    write_status_code(w, &status.status_code)?;
    if let Some(message) = &status.status_message {
        w.text_element("samlp:StatusMessage", &[], message)?;
    }
    w.end("samlp:Status")
}

fn write_status_code(w: &mut XmlWriter, code: &StatusCode) -> SamlResult<()> {
    let attrs = [("Value", code.value.as_str())];
    match &code.status_code {
        Some(nested) => {
            w.start("samlp:StatusCode", &attrs)?;
            write_status_code(w, nested)?;
            w.end("samlp:StatusCode")
        }
        None => w.empty("samlp:StatusCode", &attrs),
    }
}

fn write_assertion(w: &mut XmlWriter, assertion: &Assertion) -> SamlResult<()> {
    let issue_instant = format_instant(assertion.issue_instant);
    w.start(
        "saml:Assertion",
        &[
            ("xmlns:saml", SAML_NS),
            ("ID", assertion.id.as_str()),
            ("Version", assertion.version.as_str()),
            ("IssueInstant", issue_instant.as_str()),
        ],
    )?;
    w.text_element("saml:Issuer", &[], &assertion.issuer)?;
    if let Some(subject) = &assertion.subject {
        write_subject(w, subject)?;
    }
    if let Some(conditions) = &assertion.conditions {
        write_conditions(w, conditions)?;
    }
    if let Some(statement) = &assertion.authn_statement {
        write_authn_statement(w, statement)?;
    }
    if let Some(statement) = &assertion.attribute_statement {
        write_attribute_statement(w, statement)?;
    }
    w.end("saml:Assertion")
}

fn write_subject(w: &mut XmlWriter, subject: &Subject) -> SamlResult<()> {
    w.start("saml:Subject", &[])?;
    if let Some(name_id) = &subject.name_id {
        let mut attrs = Vec::new();
        if let Some(format) = &name_id.format {
            attrs.push(("Format", format.as_str()));
        }
        if let Some(q) = &name_id.name_qualifier {
            attrs.push(("NameQualifier", q.as_str()));
        }
        if let Some(q) = &name_id.sp_name_qualifier {
            attrs.push(("SPNameQualifier", q.as_str()));
        }
        w.text_element("saml:NameID", &attrs, &name_id.value)?;
    }
    for confirmation in &subject.subject_confirmations {
        w.start(
            "saml:SubjectConfirmation",
            &[("Method", confirmation.method.as_str())],
        )?;
        if let Some(data) = &confirmation.subject_confirmation_data {
            let not_on_or_after = data.not_on_or_after.map(format_instant);
            let mut attrs = Vec::new();
            if let Some(v) = &data.in_response_to {
                attrs.push(("InResponseTo", v.as_str()));
            }
            if let Some(v) = &not_on_or_after {
                attrs.push(("NotOnOrAfter", v.as_str()));
            }
            if let Some(v) = &data.recipient {
                attrs.push(("Recipient", v.as_str()));
            }
            w.empty("saml:SubjectConfirmationData", &attrs)?;
        }
        w.end("saml:SubjectConfirmation")?;
    }
    w.end("saml:Subject")
}

fn write_conditions(w: &mut XmlWriter, conditions: &Conditions) -> SamlResult<()> {
    let not_before = conditions.not_before.map(format_instant);
    let not_on_or_after = conditions.not_on_or_after.map(format_instant);
    let mut attrs = Vec::new();
    if let Some(v) = &not_before {
        attrs.push(("NotBefore", v.as_str()));
    }
    if let Some(v) = &not_on_or_after {
        attrs.push(("NotOnOrAfter", v.as_str()));
    }
    w.start("saml:Conditions", &attrs)?;
    for restriction in &conditions.audience_restrictions {
        w.start("saml:AudienceRestriction", &[])?;
        for audience in &restriction.audiences {
            w.text_element("saml:Audience", &[], audience)?;
        }
        w.end("saml:AudienceRestriction")?;
    }
    w.end("saml:Conditions")
}

fn write_authn_statement(w: &mut XmlWriter, statement: &AuthnStatement) -> SamlResult<()> {
    let authn_instant = format_instant(statement.authn_instant);
    let session_not_on_or_after = statement.session_not_on_or_after.map(format_instant);
    let mut attrs = vec![("AuthnInstant", authn_instant.as_str())];
    if let Some(v) = &statement.session_index {
        attrs.push(("SessionIndex", v.as_str()));
    }
    if let Some(v) = &session_not_on_or_after {
        attrs.push(("SessionNotOnOrAfter", v.as_str()));
    }
    w.start("saml:AuthnStatement", &attrs)?;
    w.start("saml:AuthnContext", &[])?;
    if let Some(class_ref) = &statement.authn_context_class_ref {
        w.text_element("saml:AuthnContextClassRef", &[], class_ref)?;
    }
    w.end("saml:AuthnContext")?;
    w.end("saml:AuthnStatement")
}

fn write_attribute_statement(w: &mut XmlWriter, statement: &AttributeStatement) -> SamlResult<()> {
    w.start("saml:AttributeStatement", &[])?;
    for attribute in &statement.attributes {
        let mut attrs = vec![("Name", attribute.name.as_str())];
        if let Some(v) = &attribute.name_format {
            attrs.push(("NameFormat", v.as_str()));
        }
        if let Some(v) = &attribute.friendly_name {
            attrs.push(("FriendlyName", v.as_str()));
        }
        w.start("saml:Attribute", &attrs)?;
        for value in &attribute.values {
            w.text_element("saml:AttributeValue", &[], value)?;
        }
        w.end("saml:Attribute")?;
    }
    w.end("saml:AttributeStatement")
}

pub(crate) fn response_from_node(node: Node<'_, '_>) -> SamlResult<Response> {
    if !is_element(node, SAMLP_NS, "Response") {
        return Err(SamlError::MalformedMessage(format!(
            "expected Response, found {}",
            node.tag_name().name()
        )));
    }
    if child_element(node, SAML_NS, "EncryptedAssertion").is_some() {
        return Err(SamlError::MalformedMessage(
            "encrypted assertions are not supported".into(),
        ));
    }

    let assertions = child_elements(node, SAML_NS, "Assertion")
        .map(assertion_from_node)
        .collect::<SamlResult<Vec<_>>>()?;
    let issuer = saml_child_text(node, "Issuer")
        .or_else(|| assertions.first().map(|a| a.issuer.clone()))
        .ok_or_else(|| SamlError::MalformedMessage("Response has no Issuer".into()))?;
    let status = child_element(node, SAMLP_NS, "Status")
        .ok_or_else(|| SamlError::MalformedMessage("Response has no Status".into()))
        .and_then(status_from_node)?;

    let response = Response {
        id: required_attr(node, "ID")?.to_string(),
        version: required_attr(node, "Version")?.to_string(),
        issue_instant: required_instant(node, "IssueInstant")?,
        issuer,
        in_response_to: node.attribute("InResponseTo").map(String::from),
        destination: node.attribute("Destination").map(String::from),
        status,
        assertions,
        signed: false,
    };
    response.validate()?;
    Ok(response)
}

fn status_from_node(node: Node<'_, '_>) -> SamlResult<Status> {
    let code = child_element(node, SAMLP_NS, "StatusCode")
        .ok_or_else(|| SamlError::MalformedMessage("Status has no StatusCode".into()))?;
    Ok(Status {
        status_code: status_code_from_node(code)?,
        status_message: child_element(node, SAMLP_NS, "StatusMessage").map(element_text),
    })
}

fn status_code_from_node(node: Node<'_, '_>) -> SamlResult<StatusCode> {
    let mut code = StatusCode::new(required_attr(node, "Value")?);
    if let Some(nested) = child_element(node, SAMLP_NS, "StatusCode") {
        code = code.with_sub_status(status_code_from_node(nested)?);
    }
    Ok(code)
}

pub(crate) fn assertion_from_node(node: Node<'_, '_>) -> SamlResult<Assertion> {
    let version = required_attr(node, "Version")?;
    if version != crate::types::SAML_VERSION {
        return Err(SamlError::MalformedMessage(format!(
            "unsupported assertion version {version}"
        )));
    }
    Ok(Assertion {
        id: required_attr(node, "ID")?.to_string(),
        version: version.to_string(),
        issue_instant: required_instant(node, "IssueInstant")?,
        issuer: saml_child_text(node, "Issuer")
            .ok_or_else(|| SamlError::MalformedMessage("Assertion has no Issuer".into()))?,
        subject: child_element(node, SAML_NS, "Subject")
            .map(subject_from_node)
            .transpose()?,
        conditions: child_element(node, SAML_NS, "Conditions")
            .map(conditions_from_node)
            .transpose()?,
        authn_statement: child_element(node, SAML_NS, "AuthnStatement")
            .map(authn_statement_from_node)
            .transpose()?,
        attribute_statement: child_element(node, SAML_NS, "AttributeStatement")
            .map(attribute_statement_from_node)
            .transpose()?,
        signed: false,
    })
}

fn subject_from_node(node: Node<'_, '_>) -> SamlResult<Subject> {
    let name_id = child_element(node, SAML_NS, "NameID").map(|n| NameId {
        value: element_text(n),
        format: n.attribute("Format").map(String::from),
        name_qualifier: n.attribute("NameQualifier").map(String::from),
        sp_name_qualifier: n.attribute("SPNameQualifier").map(String::from),
    });
    let subject_confirmations = child_elements(node, SAML_NS, "SubjectConfirmation")
        .map(|c| -> SamlResult<SubjectConfirmation> {
            let data = child_element(c, SAML_NS, "SubjectConfirmationData")
                .map(|d| -> SamlResult<SubjectConfirmationData> {
                    Ok(SubjectConfirmationData {
                        in_response_to: d.attribute("InResponseTo").map(String::from),
                        not_on_or_after: optional_instant(d, "NotOnOrAfter")?,
                        recipient: d.attribute("Recipient").map(String::from),
                    })
                })
                .transpose()?;
            Ok(SubjectConfirmation {
                method: required_attr(c, "Method")?.to_string(),
                subject_confirmation_data: data,
            })
        })
        .collect::<SamlResult<Vec<_>>>()?;
    Ok(Subject {
        name_id,
        subject_confirmations,
    })
}

fn conditions_from_node(node: Node<'_, '_>) -> SamlResult<Conditions> {
    Ok(Conditions {
        not_before: optional_instant(node, "NotBefore")?,
        not_on_or_after: optional_instant(node, "NotOnOrAfter")?,
        audience_restrictions: child_elements(node, SAML_NS, "AudienceRestriction")
            .map(|r| AudienceRestriction {
                audiences: child_elements(r, SAML_NS, "Audience")
                    .map(element_text)
                    .collect(),
            })
            .collect(),
    })
}

fn authn_statement_from_node(node: Node<'_, '_>) -> SamlResult<AuthnStatement> {
    Ok(AuthnStatement {
        authn_instant: required_instant(node, "AuthnInstant")?,
        session_index: node.attribute("SessionIndex").map(String::from),
        session_not_on_or_after: optional_instant(node, "SessionNotOnOrAfter")?,
        authn_context_class_ref: child_element(node, SAML_NS, "AuthnContext")
            .and_then(|c| child_element(c, SAML_NS, "AuthnContextClassRef"))
            .map(element_text),
    })
}

fn attribute_statement_from_node(node: Node<'_, '_>) -> SamlResult<AttributeStatement> {
    let attributes = child_elements(node, SAML_NS, "Attribute")
        .map(|a| -> SamlResult<Attribute> {
            Ok(Attribute {
                name: required_attr(a, "Name")?.to_string(),
                name_format: a.attribute("NameFormat").map(String::from),
                friendly_name: a.attribute("FriendlyName").map(String::from),
                values: child_elements(a, SAML_NS, "AttributeValue")
                    .map(|v| {
                        v.children()
                            .filter(Node::is_text)
                            .filter_map(|t| t.text())
                            .collect()
                    })
                    .collect(),
            })
        })
        .collect::<SamlResult<Vec<_>>>()?;
    Ok(AttributeStatement { attributes })
}
