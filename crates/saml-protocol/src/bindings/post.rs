//! HTTP-POST: plain base64 in a self-submitting HTML form.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use url::form_urlencoded;

use crate::error::{SamlError, SamlResult};

use super::{bounded_base64, check_relay_state, utf8, DecodedMessage, SamlMessageType};

/// An auto-submitting form carrying one SAML message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostForm {
    /// Form `action`: the recipient endpoint.
    pub action: String,
    /// `SAMLRequest` or `SAMLResponse`.
    pub field: &'static str,
    /// Base64 of the message XML.
    pub value: String,
    /// RelayState carried alongside.
    pub relay_state: Option<String>,
}

impl PostForm {
    /// Renders a minimal page whose form submits itself on load; the
    /// button is only shown to browsers without scripting.
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut inputs = vec![hidden_input(self.field, &self.value)];
        if let Some(rs) = &self.relay_state {
            inputs.push(hidden_input("RelayState", rs));
        }
        format!(
            concat!(
                "<!DOCTYPE html>\n",
                "<html><head><meta charset=\"utf-8\"><title>Continue to {action}</title></head>\n",
                "<body onload=\"document.forms[0].submit()\">\n",
                "<form method=\"post\" action=\"{action}\">\n{inputs}\n",
                "<noscript><button type=\"submit\">Continue</button></noscript>\n",
                "</form>\n</body></html>\n"
            ),
            action = html_escape(&self.action),
            inputs = inputs.join("\n"),
        )
    }

    /// Renders the `application/x-www-form-urlencoded` body a browser
    /// would submit for this form.
    #[must_use]
    pub fn to_form_body(&self) -> String {
        let mut body = form_urlencoded::Serializer::new(String::new());
        body.append_pair(self.field, &self.value);
        if let Some(rs) = &self.relay_state {
            body.append_pair("RelayState", rs);
        }
        body.finish()
    }
}

/// Stateless HTTP-POST codec.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Wraps `xml` in a form addressed to `destination`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` on an over-long RelayState.
    pub fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> SamlResult<PostForm> {
        check_relay_state(relay_state)?;
        Ok(PostForm {
            action: destination.to_string(),
            field: message_type.form_param(),
            value: STANDARD.encode(xml),
            relay_state: relay_state.map(String::from),
        })
    }

    /// Decodes a SAML message from a form-urlencoded POST body.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` for missing, duplicated or oversized
    /// fields and for payloads that are not base64 of UTF-8.
    pub fn decode(body: &str, max_message_size: usize) -> SamlResult<DecodedMessage> {
        let mut saml_request = None;
        let mut saml_response = None;
        let mut relay_state = None;
        for (key, value) in form_urlencoded::parse(body.trim().as_bytes()) {
            let slot = match key.as_ref() {
                "SAMLRequest" => &mut saml_request,
                "SAMLResponse" => &mut saml_response,
                "RelayState" => &mut relay_state,
                _ => continue,
            };
            if slot.replace(value.into_owned()).is_some() {
                return Err(SamlError::MalformedMessage(format!(
                    "field {key} appears more than once"
                )));
            }
        }

        let (encoded, message_type) = match (saml_request, saml_response) {
            (Some(m), None) => (m, SamlMessageType::Request),
            (None, Some(m)) => (m, SamlMessageType::Response),
            (Some(_), Some(_)) => {
                return Err(SamlError::MalformedMessage(
                    "both SAMLRequest and SAMLResponse present".into(),
                ))
            }
            (None, None) => {
                return Err(SamlError::MalformedMessage(
                    "no SAMLRequest or SAMLResponse field".into(),
                ))
            }
        };
        check_relay_state(relay_state.as_deref())?;

        let encoded = bounded_base64(&encoded, max_message_size)?;
        let xml = utf8(STANDARD.decode(encoded)?)?;

        Ok(DecodedMessage {
            xml,
            message_type,
            relay_state,
            detached_signature: None,
        })
    }
}

fn hidden_input(name: &str, value: &str) -> String {
    format!(
        r#"<input type="hidden" name="{}" value="{}"/>"#,
        html_escape(name),
        html_escape(value)
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
