//! Response construction and signing.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use tracing::info;

use super::{IdpEngine, ValidatedRequest};
use crate::codec::{serialize_response, EncodedMessage};
use crate::error::{SamlError, SamlResult};
use crate::metadata::{EntityDescriptor, EntityRole};
use crate::types::{
    Assertion, AttributeStatement, AuthnStatement, Conditions, NameId, NameIdFormat, Response,
    SamlBinding, Status, Subject, SubjectConfirmation, SubjectConfirmationData,
};

/// A signed Response ready to be posted to the SP.
#[derive(Debug, Clone)]
pub struct IssuedResponse {
    /// The response as built.
    pub response: Response,
    /// The signed document.
    pub xml: String,
    /// The auto-submitting POST form carrying `xml`.
    pub message: EncodedMessage,
}

/// Where and to what a response is addressed.
struct Recipient<'a> {
    sp: &'a EntityDescriptor,
    acs_url: &'a str,
    in_response_to: Option<&'a str>,
    name_id_format: NameIdFormat,
    relay_state: Option<&'a str>,
}

impl<'a> Recipient<'a> {
    fn of(validated: &'a ValidatedRequest) -> Self {
        Self {
            sp: &validated.sp,
            acs_url: &validated.acs_url,
            in_response_to: Some(validated.request.id.as_str()),
            name_id_format: validated.name_id_format,
            relay_state: validated.relay_state.as_deref(),
        }
    }
}

impl IdpEngine {
    /// Issues a success response for an authenticated subject.
    ///
    /// # Errors
    ///
    /// See [`IdpEngine::issue_at`].
    pub fn issue(
        &self,
        validated: ValidatedRequest,
        subject_id: &str,
        attributes: &BTreeMap<String, Vec<String>>,
    ) -> SamlResult<IssuedResponse> {
        self.issue_at(validated, subject_id, attributes, Utc::now())
    }

    /// Issues a success response as of `now`.
    ///
    /// `subject_id` is the local user identifier the caller authenticated;
    /// it becomes the NameID for every format but transient and persistent.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` for an empty `subject_id` and
    /// `Crypto` or `Internal` if signing or serialization fails.
    pub fn issue_at(
        &self,
        validated: ValidatedRequest,
        subject_id: &str,
        attributes: &BTreeMap<String, Vec<String>>,
        now: DateTime<Utc>,
    ) -> SamlResult<IssuedResponse> {
        let recipient = Recipient::of(&validated);
        self.issue_success(&recipient, subject_id, attributes, now)
    }

    /// Issues a failure response telling the SP why its request failed.
    ///
    /// # Errors
    ///
    /// Returns `Crypto` or `Internal` if signing or serialization fails.
    pub fn issue_failure(
        &self,
        validated: ValidatedRequest,
        error: &SamlError,
    ) -> SamlResult<IssuedResponse> {
        self.issue_failure_at(validated, error, Utc::now())
    }

    /// Issues a failure response as of `now`.
    ///
    /// Failure responses carry no assertion and are always signed.
    ///
    /// # Errors
    ///
    /// Returns `Crypto` or `Internal` if signing or serialization fails.
    pub fn issue_failure_at(
        &self,
        validated: ValidatedRequest,
        error: &SamlError,
        now: DateTime<Utc>,
    ) -> SamlResult<IssuedResponse> {
        let recipient = Recipient::of(&validated);
        let response = Response::new(&self.config.entity_id, now, Status::from_error(error))
            .in_response_to(recipient.in_response_to.map(str::to_string))
            .with_destination(recipient.acs_url);
        info!(
            sp = %recipient.sp.entity_id,
            status = response.status.most_specific_code(),
            "failure response issued"
        );
        self.finish(response, &recipient)
    }

    /// Issues an IdP-initiated response that answers no request.
    ///
    /// The response goes to the SP's default POST ACS and uses the first
    /// configured NameID format the SP accepts.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIssuer` if `sp_entity_id` is not a registered SP,
    /// `InvalidBinding` if it has no POST ACS and otherwise as
    /// [`IdpEngine::issue_at`].
    pub fn issue_unsolicited(
        &self,
        sp_entity_id: &str,
        subject_id: &str,
        attributes: &BTreeMap<String, Vec<String>>,
        relay_state: Option<&str>,
    ) -> SamlResult<IssuedResponse> {
        self.issue_unsolicited_at(sp_entity_id, subject_id, attributes, relay_state, Utc::now())
    }

    /// Issues an IdP-initiated response as of `now`.
    ///
    /// # Errors
    ///
    /// See [`IdpEngine::issue_unsolicited`].
    pub fn issue_unsolicited_at(
        &self,
        sp_entity_id: &str,
        subject_id: &str,
        attributes: &BTreeMap<String, Vec<String>>,
        relay_state: Option<&str>,
        now: DateTime<Utc>,
    ) -> SamlResult<IssuedResponse> {
        crate::bindings::check_relay_state(relay_state)?;
        let sp = self.registry.peer(sp_entity_id, EntityRole::Sp)?;
        let acs = super::default_post_acs(&sp)?;
        let recipient = Recipient {
            sp: &sp,
            acs_url: &acs.location,
            in_response_to: None,
            name_id_format: self.default_name_id_format(&sp),
            relay_state,
        };
        self.issue_success(&recipient, subject_id, attributes, now)
    }

    fn issue_success(
        &self,
        recipient: &Recipient<'_>,
        subject_id: &str,
        attributes: &BTreeMap<String, Vec<String>>,
        now: DateTime<Utc>,
    ) -> SamlResult<IssuedResponse> {
        if subject_id.trim().is_empty() {
            return Err(SamlError::AuthenticationFailed(
                "no subject identifier was supplied".into(),
            ));
        }
        let assertion = self.build_assertion(recipient, subject_id, attributes, now);
        let response = Response::success(&self.config.entity_id, now)
            .in_response_to(recipient.in_response_to.map(str::to_string))
            .with_destination(recipient.acs_url)
            .with_assertion(assertion);
        info!(
            response_id = %response.id,
            in_response_to = recipient.in_response_to.unwrap_or("(unsolicited)"),
            sp = %recipient.sp.entity_id,
            "response issued"
        );
        self.finish(response, recipient)
    }

    fn build_assertion(
        &self,
        recipient: &Recipient<'_>,
        subject_id: &str,
        attributes: &BTreeMap<String, Vec<String>>,
        now: DateTime<Utc>,
    ) -> Assertion {
        let config = &self.config;
        let confirmation = SubjectConfirmationData::for_request(
            recipient.in_response_to.map(str::to_string),
            recipient.acs_url,
            now + config.assertion_lifetime(),
        );
        let subject = Subject::new(self.name_id(recipient, subject_id))
            .with_confirmation(SubjectConfirmation::bearer(confirmation));
        let conditions = Conditions::with_validity(now, config.clock_skew(), config.assertion_lifetime())
            .with_audience(&recipient.sp.entity_id);
        let authn = AuthnStatement::new(&config.authn_context_class_ref, now)
            .with_session_not_on_or_after(now + config.session_lifetime());

        let mut assertion = Assertion::new(&config.entity_id, now)
            .with_subject(subject)
            .with_conditions(conditions)
            .with_authn_statement(authn);
        if !attributes.is_empty() {
            assertion = assertion.with_attribute_statement(AttributeStatement::from_map(attributes));
        }
        assertion
    }

    fn name_id(&self, recipient: &Recipient<'_>, subject_id: &str) -> NameId {
        let format = recipient.name_id_format;
        let value = match format {
            NameIdFormat::Transient => saml_crypto::generate_id(),
            NameIdFormat::Persistent => self.pseudonym(&recipient.sp.entity_id, subject_id),
            _ => subject_id.to_string(),
        };
        NameId::of_format(format, value)
            .with_name_qualifier(&self.config.entity_id)
            .with_sp_name_qualifier(&recipient.sp.entity_id)
    }

    /// Stable per-SP identifier that does not reveal `subject_id`: an
    /// HMAC-SHA256 keyed with `persistent_id_secret`. The subject comes last
    /// since entity IDs never contain a newline.
    fn pseudonym(&self, sp_entity_id: &str, subject_id: &str) -> String {
        let secret = self.config.persistent_id_secret.as_deref().unwrap_or_default();
        let input = [self.config.entity_id.as_str(), sp_entity_id, subject_id].join("\n");
        URL_SAFE_NO_PAD.encode(saml_crypto::hmac_sha256(secret.as_bytes(), input.as_bytes()))
    }

    /// Signs assertions, then the response, and wraps the result in a form.
    fn finish(
        &self,
        mut response: Response,
        recipient: &Recipient<'_>,
    ) -> SamlResult<IssuedResponse> {
        let mut xml = serialize_response(&response)?;
        if self.config.sign_assertions {
            for assertion in &mut response.assertions {
                xml = self.signer.sign(&xml, &assertion.id)?;
                assertion.signed = true;
            }
        }
        if self.config.sign_responses || response.assertions.is_empty() {
            xml = self.signer.sign(&xml, &response.id)?;
            response.signed = true;
        }
        let message = self.codec.encode_response(
            &xml,
            recipient.acs_url,
            SamlBinding::HttpPost,
            recipient.relay_state,
        )?;
        Ok(IssuedResponse {
            response,
            xml,
            message,
        })
    }
}
