//! `samlp:Response`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Assertion, Status, SAML_VERSION};
use crate::error::SamlResult;
use crate::xml::truncate_to_seconds;

/// The IdP's answer to an AuthnRequest, or an unsolicited login.
///
/// An SP consumes a given response ID at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub issue_instant: DateTime<Utc>,
    pub issuer: String,
    /// Absent for IdP-initiated logins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,
    /// The ACS URL the response is addressed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub status: Status,
    /// Document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<Assertion>,
    #[serde(skip)]
    pub signed: bool,
}

fn default_version() -> String {
    SAML_VERSION.to_string()
}

impl Response {
    #[must_use]
    pub fn new(issuer: impl Into<String>, issue_instant: DateTime<Utc>, status: Status) -> Self {
        Self {
            id: saml_crypto::generate_id(),
            version: default_version(),
            issue_instant: truncate_to_seconds(issue_instant),
            issuer: issuer.into(),
            in_response_to: None,
            destination: None,
            status,
            assertions: Vec::new(),
            signed: false,
        }
    }

    #[must_use]
    pub fn success(issuer: impl Into<String>, issue_instant: DateTime<Utc>) -> Self {
        Self::new(issuer, issue_instant, Status::success())
    }

    #[must_use]
    pub fn in_response_to(mut self, request_id: Option<String>) -> Self {
        self.in_response_to = request_id;
        self
    }

    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Structural checks shared by every decoded response.
    ///
    /// # Errors
    ///
    /// `MalformedMessage` for an empty ID or issuer or a version other
    /// than 2.0.
    pub fn validate(&self) -> SamlResult<()> {
        super::check_header("Response", &self.id, &self.version, &self.issuer)
    }

    /// How long the response ID must be remembered: the latest expiry of
    /// any contained assertion.
    #[must_use]
    pub fn latest_assertion_expiry(&self) -> Option<DateTime<Utc>> {
        self.assertions.iter().filter_map(Assertion::expires_at).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SamlError;
    use crate::types::Conditions;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn success_response_gets_its_own_id() {
        let response = Response::success("https://idp.example.com", now())
            .in_response_to(Some("_req".into()))
            .with_destination("https://sp.example.com/acs")
            .with_assertion(Assertion::new("https://idp.example.com", now()));

        assert!(response.is_success());
        assert!(response.validate().is_ok());
        assert_ne!(response.id, response.assertions[0].id);
    }

    #[test]
    fn failure_response_has_no_expiry() {
        let response = Response::new(
            "idp",
            now(),
            Status::from_error(&SamlError::AuthenticationFailed("x".into())),
        );
        assert!(!response.is_success());
        assert!(response.latest_assertion_expiry().is_none());
    }

    #[test]
    fn wrong_version_is_malformed() {
        let mut response = Response::success("idp", now());
        response.version = "1.0".into();
        assert!(matches!(response.validate(), Err(SamlError::MalformedMessage(m)) if m.contains("1.0")));
    }

    #[test]
    fn latest_expiry_spans_assertions() {
        let ending_in = |minutes| {
            Assertion::new("idp", now()).with_conditions(Conditions {
                not_on_or_after: Some(now() + Duration::minutes(minutes)),
                ..Conditions::default()
            })
        };
        let response = Response::success("idp", now())
            .with_assertion(ending_in(1))
            .with_assertion(ending_in(9));
        assert_eq!(response.latest_assertion_expiry(), Some(now() + Duration::minutes(9)));
    }
}
