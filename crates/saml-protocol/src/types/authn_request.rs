//! `samlp:AuthnRequest`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NameIdPolicy, SamlBinding, SAML_VERSION};
use crate::error::SamlResult;
use crate::xml::truncate_to_seconds;

/// A login request from an SP.
///
/// Built once per login attempt by the SP engine; the IdP engine accepts a
/// given request at most once per pending entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequest {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub issue_instant: DateTime<Utc>,
    /// Entity ID of the requesting SP.
    pub issuer: String,
    /// The IdP SSO URL the request was sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_url: Option<String>,
    /// Binding URI the response must use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_binding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id_policy: Option<NameIdPolicy>,
    #[serde(default)]
    pub force_authn: bool,
    #[serde(default)]
    pub is_passive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
}

fn default_version() -> String {
    SAML_VERSION.to_string()
}

impl AuthnRequest {
    #[must_use]
    pub fn with_id(
        id: impl Into<String>,
        issuer: impl Into<String>,
        issue_instant: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            version: default_version(),
            issue_instant: truncate_to_seconds(issue_instant),
            issuer: issuer.into(),
            destination: None,
            assertion_consumer_service_url: None,
            protocol_binding: None,
            name_id_policy: None,
            force_authn: false,
            is_passive: false,
            provider_name: None,
        }
    }

    #[must_use]
    pub fn with_acs_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Asks for the response over `binding`.
    #[must_use]
    pub fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.protocol_binding = Some(binding.uri().to_string());
        self
    }

    #[must_use]
    pub fn with_name_id_policy(mut self, policy: NameIdPolicy) -> Self {
        self.name_id_policy = Some(policy);
        self
    }

    #[must_use]
    pub const fn force_authn(mut self, force: bool) -> Self {
        self.force_authn = force;
        self
    }

    #[must_use]
    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    /// Structural checks shared by every decoded request.
    ///
    /// # Errors
    ///
    /// `MalformedMessage` for an empty ID or issuer or a version other
    /// than 2.0.
    pub fn validate(&self) -> SamlResult<()> {
        super::check_header("AuthnRequest", &self.id, &self.version, &self.issuer)
    }
}
