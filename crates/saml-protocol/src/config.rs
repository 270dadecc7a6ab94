//! Engine configuration.
//!
//! Plain `serde` records with defaults for everything but the URLs that
//! identify an entity. Engines validate them once, at construction.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use url::Url;

use saml_crypto::Certificate;

use crate::error::{SamlError, SamlResult};
use crate::metadata::{Endpoint, EntityDescriptor, EntityRole, ServiceType};
use crate::signature::SignatureConfig;
use crate::types::{AuthnContextClass, NameIdFormat, SamlBinding};

/// Wire codec limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Largest decoded message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_message_size: 256 * 1024,
        }
    }
}

impl CodecConfig {
    fn validate(&self) -> SamlResult<()> {
        if self.max_message_size == 0 {
            return Err(config_error("codec.max_message_size must be positive"));
        }
        Ok(())
    }
}

/// Identity provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpConfig {
    /// This IdP's entity ID.
    pub entity_id: String,
    /// This IdP's SSO endpoint; inbound requests must name it as destination.
    pub sso_url: String,
    /// Bindings accepted at the SSO endpoint.
    #[serde(default = "default_sso_bindings")]
    pub sso_bindings: Vec<SamlBinding>,
    /// NameID formats this IdP issues; the first is used when none is requested.
    #[serde(default = "default_name_id_formats")]
    pub name_id_formats: Vec<NameIdFormat>,
    /// Authentication context reported in issued assertions.
    #[serde(default = "default_authn_context")]
    pub authn_context_class_ref: String,
    /// Signature and digest algorithms.
    #[serde(default)]
    pub signing: SignatureConfig,
    /// Sign each assertion.
    #[serde(default = "default_true")]
    pub sign_assertions: bool,
    /// Sign the enclosing response.
    #[serde(default = "default_true")]
    pub sign_responses: bool,
    /// Refuse AuthnRequests that carry no signature.
    #[serde(default)]
    pub want_authn_requests_signed: bool,
    /// Tolerated clock difference, in seconds.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_seconds: i64,
    /// Validity of issued assertions, in seconds.
    #[serde(default = "default_assertion_lifetime")]
    pub assertion_lifetime_seconds: i64,
    /// Oldest AuthnRequest accepted, in seconds.
    #[serde(default = "default_request_lifetime")]
    pub request_max_age_seconds: i64,
    /// `SessionNotOnOrAfter` offset, in seconds.
    #[serde(default = "default_session_lifetime")]
    pub session_lifetime_seconds: i64,
    /// Secret mixed into persistent NameID pseudonyms.
    #[serde(default, skip_serializing)]
    pub persistent_id_secret: Option<String>,
    /// Wire codec limits.
    #[serde(default)]
    pub codec: CodecConfig,
}

impl IdpConfig {
    /// Creates a configuration with defaults for everything but the URLs.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, sso_url: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            sso_url: sso_url.into(),
            sso_bindings: default_sso_bindings(),
            name_id_formats: default_name_id_formats(),
            authn_context_class_ref: default_authn_context(),
            signing: SignatureConfig::default(),
            sign_assertions: true,
            sign_responses: true,
            want_authn_requests_signed: false,
            clock_skew_seconds: default_clock_skew(),
            assertion_lifetime_seconds: default_assertion_lifetime(),
            request_max_age_seconds: default_request_lifetime(),
            session_lifetime_seconds: default_session_lifetime(),
            persistent_id_secret: None,
            codec: CodecConfig::default(),
        }
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` naming the first invalid field.
    pub fn validate(&self) -> SamlResult<()> {
        check_entity_id(&self.entity_id)?;
        check_url("sso_url", &self.sso_url)?;
        if self.sso_bindings.is_empty() {
            return Err(config_error("sso_bindings is empty"));
        }
        if let Some(b) = self.sso_bindings.iter().find(|b| !b.is_front_channel()) {
            return Err(config_error(format!("sso_bindings: {b} is not supported")));
        }
        if self.name_id_formats.is_empty() {
            return Err(config_error("name_id_formats is empty"));
        }
        let has_secret = self
            .persistent_id_secret
            .as_deref()
            .is_some_and(|s| !s.is_empty());
        if self.name_id_formats.contains(&NameIdFormat::Persistent) && !has_secret {
            return Err(config_error(
                "persistent_id_secret is required to issue persistent NameIDs",
            ));
        }
        if self.authn_context_class_ref.trim().is_empty() {
            return Err(config_error("authn_context_class_ref is empty"));
        }
        if !self.sign_assertions && !self.sign_responses {
            return Err(config_error(
                "at least one of sign_assertions and sign_responses must be enabled",
            ));
        }
        check_skew(self.clock_skew_seconds)?;
        check_lifetime("assertion_lifetime_seconds", self.assertion_lifetime_seconds)?;
        check_lifetime("request_max_age_seconds", self.request_max_age_seconds)?;
        check_lifetime("session_lifetime_seconds", self.session_lifetime_seconds)?;
        self.codec.validate()
    }

    /// Tolerated clock difference.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        Duration::seconds(self.clock_skew_seconds)
    }

    /// Validity of issued assertions.
    #[must_use]
    pub fn assertion_lifetime(&self) -> Duration {
        Duration::seconds(self.assertion_lifetime_seconds)
    }

    /// Oldest AuthnRequest accepted.
    #[must_use]
    pub fn request_max_age(&self) -> Duration {
        Duration::seconds(self.request_max_age_seconds)
    }

    /// `SessionNotOnOrAfter` offset.
    #[must_use]
    pub fn session_lifetime(&self) -> Duration {
        Duration::seconds(self.session_lifetime_seconds)
    }

    /// The entity descriptor this IdP publishes, signing with `certificate`.
    #[must_use]
    pub fn descriptor(&self, certificate: Certificate) -> EntityDescriptor {
        let mut descriptor =
            EntityDescriptor::new(self.entity_id.clone(), EntityRole::Idp, certificate);
        for &binding in &self.sso_bindings {
            descriptor = descriptor.with_endpoint(Endpoint::new(
                ServiceType::SingleSignOn,
                self.sso_url.clone(),
                binding,
            ));
        }
        for format in &self.name_id_formats {
            descriptor = descriptor.with_name_id_format(format.uri());
        }
        descriptor.want_authn_requests_signed = self.want_authn_requests_signed;
        descriptor
    }
}

/// Service provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpConfig {
    /// This SP's entity ID, used as the expected audience.
    pub entity_id: String,
    /// This SP's ACS URL; inbound responses must name it as destination.
    pub acs_url: String,
    /// Binding of the ACS endpoint.
    #[serde(default = "default_acs_binding")]
    pub acs_binding: SamlBinding,
    /// Binding used to send AuthnRequests when the IdP offers it.
    #[serde(default = "default_sso_binding")]
    pub preferred_sso_binding: SamlBinding,
    /// NameID format requested in the NameIDPolicy.
    #[serde(default = "default_name_id_format")]
    pub name_id_format: NameIdFormat,
    /// Signature and digest algorithms for signed requests.
    #[serde(default)]
    pub signing: SignatureConfig,
    /// Sign outgoing AuthnRequests.
    #[serde(default)]
    pub authn_requests_signed: bool,
    /// Require a signature on the Response element.
    #[serde(default = "default_true")]
    pub want_response_signed: bool,
    /// Require a signature on every Assertion.
    #[serde(default = "default_true")]
    pub want_assertions_signed: bool,
    /// Accept responses that answer no outstanding request.
    #[serde(default)]
    pub allow_unsolicited: bool,
    /// Tolerated clock difference, in seconds.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_seconds: i64,
    /// How long an outstanding AuthnRequest stays answerable, in seconds.
    #[serde(default = "default_request_lifetime")]
    pub request_lifetime_seconds: i64,
    /// Wire codec limits.
    #[serde(default)]
    pub codec: CodecConfig,
}

impl SpConfig {
    /// Creates a configuration with defaults for everything but the URLs.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, acs_url: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            acs_url: acs_url.into(),
            acs_binding: default_acs_binding(),
            preferred_sso_binding: default_sso_binding(),
            name_id_format: default_name_id_format(),
            signing: SignatureConfig::default(),
            authn_requests_signed: false,
            want_response_signed: true,
            want_assertions_signed: true,
            allow_unsolicited: false,
            clock_skew_seconds: default_clock_skew(),
            request_lifetime_seconds: default_request_lifetime(),
            codec: CodecConfig::default(),
        }
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` naming the first invalid field.
    pub fn validate(&self) -> SamlResult<()> {
        check_entity_id(&self.entity_id)?;
        check_url("acs_url", &self.acs_url)?;
        if self.acs_binding != SamlBinding::HttpPost {
            return Err(config_error(format!(
                "acs_binding: responses are only delivered over {}",
                SamlBinding::HttpPost
            )));
        }
        if !self.preferred_sso_binding.is_front_channel() {
            return Err(config_error(format!(
                "preferred_sso_binding: {} is not supported",
                self.preferred_sso_binding
            )));
        }
        if !self.want_response_signed && !self.want_assertions_signed {
            return Err(config_error(
                "at least one of want_response_signed and want_assertions_signed must be enabled",
            ));
        }
        check_skew(self.clock_skew_seconds)?;
        check_lifetime("request_lifetime_seconds", self.request_lifetime_seconds)?;
        self.codec.validate()
    }

    /// Tolerated clock difference.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        Duration::seconds(self.clock_skew_seconds)
    }

    /// How long an outstanding AuthnRequest stays answerable.
    #[must_use]
    pub fn request_lifetime(&self) -> Duration {
        Duration::seconds(self.request_lifetime_seconds)
    }

    /// The entity descriptor this SP publishes, signing with `certificate`.
    #[must_use]
    pub fn descriptor(&self, certificate: Certificate) -> EntityDescriptor {
        let mut descriptor = EntityDescriptor::new(self.entity_id.clone(), EntityRole::Sp, certificate)
            .with_endpoint(Endpoint {
                index: Some(0),
                is_default: true,
                ..Endpoint::new(ServiceType::AssertionConsumer, self.acs_url.clone(), self.acs_binding)
            })
            .with_name_id_format(self.name_id_format.uri());
        descriptor.authn_requests_signed = self.authn_requests_signed;
        descriptor.want_assertions_signed = self.want_assertions_signed;
        descriptor
    }
}

fn default_true() -> bool {
    true
}

fn default_sso_bindings() -> Vec<SamlBinding> {
    vec![SamlBinding::HttpRedirect, SamlBinding::HttpPost]
}

fn default_name_id_formats() -> Vec<NameIdFormat> {
    vec![NameIdFormat::Transient]
}

fn default_name_id_format() -> NameIdFormat {
    NameIdFormat::Transient
}

fn default_authn_context() -> String {
    AuthnContextClass::PasswordProtectedTransport.uri().to_string()
}

fn default_acs_binding() -> SamlBinding {
    SamlBinding::HttpPost
}

fn default_sso_binding() -> SamlBinding {
    SamlBinding::HttpRedirect
}

fn default_clock_skew() -> i64 {
    60
}

fn default_assertion_lifetime() -> i64 {
    300
}

fn default_request_lifetime() -> i64 {
    300
}

fn default_session_lifetime() -> i64 {
    8 * 60 * 60
}

fn config_error(message: impl Into<String>) -> SamlError {
    SamlError::ConfigurationError(message.into())
}

fn check_entity_id(entity_id: &str) -> SamlResult<()> {
    if entity_id.trim().is_empty() {
        return Err(config_error("entity_id is empty"));
    }
    Ok(())
}

fn check_url(field: &str, value: &str) -> SamlResult<()> {
    let url = Url::parse(value).map_err(|e| config_error(format!("{field}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(config_error(format!("{field}: {value} is not an http(s) URL")));
    }
    Ok(())
}

/// Upper bound for `clock_skew_seconds`.
const MAX_CLOCK_SKEW_SECONDS: i64 = 60 * 60;
/// Upper bound for every lifetime and maximum age.
const MAX_LIFETIME_SECONDS: i64 = 7 * 24 * 60 * 60;

fn check_skew(seconds: i64) -> SamlResult<()> {
    if !(0..=MAX_CLOCK_SKEW_SECONDS).contains(&seconds) {
        return Err(config_error(format!(
            "clock_skew_seconds must be between 0 and {MAX_CLOCK_SKEW_SECONDS}"
        )));
    }
    Ok(())
}

fn check_lifetime(field: &str, seconds: i64) -> SamlResult<()> {
    if !(1..=MAX_LIFETIME_SECONDS).contains(&seconds) {
        return Err(config_error(format!(
            "{field} must be between 1 and {MAX_LIFETIME_SECONDS}"
        )));
    }
    Ok(())
}
