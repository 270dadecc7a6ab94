//! SAML metadata model.
//!
//! An [`EntityDescriptor`] describes one peer: its entity ID, role,
//! endpoints, signing certificate and supported NameID formats. The
//! [`MetadataRegistry`] holds one descriptor per peer, keyed by entity ID.

mod document;
mod registry;

pub use document::{parse_entities, parse_metadata, serialize_metadata};
pub use registry::MetadataRegistry;

use saml_crypto::Certificate;
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::types::SamlBinding;

/// The SSO role a peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityRole {
    /// Identity provider.
    Idp,
    /// Service provider.
    Sp,
}

impl EntityRole {
    /// Returns the endpoint type every descriptor of this role must offer.
    #[must_use]
    pub const fn required_service(&self) -> ServiceType {
        match self {
            Self::Idp => ServiceType::SingleSignOn,
            Self::Sp => ServiceType::AssertionConsumer,
        }
    }
}

/// Endpoint kinds relevant to Web Browser SSO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    /// IdP `SingleSignOnService`.
    SingleSignOn,
    /// SP `AssertionConsumerService`.
    AssertionConsumer,
}

impl ServiceType {
    /// Returns the metadata element name.
    #[must_use]
    pub const fn element_name(&self) -> &'static str {
        match self {
            Self::SingleSignOn => "SingleSignOnService",
            Self::AssertionConsumer => "AssertionConsumerService",
        }
    }
}

/// One protocol endpoint of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// What the endpoint is for.
    pub service: ServiceType,
    /// The endpoint URL.
    pub location: String,
    /// The binding it accepts.
    pub binding: SamlBinding,
    /// ACS index, when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u16>,
    /// Whether this ACS is the default one.
    #[serde(default)]
    pub is_default: bool,
}

impl Endpoint {
    /// Creates an endpoint without index.
    #[must_use]
    pub fn new(service: ServiceType, location: impl Into<String>, binding: SamlBinding) -> Self {
        Self {
            service,
            location: location.into(),
            binding,
            index: None,
            is_default: false,
        }
    }
}

/// An IdP or SP entity descriptor. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// The entity ID.
    pub entity_id: String,
    /// The role this descriptor describes.
    pub role: EntityRole,
    /// Endpoints in document order.
    pub endpoints: Vec<Endpoint>,
    /// Certificate whose key signs this peer's messages.
    pub signing_certificate: Certificate,
    /// Supported NameID format URIs; empty means no preference.
    pub name_id_formats: Vec<String>,
    /// IdP only: AuthnRequests must be signed.
    pub want_authn_requests_signed: bool,
    /// SP only: this SP signs its AuthnRequests.
    pub authn_requests_signed: bool,
    /// SP only: assertions sent to this SP must be signed.
    pub want_assertions_signed: bool,
}

impl EntityDescriptor {
    /// Creates a descriptor with no endpoints.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, role: EntityRole, signing_certificate: Certificate) -> Self {
        Self {
            entity_id: entity_id.into(),
            role,
            endpoints: Vec::new(),
            signing_certificate,
            name_id_formats: Vec::new(),
            want_authn_requests_signed: false,
            authn_requests_signed: false,
            want_assertions_signed: false,
        }
    }

    /// Appends an endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Appends a supported NameID format URI.
    #[must_use]
    pub fn with_name_id_format(mut self, format: impl Into<String>) -> Self {
        let format = format.into();
        if !self.name_id_formats.contains(&format) {
            self.name_id_formats.push(format);
        }
        self
    }

    /// Checks that the descriptor can take part in SSO.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMetadata` for an empty entity ID or when no
    /// endpoint of the role's required type uses POST or Redirect.
    pub fn validate(&self) -> SamlResult<()> {
        if self.entity_id.trim().is_empty() {
            return Err(SamlError::MalformedMetadata("entityID is empty".into()));
        }
        let required = self.role.required_service();
        if !self
            .endpoints_for(required)
            .any(|e| e.binding.is_front_channel())
        {
            return Err(SamlError::MalformedMetadata(format!(
                "{} has no usable {}",
                self.entity_id,
                required.element_name()
            )));
        }
        Ok(())
    }

    /// Returns the endpoints of one type, in document order.
    pub fn endpoints_for(&self, service: ServiceType) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter().filter(move |e| e.service == service)
    }

    /// Returns the SSO endpoint for `binding`, if offered.
    #[must_use]
    pub fn sso_endpoint(&self, binding: SamlBinding) -> Option<&Endpoint> {
        self.endpoints_for(ServiceType::SingleSignOn)
            .find(|e| e.binding == binding)
    }

    /// Returns the ACS to use when the request names none: the one marked
    /// default, else the first POST endpoint, else the first one.
    #[must_use]
    pub fn default_acs(&self) -> Option<&Endpoint> {
        let acs = || self.endpoints_for(ServiceType::AssertionConsumer);
        acs()
            .find(|e| e.is_default)
            .or_else(|| acs().find(|e| e.binding == SamlBinding::HttpPost))
            .or_else(|| acs().next())
    }

    /// Returns the registered ACS endpoint at exactly `url`.
    #[must_use]
    pub fn acs_by_url(&self, url: &str) -> Option<&Endpoint> {
        self.endpoints_for(ServiceType::AssertionConsumer)
            .find(|e| e.location == url)
    }

    /// Returns true if `format` may be issued to or requested by this peer.
    #[must_use]
    pub fn supports_name_id_format(&self, format: &str) -> bool {
        self.name_id_formats.is_empty() || self.name_id_formats.iter().any(|f| f == format)
    }
}
