//! SAML 2.0 Web Browser SSO.
//!
//! Both halves of the profile, without any HTTP server:
//!
//! - [`idp::IdpEngine`] receives AuthnRequests, validates them against the
//!   requesting SP's metadata and issues signed Responses.
//! - [`sp::SpEngine`] builds AuthnRequests and consumes Responses exactly
//!   once, producing an authenticated [`Identity`].
//!
//! The supporting modules are usable on their own:
//!
//! - [`types`] - protocol message model
//! - [`codec`] - XML serialization and the binding codec
//! - [`bindings`] - HTTP-Redirect and HTTP-POST transport encodings
//! - [`signature`] - exclusive C14N and enveloped XML signatures
//! - [`metadata`] - entity descriptors and the peer registry
//! - [`replay`] - pending-request and consumed-response tracking
//! - [`validation`] - the individual protocol checks
//!
//! # Example
//!
//! ```rust,ignore
//! let login = sp.begin_login("https://idp.example.com", Some("/home"))?;
//! // browser carries login.message to the IdP
//! let received = idp.receive(&raw_request, SamlBinding::HttpRedirect)?;
//! let validated = idp.validate(received)?;
//! let issued = idp.issue(validated, "alice", &attributes)?;
//! // browser posts issued.message to the ACS
//! let identity = sp.complete_login(&form_body, SamlBinding::HttpPost)?;
//! ```
//!
//! # Standards
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Profiles](https://docs.oasis-open.org/security/saml/v2.0/saml-profiles-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)
//! - [Exclusive XML Canonicalization](https://www.w3.org/TR/xml-exc-c14n/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod codec;
pub mod config;
pub mod error;
pub mod idp;
pub mod metadata;
pub mod replay;
pub mod signature;
pub mod sp;
pub mod types;
pub mod validation;
pub(crate) mod xml;

#[cfg(test)]
mod test_support;

pub use config::{CodecConfig, IdpConfig, SpConfig};
pub use error::{SamlError, SamlResult};
pub use idp::{IdpEngine, IssuedResponse, ReceivedRequest, ValidatedRequest};
pub use metadata::{EntityDescriptor, MetadataRegistry};
pub use replay::{InMemoryReplayStore, ReplayStore};
pub use signature::{SigningCredential, XmlSigner};
pub use sp::{LoginRequest, SpEngine};
pub use types::*;
