//! Identity provider engine.
//!
//! An inbound AuthnRequest moves through three states. [`IdpEngine::receive`]
//! decodes it into a [`ReceivedRequest`]. [`IdpEngine::validate`] checks it
//! against the SP's metadata and yields a [`ValidatedRequest`], which only
//! `validate` can construct. [`IdpEngine::issue`] consumes that and yields
//! the signed [`IssuedResponse`].

mod issue;

pub use issue::IssuedResponse;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::bindings::DetachedSignature;
use crate::codec::MessageCodec;
use crate::config::IdpConfig;
use crate::error::{SamlError, SamlResult};
use crate::metadata::{Endpoint, EntityDescriptor, EntityRole, MetadataRegistry, ServiceType};
use crate::signature::{SigningCredential, XmlSignatureValidator, XmlSigner};
use crate::types::{AuthnRequest, NameIdFormat, SamlBinding};
use crate::validation::{check_destination, check_request_age};
use crate::xml::{ensure_unique_ids, parse_document};

/// A decoded AuthnRequest that has not been checked yet.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    request: AuthnRequest,
    binding: SamlBinding,
    relay_state: Option<String>,
    xml: String,
    detached_signature: Option<DetachedSignature>,
}

impl ReceivedRequest {
    /// The parsed request. Nothing in it is trusted yet.
    #[must_use]
    pub fn request(&self) -> &AuthnRequest {
        &self.request
    }

    /// The binding it arrived on.
    #[must_use]
    pub fn binding(&self) -> SamlBinding {
        self.binding
    }

    /// RelayState sent alongside.
    #[must_use]
    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_deref()
    }
}

/// An AuthnRequest from a registered SP that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    request: AuthnRequest,
    sp: Arc<EntityDescriptor>,
    acs_url: String,
    name_id_format: NameIdFormat,
    relay_state: Option<String>,
    signed: bool,
}

impl ValidatedRequest {
    /// The validated request.
    #[must_use]
    pub fn request(&self) -> &AuthnRequest {
        &self.request
    }

    /// The requesting SP.
    #[must_use]
    pub fn service_provider(&self) -> &EntityDescriptor {
        &self.sp
    }

    /// Where the response will be posted.
    #[must_use]
    pub fn acs_url(&self) -> &str {
        &self.acs_url
    }

    /// The NameID format that will be issued.
    #[must_use]
    pub fn name_id_format(&self) -> NameIdFormat {
        self.name_id_format
    }

    /// RelayState to return with the response.
    #[must_use]
    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_deref()
    }

    /// True if the request carried a signature, which verified.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signed
    }
}

/// The IdP half of Web Browser SSO.
///
/// Holds no per-request state; share it freely between threads.
#[derive(Debug)]
pub struct IdpEngine {
    config: IdpConfig,
    signer: XmlSigner,
    registry: Arc<MetadataRegistry>,
    codec: MessageCodec,
}

impl IdpEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the configuration is invalid, the
    /// key cannot produce the configured signature algorithm or no SP is
    /// registered.
    pub fn new(
        config: IdpConfig,
        credential: SigningCredential,
        registry: Arc<MetadataRegistry>,
    ) -> SamlResult<Self> {
        config.validate()?;
        if !registry.has_role(EntityRole::Sp) {
            return Err(SamlError::ConfigurationError(
                "no service provider is registered".into(),
            ));
        }
        if credential.certificate().not_after() < Utc::now().timestamp() {
            warn!(
                subject = credential.certificate().subject(),
                "IdP signing certificate has expired"
            );
        }
        let signer = XmlSigner::new(credential, config.signing)?;
        info!(entity_id = %config.entity_id, algorithm = ?signer.algorithm(), "IdP engine ready");
        Ok(Self {
            codec: MessageCodec::new(&config.codec),
            config,
            signer,
            registry,
        })
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &IdpConfig {
        &self.config
    }

    /// This IdP's own entity descriptor.
    #[must_use]
    pub fn metadata(&self) -> EntityDescriptor {
        self.config
            .descriptor(self.signer.credential().certificate().clone())
    }

    /// Decodes an AuthnRequest arriving at the SSO endpoint.
    ///
    /// `raw` is the request URL or query string for Redirect and the form
    /// body for POST.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBinding` for a binding the SSO endpoint does not
    /// accept and `MalformedMessage` if decoding fails.
    pub fn receive(&self, raw: &str, binding: SamlBinding) -> SamlResult<ReceivedRequest> {
        if !self.config.sso_bindings.contains(&binding) {
            let err = SamlError::InvalidBinding(format!(
                "{binding} is not accepted at {}",
                self.config.sso_url
            ));
            warn!(error = %err, "AuthnRequest rejected");
            return Err(err);
        }
        let (request, decoded) = self
            .codec
            .decode_authn_request(raw, binding)
            .inspect_err(|e| warn!(error = %e, "AuthnRequest rejected"))?;
        debug!(request_id = %request.id, issuer = %request.issuer, %binding, "AuthnRequest received");
        Ok(ReceivedRequest {
            request,
            binding,
            relay_state: decoded.relay_state,
            xml: decoded.xml,
            detached_signature: decoded.detached_signature,
        })
    }

    /// Validates a received request at the current time.
    ///
    /// # Errors
    ///
    /// See [`IdpEngine::validate_at`].
    pub fn validate(&self, received: ReceivedRequest) -> SamlResult<ValidatedRequest> {
        self.validate_at(received, Utc::now())
    }

    /// Validates a received request as of `now`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIssuer` if the issuer is not a registered SP,
    /// `DestinationMismatch` if the request is not addressed to this IdP's
    /// SSO endpoint, `RequestExpired` if it is too old or dated in the
    /// future, `SignatureInvalid` if a signature is broken or a required one
    /// is missing, `InvalidBinding` if no POST ACS can receive the response
    /// and `UnsupportedNameIdFormat` for a NameID format this IdP does not
    /// issue.
    pub fn validate_at(
        &self,
        received: ReceivedRequest,
        now: DateTime<Utc>,
    ) -> SamlResult<ValidatedRequest> {
        self.check_request(received, now)
            .inspect_err(|e| warn!(error = %e, "AuthnRequest rejected"))
    }

    fn check_request(
        &self,
        received: ReceivedRequest,
        now: DateTime<Utc>,
    ) -> SamlResult<ValidatedRequest> {
        let request = &received.request;
        let sp = self.registry.peer(&request.issuer, EntityRole::Sp)?;
        check_destination(&self.config.sso_url, request.destination.as_deref())?;
        check_request_age(
            request.issue_instant,
            now,
            self.config.request_max_age(),
            self.config.clock_skew(),
        )?;
        let signed = self.verify_request_signature(&received, &sp)?;
        let acs_url = select_acs(&sp, request)?;
        let name_id_format = self.select_name_id_format(request, &sp)?;

        info!(
            request_id = %request.id,
            sp = %sp.entity_id,
            acs = %acs_url,
            signed,
            "AuthnRequest validated"
        );
        Ok(ValidatedRequest {
            request: received.request,
            sp,
            acs_url,
            name_id_format,
            relay_state: received.relay_state,
            signed,
        })
    }

    /// Verifies whichever signature the request carries and enforces that
    /// one is present when either side demands it.
    fn verify_request_signature(
        &self,
        received: &ReceivedRequest,
        sp: &EntityDescriptor,
    ) -> SamlResult<bool> {
        let validator = XmlSignatureValidator::new(&sp.signing_certificate);
        let signed = if received.binding == SamlBinding::HttpRedirect {
            match &received.detached_signature {
                Some(detached) => {
                    validator.verify_redirect(
                        &detached.signed_query,
                        &detached.signature,
                        &detached.sig_alg,
                    )?;
                    true
                }
                None => false,
            }
        } else {
            let doc = parse_document(&received.xml)?;
            ensure_unique_ids(&doc)?;
            validator.verify_if_signed(doc.root_element())?
        };

        if !signed && (self.config.want_authn_requests_signed || sp.authn_requests_signed) {
            return Err(SamlError::SignatureInvalid(format!(
                "AuthnRequest from {} must be signed",
                sp.entity_id
            )));
        }
        Ok(signed)
    }

    fn select_name_id_format(
        &self,
        request: &AuthnRequest,
        sp: &EntityDescriptor,
    ) -> SamlResult<NameIdFormat> {
        let requested = request
            .name_id_policy
            .as_ref()
            .and_then(|p| p.format.as_deref())
            .filter(|uri| *uri != NameIdFormat::Unspecified.uri());
        match requested {
            Some(uri) => NameIdFormat::from_uri(uri)
                .filter(|f| self.config.name_id_formats.contains(f))
                .ok_or_else(|| SamlError::UnsupportedNameIdFormat(uri.to_string())),
            None => Ok(self.default_name_id_format(sp)),
        }
    }

    /// The first configured format the SP accepts, else the first configured.
    fn default_name_id_format(&self, sp: &EntityDescriptor) -> NameIdFormat {
        let formats = &self.config.name_id_formats;
        formats
            .iter()
            .find(|f| sp.supports_name_id_format(f.uri()))
            .or_else(|| formats.first())
            .copied()
            .unwrap_or(NameIdFormat::Transient)
    }
}

/// Picks the ACS the response goes to.
///
/// A requested URL is honoured only if the SP registered it with the POST
/// binding; otherwise the SP's default POST ACS is used.
fn select_acs(sp: &EntityDescriptor, request: &AuthnRequest) -> SamlResult<String> {
    if let Some(binding) = request.protocol_binding.as_deref() {
        if SamlBinding::from_uri(binding) != Some(SamlBinding::HttpPost) {
            return Err(SamlError::InvalidBinding(format!(
                "responses are only sent with HTTP-POST, not {binding}"
            )));
        }
    }
    if let Some(url) = request.assertion_consumer_service_url.as_deref() {
        if let Some(endpoint) = sp
            .endpoints_for(ServiceType::AssertionConsumer)
            .find(|e| e.location == url && e.binding == SamlBinding::HttpPost)
        {
            return Ok(endpoint.location.clone());
        }
        debug!(sp = %sp.entity_id, requested = url, "requested ACS is not registered, using default");
    }
    default_post_acs(sp).map(|e| e.location.clone())
}

fn default_post_acs(sp: &EntityDescriptor) -> SamlResult<&Endpoint> {
    let post = || {
        sp.endpoints_for(ServiceType::AssertionConsumer)
            .filter(|e| e.binding == SamlBinding::HttpPost)
    };
    post()
        .find(|e| e.is_default)
        .or_else(|| post().next())
        .ok_or_else(|| {
            SamlError::InvalidBinding(format!("{} has no HTTP-POST ACS endpoint", sp.entity_id))
        })
}
