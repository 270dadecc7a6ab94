//! Service provider engine.
//!
//! [`SpEngine::begin_login`] builds the AuthnRequest and remembers it in the
//! [`ReplayStore`]. [`SpEngine::complete_login`] accepts the IdP's Response
//! exactly once and turns it into an [`Identity`].
//!
//! Stateless checks run first, so a forged or stale response never touches
//! the store. The response ID is then recorded before the pending request
//! is consumed: of two concurrent deliveries of the same response, one
//! fails as a replay and cannot burn the other's request.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use roxmltree::Node;
use tracing::{debug, info, warn};

use crate::bindings::{check_relay_state, SamlMessageType};
use crate::codec::{expect_type, response_from_node, EncodedMessage, MessageCodec};
use crate::config::SpConfig;
use crate::error::{SamlError, SamlResult};
use crate::metadata::{Endpoint, EntityDescriptor, EntityRole, MetadataRegistry};
use crate::replay::{ConsumedResponseRecord, PendingRequest, ReplayStore, SweepOutcome};
use crate::signature::{SigningCredential, XmlSignatureValidator, XmlSigner};
use crate::types::{AuthnRequest, Identity, NameIdPolicy, Response, SamlBinding, SAML_NS};
use crate::validation::{
    check_conditions, check_destination, check_issuer, check_status, check_subject_confirmation,
};
use crate::xml::{child_elements, ensure_unique_ids, parse_document};

/// An AuthnRequest on its way to the IdP.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// The request as sent.
    pub request: AuthnRequest,
    /// The redirect URL or POST form to hand to the browser.
    pub message: EncodedMessage,
}

impl LoginRequest {
    /// The binding the request travels over.
    #[must_use]
    pub fn binding(&self) -> SamlBinding {
        self.message.binding()
    }
}

/// The SP half of Web Browser SSO.
pub struct SpEngine {
    config: SpConfig,
    signer: Option<XmlSigner>,
    registry: Arc<MetadataRegistry>,
    store: Arc<dyn ReplayStore>,
    codec: MessageCodec,
}

impl std::fmt::Debug for SpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpEngine")
            .field("entity_id", &self.config.entity_id)
            .field("signs_requests", &self.signer.is_some())
            .field("peers", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl SpEngine {
    /// Creates an engine.
    ///
    /// `credential` is needed only to sign requests and publish metadata.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the configuration is invalid, request
    /// signing is enabled without a credential or no IdP is registered.
    pub fn new(
        config: SpConfig,
        credential: Option<SigningCredential>,
        registry: Arc<MetadataRegistry>,
        store: Arc<dyn ReplayStore>,
    ) -> SamlResult<Self> {
        config.validate()?;
        if config.authn_requests_signed && credential.is_none() {
            return Err(SamlError::ConfigurationError(
                "authn_requests_signed needs a signing credential".into(),
            ));
        }
        if !registry.has_role(EntityRole::Idp) {
            return Err(SamlError::ConfigurationError(
                "no identity provider is registered".into(),
            ));
        }
        let signer = credential
            .map(|c| XmlSigner::new(c, config.signing))
            .transpose()?;
        info!(entity_id = %config.entity_id, "SP engine ready");
        Ok(Self {
            codec: MessageCodec::new(&config.codec),
            config,
            signer,
            registry,
            store,
        })
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &SpConfig {
        &self.config
    }

    /// This SP's own entity descriptor.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` when the engine has no credential.
    pub fn metadata(&self) -> SamlResult<EntityDescriptor> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            SamlError::ConfigurationError("metadata needs a signing certificate".into())
        })?;
        Ok(self.config.descriptor(signer.credential().certificate().clone()))
    }

    /// Starts a login at `idp_entity_id`.
    ///
    /// # Errors
    ///
    /// See [`SpEngine::begin_login_at`].
    pub fn begin_login(
        &self,
        idp_entity_id: &str,
        relay_state: Option<&str>,
    ) -> SamlResult<LoginRequest> {
        self.begin_login_at(idp_entity_id, relay_state, Utc::now())
    }

    /// Starts a login as of `now`.
    ///
    /// Uses the preferred SSO binding when the IdP offers it and the other
    /// front-channel binding otherwise. The request is signed when this SP
    /// is configured to sign or the IdP's metadata asks for it.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` for an over-long RelayState,
    /// `UnknownIssuer` if the IdP is not registered, `InvalidBinding` if it
    /// has no usable SSO endpoint and `ConfigurationError` if a signature
    /// is required but no credential was given.
    pub fn begin_login_at(
        &self,
        idp_entity_id: &str,
        relay_state: Option<&str>,
        now: DateTime<Utc>,
    ) -> SamlResult<LoginRequest> {
        check_relay_state(relay_state)?;
        let idp = self.registry.peer(idp_entity_id, EntityRole::Idp)?;
        let endpoint = self.select_sso(&idp)?;

        let request = AuthnRequest::with_id(saml_crypto::generate_id(), &self.config.entity_id, now)
            .with_destination(&endpoint.location)
            .with_acs_url(&self.config.acs_url)
            .with_binding(self.config.acs_binding)
            .with_name_id_policy(NameIdPolicy::with_format(self.config.name_id_format).allow_create(true));

        let signer = if self.config.authn_requests_signed || idp.want_authn_requests_signed {
            Some(self.signer.as_ref().ok_or_else(|| {
                SamlError::ConfigurationError(format!(
                    "{} requires signed requests but no credential is configured",
                    idp.entity_id
                ))
            })?)
        } else {
            None
        };
        let message = self
            .codec
            .encode_request(&request, endpoint.binding, relay_state, signer)?;

        self.store.store_pending(
            PendingRequest::new(&request.id, &idp.entity_id, now, self.config.request_lifetime())
                .with_relay_state(relay_state.map(str::to_string)),
        )?;
        info!(
            request_id = %request.id,
            idp = %idp.entity_id,
            binding = %endpoint.binding,
            signed = signer.is_some(),
            "AuthnRequest created"
        );
        Ok(LoginRequest { request, message })
    }

    fn select_sso<'a>(&self, idp: &'a EntityDescriptor) -> SamlResult<&'a Endpoint> {
        let preferred = self.config.preferred_sso_binding;
        let fallback = match preferred {
            SamlBinding::HttpRedirect => SamlBinding::HttpPost,
            _ => SamlBinding::HttpRedirect,
        };
        idp.sso_endpoint(preferred)
            .or_else(|| idp.sso_endpoint(fallback))
            .ok_or_else(|| {
                SamlError::InvalidBinding(format!(
                    "{} offers no SSO endpoint for {preferred} or {fallback}",
                    idp.entity_id
                ))
            })
    }

    /// Consumes a Response delivered to the ACS.
    ///
    /// # Errors
    ///
    /// See [`SpEngine::complete_login_at`].
    pub fn complete_login(&self, raw: &str, binding: SamlBinding) -> SamlResult<Identity> {
        self.complete_login_at(raw, binding, Utc::now())
    }

    /// Consumes a Response delivered to the ACS as of `now`.
    ///
    /// `raw` is the form body received on the ACS.
    ///
    /// # Errors
    ///
    /// Fails with the error kind of the first check that rejects the
    /// response. Among them: `SignatureInvalid`, `DestinationMismatch`,
    /// `StatusNotSuccess`, `AssertionExpired`, `AudienceMismatch`,
    /// `UnsolicitedResponse` and `ReplayedResponse`.
    pub fn complete_login_at(
        &self,
        raw: &str,
        binding: SamlBinding,
        now: DateTime<Utc>,
    ) -> SamlResult<Identity> {
        self.accept(raw, binding, now).inspect_err(|e| {
            warn!(error = %e, "Response rejected");
        })
    }

    fn accept(&self, raw: &str, binding: SamlBinding, now: DateTime<Utc>) -> SamlResult<Identity> {
        if binding != self.config.acs_binding {
            return Err(SamlError::InvalidBinding(format!(
                "the ACS only accepts {}",
                self.config.acs_binding
            )));
        }
        let decoded = self.codec.decode(raw, binding)?;
        expect_type(&decoded, SamlMessageType::Response)?;
        let doc = parse_document(&decoded.xml)?;
        ensure_unique_ids(&doc)?;
        let root = doc.root_element();
        let mut response = response_from_node(root)?;
        let idp = self.registry.peer(&response.issuer, EntityRole::Idp)?;

        self.verify_signatures(&mut response, root, &idp)?;
        self.check_response(&response, &idp, now)?;

        let in_response_to = response.in_response_to.clone();
        if in_response_to.is_none() && !self.config.allow_unsolicited {
            return Err(SamlError::UnsolicitedResponse(
                "response answers no request and unsolicited responses are disabled".into(),
            ));
        }

        let skew = self.config.clock_skew();
        let retain_until = response
            .latest_assertion_expiry()
            .unwrap_or(now + self.config.request_lifetime())
            + skew;
        self.store
            .record_consumed(ConsumedResponseRecord::new(&response.id, now, retain_until))?;

        let pending = match in_response_to.as_deref() {
            Some(request_id) => self.correlate(request_id, &idp, now)?,
            None => None,
        };
        let relay_state = decoded
            .relay_state
            .or_else(|| pending.and_then(|p| p.relay_state));

        let identity = build_identity(response, relay_state)?;
        info!(
            response_id = %identity.response_id,
            idp = %identity.issuer,
            in_response_to = identity.in_response_to.as_deref().unwrap_or("(unsolicited)"),
            "login completed"
        );
        Ok(identity)
    }

    /// Verifies the response and assertion signatures against the IdP's
    /// metadata certificate. Only signatures that are direct children of the
    /// verified elements count.
    fn verify_signatures(
        &self,
        response: &mut Response,
        root: Node<'_, '_>,
        idp: &EntityDescriptor,
    ) -> SamlResult<()> {
        let validator = XmlSignatureValidator::new(&idp.signing_certificate);
        response.signed = validator.verify_if_signed(root)?;
        if !response.signed && self.config.want_response_signed {
            return Err(SamlError::SignatureInvalid("Response is not signed".into()));
        }

        let nodes = child_elements(root, SAML_NS, "Assertion");
        for (assertion, node) in response.assertions.iter_mut().zip(nodes) {
            assertion.signed = validator.verify_if_signed(node)?;
            if !assertion.signed && self.config.want_assertions_signed {
                return Err(SamlError::SignatureInvalid(format!(
                    "assertion {} is not signed",
                    assertion.id
                )));
            }
        }
        Ok(())
    }

    fn check_response(
        &self,
        response: &Response,
        idp: &EntityDescriptor,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        let skew = self.config.clock_skew();
        check_destination(&self.config.acs_url, response.destination.as_deref())?;
        check_status(&response.status)?;
        if response.assertions.is_empty() {
            return Err(SamlError::MalformedMessage(
                "successful Response carries no assertion".into(),
            ));
        }
        for assertion in &response.assertions {
            check_issuer(&idp.entity_id, &assertion.issuer)?;
            check_conditions(assertion.conditions.as_ref(), &self.config.entity_id, now, skew)?;
            check_subject_confirmation(
                assertion.subject.as_ref(),
                &self.config.acs_url,
                response.in_response_to.as_deref(),
                now,
                skew,
            )?;
        }
        Ok(())
    }

    /// Consumes the pending request a response answers.
    ///
    /// With `allow_unsolicited`, an unknown request ID is tolerated and the
    /// response is treated as IdP-initiated.
    fn correlate(
        &self,
        request_id: &str,
        idp: &EntityDescriptor,
        now: DateTime<Utc>,
    ) -> SamlResult<Option<PendingRequest>> {
        match self.store.consume_pending(request_id, now) {
            Ok(pending) if pending.idp_entity_id != idp.entity_id => Err(SamlError::IssuerMismatch {
                expected: pending.idp_entity_id,
                actual: idp.entity_id.clone(),
            }),
            Ok(pending) => Ok(Some(pending)),
            Err(SamlError::UnsolicitedResponse(reason)) if self.config.allow_unsolicited => {
                debug!(request_id, reason = %reason, "accepting response as unsolicited");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Drops expired pending requests and consumed-response records.
    pub fn sweep_expired(&self) -> SweepOutcome {
        self.store.sweep(Utc::now())
    }
}

fn build_identity(response: Response, relay_state: Option<String>) -> SamlResult<Identity> {
    let name_id = response
        .assertions
        .iter()
        .find_map(|a| a.name_id().cloned())
        .ok_or_else(|| SamlError::MalformedMessage("no assertion names a subject".into()))?;
    let authn = response
        .assertions
        .iter()
        .find_map(|a| a.authn_statement.as_ref());

    let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for statement in response.assertions.iter().filter_map(|a| a.attribute_statement.as_ref()) {
        for (name, values) in statement.to_map() {
            attributes.entry(name).or_default().extend(values);
        }
    }

    Ok(Identity {
        name_id,
        session_index: authn.and_then(|a| a.session_index.clone()),
        authn_instant: authn.map(|a| a.authn_instant),
        authn_context_class_ref: authn.and_then(|a| a.authn_context_class_ref.clone()),
        attributes,
        issuer: response.issuer,
        response_id: response.id,
        in_response_to: response.in_response_to,
        relay_state,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::bindings::HttpPostBinding;
    use crate::idp::{IdpEngine, IssuedResponse};
    use crate::replay::InMemoryReplayStore;
    use crate::test_support::{
        idp_config, idp_credential, idp_descriptor, now, registry, sp_config, sp_credential,
        sp_descriptor, IDP_ID, IDP_SSO, SP_ACS,
    };

    struct Fixture {
        sp: SpEngine,
        idp: IdpEngine,
        store: Arc<InMemoryReplayStore>,
    }

    fn fixture_with(config: SpConfig) -> Fixture {
        let store = Arc::new(InMemoryReplayStore::new());
        let sp = SpEngine::new(config, Some(sp_credential()), registry(), store.clone()).unwrap();
        let idp = IdpEngine::new(idp_config(), idp_credential(), registry()).unwrap();
        Fixture { sp, idp, store }
    }

    fn fixture() -> Fixture {
        fixture_with(sp_config())
    }

    fn attributes() -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([("role".to_string(), vec!["admin".to_string(), "dev".to_string()])])
    }

    impl Fixture {
        fn login(&self) -> (LoginRequest, IssuedResponse) {
            let login = self.sp.begin_login_at(IDP_ID, Some("/home"), now()).unwrap();
            let received = self.idp.receive(&login.message.to_raw(), login.binding()).unwrap();
            let validated = self.idp.validate_at(received, now()).unwrap();
            let issued = self.idp.issue_at(validated, "alice", &attributes(), now()).unwrap();
            (login, issued)
        }
    }

    fn post_body(xml: &str) -> String {
        HttpPostBinding::encode(xml, SP_ACS, None, SamlMessageType::Response)
            .unwrap()
            .to_form_body()
    }

    #[test]
    fn begin_login_remembers_the_request() {
        let f = fixture();
        let login = f.sp.begin_login_at(IDP_ID, Some("/home"), now()).unwrap();
        assert_eq!(login.binding(), SamlBinding::HttpRedirect);
        assert_eq!(login.request.destination.as_deref(), Some(IDP_SSO));
        assert_eq!(login.request.assertion_consumer_service_url.as_deref(), Some(SP_ACS));
        assert!(login.message.to_raw().starts_with(IDP_SSO));
        assert!(f.store.is_pending(&login.request.id, now()));
        assert!(!login.message.to_raw().contains("Signature="));
    }

    #[test]
    fn begin_login_rejects_bad_input() {
        let f = fixture();
        assert!(matches!(
            f.sp.begin_login_at("https://nobody", None, now()),
            Err(SamlError::UnknownIssuer(_))
        ));
        let long = "x".repeat(81);
        assert!(matches!(
            f.sp.begin_login_at(IDP_ID, Some(&long), now()),
            Err(SamlError::MalformedMessage(_))
        ));
        assert_eq!(f.store.pending_len(), 0);
    }

    #[test]
    fn falls_back_to_post_and_signs_when_idp_wants_it() {
        let registry = MetadataRegistry::new();
        let mut idp = idp_descriptor();
        idp.endpoints.retain(|e| e.binding == SamlBinding::HttpPost);
        idp.want_authn_requests_signed = true;
        registry.register(idp).unwrap();
        let registry = Arc::new(registry);
        let store: Arc<dyn ReplayStore> = Arc::new(InMemoryReplayStore::new());

        let sp = SpEngine::new(sp_config(), Some(sp_credential()), registry.clone(), store.clone()).unwrap();
        let login = sp.begin_login_at(IDP_ID, None, now()).unwrap();
        assert_eq!(login.binding(), SamlBinding::HttpPost);
        let EncodedMessage::Post(form) = &login.message else {
            panic!("expected a POST form");
        };
        assert_eq!(form.action, IDP_SSO);

        let unsigned = SpEngine::new(sp_config(), None, registry, store).unwrap();
        assert!(matches!(
            unsigned.begin_login_at(IDP_ID, None, now()),
            Err(SamlError::ConfigurationError(_))
        ));
    }

    #[test]
    fn engine_setup_is_checked() {
        let store: Arc<dyn ReplayStore> = Arc::new(InMemoryReplayStore::new());
        let mut config = sp_config();
        config.authn_requests_signed = true;
        assert!(SpEngine::new(config, None, registry(), store.clone()).is_err());

        let only_sp = MetadataRegistry::new();
        only_sp.register(sp_descriptor()).unwrap();
        assert!(matches!(
            SpEngine::new(sp_config(), None, Arc::new(only_sp), store),
            Err(SamlError::ConfigurationError(_))
        ));
    }

    #[test]
    fn complete_login_yields_identity_once() {
        let f = fixture();
        let (login, issued) = f.login();
        let raw = issued.message.to_raw();

        let identity = f.sp.complete_login_at(&raw, SamlBinding::HttpPost, now()).unwrap();
        assert_eq!(identity.issuer, IDP_ID);
        assert_eq!(identity.in_response_to.as_deref(), Some(login.request.id.as_str()));
        assert_eq!(identity.relay_state.as_deref(), Some("/home"));
        assert_eq!(identity.attribute("role"), Some(&["admin".to_string(), "dev".to_string()][..]));
        assert!(identity.session_index.is_some());
        assert!(!f.store.is_pending(&login.request.id, now()));

        assert!(matches!(
            f.sp.complete_login_at(&raw, SamlBinding::HttpPost, now()),
            Err(SamlError::ReplayedResponse(_))
        ));
    }

    #[test]
    fn tampered_response_is_refused() {
        let f = fixture();
        let (login, issued) = f.login();
        let tampered = issued.xml.replace(">admin<", ">root<");
        assert_ne!(tampered, issued.xml);
        assert!(matches!(
            f.sp.complete_login_at(&post_body(&tampered), SamlBinding::HttpPost, now()),
            Err(SamlError::SignatureInvalid(_))
        ));
        assert!(f.store.is_pending(&login.request.id, now()));
        assert_eq!(f.store.consumed_len(), 0);
    }

    #[test]
    fn expired_response_is_refused() {
        let f = fixture();
        let (_, issued) = f.login();
        assert!(matches!(
            f.sp.complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, now() + Duration::minutes(10)),
            Err(SamlError::AssertionExpired)
        ));
    }

    #[test]
    fn response_to_unknown_request_is_unsolicited() {
        let f = fixture();
        let (login, issued) = f.login();
        f.store.consume_pending(&login.request.id, now()).unwrap();
        assert!(matches!(
            f.sp.complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, now()),
            Err(SamlError::UnsolicitedResponse(_))
        ));
    }

    #[test]
    fn idp_initiated_login_needs_opt_in() {
        let f = fixture();
        let issued = f.idp.issue_unsolicited_at(&f.sp.config().entity_id, "alice", &attributes(), Some("/x"), now()).unwrap();
        let raw = issued.message.to_raw();
        assert!(matches!(
            f.sp.complete_login_at(&raw, SamlBinding::HttpPost, now()),
            Err(SamlError::UnsolicitedResponse(_))
        ));

        let mut config = sp_config();
        config.allow_unsolicited = true;
        let f = fixture_with(config);
        let identity = f.sp.complete_login_at(&raw, SamlBinding::HttpPost, now()).unwrap();
        assert!(identity.in_response_to.is_none());
        assert_eq!(identity.relay_state.as_deref(), Some("/x"));
    }

    #[test]
    fn only_the_acs_binding_is_accepted() {
        let f = fixture();
        let (_, issued) = f.login();
        assert!(matches!(
            f.sp.complete_login_at(&issued.message.to_raw(), SamlBinding::HttpRedirect, now()),
            Err(SamlError::InvalidBinding(_))
        ));
    }

    #[test]
    fn failure_status_is_surfaced() {
        let f = fixture();
        let login = f.sp.begin_login_at(IDP_ID, None, now()).unwrap();
        let received = f.idp.receive(&login.message.to_raw(), login.binding()).unwrap();
        let validated = f.idp.validate_at(received, now()).unwrap();
        let error = SamlError::AuthenticationFailed("locked".into());
        let issued = f.idp.issue_failure_at(validated, &error, now()).unwrap();
        assert!(matches!(
            f.sp.complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, now()),
            Err(SamlError::StatusNotSuccess { status, .. }) if status.ends_with("AuthnFailed")
        ));
    }

    #[test]
    fn metadata_publishes_acs() {
        let f = fixture();
        let metadata = f.sp.metadata().unwrap();
        assert_eq!(metadata.default_acs().map(|e| e.location.as_str()), Some(SP_ACS));
        assert!(metadata.validate().is_ok());
    }
}
