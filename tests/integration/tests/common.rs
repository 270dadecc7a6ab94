//! Common test utilities and fixtures.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use saml_protocol::bindings::{HttpPostBinding, SamlMessageType};
use saml_protocol::signature::{SignatureAlgorithm, SignatureConfig};
use saml_protocol::{
    IdpConfig, IdpEngine, InMemoryReplayStore, IssuedResponse, LoginRequest, MetadataRegistry,
    SigningCredential, SpConfig, SpEngine,
};

pub const IDP_ID: &str = "https://idp1.example.com";
pub const IDP_SSO: &str = "https://idp1.example.com/saml/sso";
pub const SP_ID: &str = "https://app.example.com";
pub const SP_ACS: &str = "https://app.example.com/saml/acs";

const IDP_KEY: &str = include_str!("../../../fixtures/pki/idp.key");
const IDP_CERT: &str = include_str!("../../../fixtures/pki/idp.crt");
const SP_KEY: &str = include_str!("../../../fixtures/pki/sp.key");
const SP_CERT: &str = include_str!("../../../fixtures/pki/sp.crt");

/// Fixed clock for every scenario.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("saml_protocol=debug")
        .with_test_writer()
        .try_init();
}

pub fn idp_credential() -> SigningCredential {
    SigningCredential::from_pem(IDP_KEY, IDP_CERT).unwrap()
}

pub fn sp_credential() -> SigningCredential {
    SigningCredential::from_pem(SP_KEY, SP_CERT).unwrap()
}

/// A throwaway ECDSA P-256 credential from `rcgen`.
pub fn generated_credential(name: &str) -> anyhow::Result<(SigningCredential, SignatureConfig)> {
    let generated = rcgen::generate_simple_self_signed(vec![name.to_string()])?;
    let credential =
        SigningCredential::from_pem(&generated.signing_key.serialize_pem(), &generated.cert.pem())?;
    Ok((credential, SignatureConfig::with_algorithm(SignatureAlgorithm::EcdsaSha256)))
}

pub fn idp_config() -> IdpConfig {
    IdpConfig::new(IDP_ID, IDP_SSO)
}

pub fn sp_config() -> SpConfig {
    SpConfig::new(SP_ID, SP_ACS)
}

pub fn alice_attributes() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        ("mail".to_string(), vec!["alice@example.com".to_string()]),
        ("groups".to_string(), vec!["staff".to_string(), "admins".to_string()]),
    ])
}

/// One IdP and one SP that trust each other.
pub struct Federation {
    pub idp: IdpEngine,
    pub sp: SpEngine,
    pub registry: Arc<MetadataRegistry>,
    pub store: Arc<InMemoryReplayStore>,
}

impl Federation {
    pub fn new() -> anyhow::Result<Self> {
        Self::with(idp_config(), sp_config())
    }

    /// Builds both engines, registering each side's published metadata.
    pub fn with(idp_config: IdpConfig, sp_config: SpConfig) -> anyhow::Result<Self> {
        init_tracing();
        let idp_credential = idp_credential();
        let sp_credential = sp_credential();

        let registry = Arc::new(MetadataRegistry::new());
        registry.register(idp_config.descriptor(idp_credential.certificate().clone()))?;
        registry.register(sp_config.descriptor(sp_credential.certificate().clone()))?;

        let store = Arc::new(InMemoryReplayStore::new());
        let idp = IdpEngine::new(idp_config, idp_credential, Arc::clone(&registry))?;
        let sp = SpEngine::new(sp_config, Some(sp_credential), Arc::clone(&registry), store.clone())?;
        Ok(Self {
            idp,
            sp,
            registry,
            store,
        })
    }

    /// Runs an SP-initiated login for `user` up to the issued response.
    pub fn login_as(
        &self,
        user: &str,
        attributes: &BTreeMap<String, Vec<String>>,
        relay_state: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<(LoginRequest, IssuedResponse)> {
        let login = self.sp.begin_login_at(IDP_ID, relay_state, now)?;
        let received = self.idp.receive(&login.message.to_raw(), login.binding())?;
        let validated = self.idp.validate_at(received, now)?;
        let issued = self.idp.issue_at(validated, user, attributes, now)?;
        Ok((login, issued))
    }

    pub fn login(&self) -> anyhow::Result<(LoginRequest, IssuedResponse)> {
        self.login_as("alice", &alice_attributes(), Some("/dashboard"), t0())
    }
}

/// Wraps a (possibly altered) Response document in a fresh POST body.
pub fn post_body(xml: &str) -> anyhow::Result<String> {
    Ok(HttpPostBinding::encode(xml, SP_ACS, None, SamlMessageType::Response)?.to_form_body())
}
