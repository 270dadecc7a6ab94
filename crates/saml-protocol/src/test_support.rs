//! Fixtures shared by the engine unit tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use saml_crypto::Certificate;

use crate::config::{IdpConfig, SpConfig};
use crate::metadata::{Endpoint, EntityDescriptor, EntityRole, MetadataRegistry, ServiceType};
use crate::signature::SigningCredential;
use crate::types::SamlBinding;

pub(crate) const IDP_KEY: &str = include_str!("../../../fixtures/pki/idp.key");
pub(crate) const IDP_CERT: &str = include_str!("../../../fixtures/pki/idp.crt");
pub(crate) const SP_KEY: &str = include_str!("../../../fixtures/pki/sp.key");
pub(crate) const SP_CERT: &str = include_str!("../../../fixtures/pki/sp.crt");

pub(crate) const IDP_ID: &str = "https://idp.example.com";
pub(crate) const IDP_SSO: &str = "https://idp.example.com/sso";
pub(crate) const SP_ID: &str = "https://sp.example.com";
pub(crate) const SP_ACS: &str = "https://sp.example.com/acs";

pub(crate) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub(crate) fn idp_credential() -> SigningCredential {
    SigningCredential::from_pem(IDP_KEY, IDP_CERT).unwrap()
}

pub(crate) fn sp_credential() -> SigningCredential {
    SigningCredential::from_pem(SP_KEY, SP_CERT).unwrap()
}

pub(crate) fn idp_config() -> IdpConfig {
    IdpConfig::new(IDP_ID, IDP_SSO)
}

pub(crate) fn sp_config() -> SpConfig {
    SpConfig::new(SP_ID, SP_ACS)
}

pub(crate) fn idp_descriptor() -> EntityDescriptor {
    let cert = Certificate::from_pem(IDP_CERT).unwrap();
    EntityDescriptor::new(IDP_ID, EntityRole::Idp, cert)
        .with_endpoint(Endpoint::new(
            ServiceType::SingleSignOn,
            IDP_SSO,
            SamlBinding::HttpRedirect,
        ))
        .with_endpoint(Endpoint::new(ServiceType::SingleSignOn, IDP_SSO, SamlBinding::HttpPost))
}

pub(crate) fn sp_descriptor() -> EntityDescriptor {
    let cert = Certificate::from_pem(SP_CERT).unwrap();
    let mut sp = EntityDescriptor::new(SP_ID, EntityRole::Sp, cert).with_endpoint(Endpoint {
        index: Some(0),
        is_default: true,
        ..Endpoint::new(ServiceType::AssertionConsumer, SP_ACS, SamlBinding::HttpPost)
    });
    sp.want_assertions_signed = true;
    sp
}

/// A registry knowing both fixture peers.
pub(crate) fn registry() -> Arc<MetadataRegistry> {
    let registry = MetadataRegistry::new();
    registry.register(idp_descriptor()).unwrap();
    registry.register(sp_descriptor()).unwrap();
    Arc::new(registry)
}
