//! Trust established from published metadata documents.

use std::sync::Arc;

use saml_protocol::metadata::serialize_metadata;
use saml_protocol::{
    IdpEngine, InMemoryReplayStore, MetadataRegistry, SamlBinding, SamlError, SpEngine,
};

use crate::common::{
    alice_attributes, idp_config, idp_credential, sp_config, sp_credential, t0, Federation, IDP_ID,
    SP_ID,
};

fn entities_document(members: &[String]) -> String {
    format!(
        r#"<md:EntitiesDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata">{}</md:EntitiesDescriptor>"#,
        members.concat()
    )
}

#[test]
fn published_metadata_is_enough_to_federate() -> anyhow::Result<()> {
    let publisher = Federation::new()?;
    let idp_xml = serialize_metadata(&publisher.idp.metadata())?;
    let sp_xml = serialize_metadata(&publisher.sp.metadata()?)?;

    let registry = Arc::new(MetadataRegistry::new());
    let loaded = registry.load(entities_document(&[idp_xml, sp_xml]).as_bytes())?;
    assert_eq!(loaded, vec![IDP_ID.to_string(), SP_ID.to_string()]);

    let idp = IdpEngine::new(idp_config(), idp_credential(), Arc::clone(&registry))?;
    let sp = SpEngine::new(
        sp_config(),
        Some(sp_credential()),
        registry,
        Arc::new(InMemoryReplayStore::new()),
    )?;

    let login = sp.begin_login_at(IDP_ID, Some("/home"), t0())?;
    let received = idp.receive(&login.message.to_raw(), login.binding())?;
    let validated = idp.validate_at(received, t0())?;
    let issued = idp.issue_at(validated, "alice", &alice_attributes(), t0())?;
    let identity = sp.complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, t0())?;
    assert_eq!(identity.issuer, IDP_ID);
    assert_eq!(identity.relay_state.as_deref(), Some("/home"));
    Ok(())
}

#[test]
fn published_metadata_survives_a_reparse() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let published = fed.idp.metadata();
    let registry = MetadataRegistry::new();
    registry.load(serialize_metadata(&published)?.as_bytes())?;

    let parsed = registry.lookup(IDP_ID).expect("IdP registered");
    assert_eq!(parsed.entity_id, published.entity_id);
    assert_eq!(parsed.endpoints, published.endpoints);
    assert_eq!(parsed.name_id_formats, published.name_id_formats);
    assert_eq!(
        parsed.signing_certificate.der(),
        published.signing_certificate.der()
    );
    Ok(())
}

#[test]
fn invalid_member_leaves_registry_untouched() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let idp_xml = serialize_metadata(&fed.idp.metadata())?;
    let broken = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://broken.example.com"/>"#;

    let registry = MetadataRegistry::new();
    let result = registry.load(entities_document(&[idp_xml, broken.to_string()]).as_bytes());
    assert!(matches!(result, Err(SamlError::MalformedMetadata(_))), "got {result:?}");
    assert!(registry.is_empty(), "a failed load must register nothing");
    Ok(())
}

#[test]
fn reloading_a_known_entity_is_refused() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let idp_xml = serialize_metadata(&fed.idp.metadata())?;
    let result = fed.registry.load(idp_xml.as_bytes());
    assert!(matches!(result, Err(SamlError::ConfigurationError(_))), "got {result:?}");
    Ok(())
}
