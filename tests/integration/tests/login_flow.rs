//! Complete Web Browser SSO round trips.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use saml_protocol::{
    IdpEngine, MetadataRegistry, NameIdFormat, SamlBinding, SamlError, SpEngine,
};

use crate::common::{
    alice_attributes, generated_credential, idp_config, sp_config, sp_credential, t0, Federation,
    IDP_ID, SP_ACS,
};

#[test]
fn sp_initiated_login_over_redirect() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let (login, issued) = fed.login()?;
    assert_eq!(login.binding(), SamlBinding::HttpRedirect, "redirect is the default request binding");

    let identity = fed
        .sp
        .complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, t0())?;

    assert_eq!(identity.issuer, IDP_ID);
    assert_eq!(identity.in_response_to.as_deref(), Some(login.request.id.as_str()));
    assert_eq!(identity.relay_state.as_deref(), Some("/dashboard"));
    assert_eq!(identity.first("mail"), Some("alice@example.com"));
    assert_eq!(
        identity.attribute("groups").map(<[String]>::len),
        Some(2),
        "multi-valued attributes keep every value"
    );
    assert_eq!(
        identity.name_id.format.as_deref(),
        Some(NameIdFormat::Transient.uri()),
        "transient is the IdP default"
    );
    assert!(identity.session_index.is_some(), "AuthnStatement carries a session index");
    assert_eq!(identity.authn_instant, Some(t0()));
    assert_eq!(fed.store.pending_len(), 0, "pending request was consumed");
    Ok(())
}

#[test]
fn sp_initiated_login_over_post() -> anyhow::Result<()> {
    let mut sp = sp_config();
    sp.preferred_sso_binding = SamlBinding::HttpPost;
    let fed = Federation::with(idp_config(), sp)?;
    let (login, issued) = fed.login()?;
    assert_eq!(login.binding(), SamlBinding::HttpPost);

    let identity = fed
        .sp
        .complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, t0())?;
    assert_eq!(identity.relay_state.as_deref(), Some("/dashboard"));
    Ok(())
}

#[test]
fn signed_requests_on_both_bindings() -> anyhow::Result<()> {
    for binding in [SamlBinding::HttpRedirect, SamlBinding::HttpPost] {
        let mut idp = idp_config();
        idp.want_authn_requests_signed = true;
        let mut sp = sp_config();
        sp.authn_requests_signed = true;
        sp.preferred_sso_binding = binding;
        let fed = Federation::with(idp, sp)?;

        let login = fed.sp.begin_login_at(IDP_ID, None, t0())?;
        let received = fed.idp.receive(&login.message.to_raw(), binding)?;
        let validated = fed.idp.validate_at(received, t0())?;
        assert!(validated.is_signed(), "{binding} request should carry a verified signature");
    }
    Ok(())
}

#[test]
fn idp_initiated_login_requires_opt_in() -> anyhow::Result<()> {
    let mut sp = sp_config();
    sp.allow_unsolicited = true;
    let fed = Federation::with(idp_config(), sp)?;

    let issued = fed
        .idp
        .issue_unsolicited_at(&fed.sp.config().entity_id, "alice", &alice_attributes(), Some("/reports"), t0())?;
    let identity = fed
        .sp
        .complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, t0())?;
    assert!(identity.in_response_to.is_none());
    assert_eq!(identity.relay_state.as_deref(), Some("/reports"));

    let strict = Federation::new()?;
    let issued = strict
        .idp
        .issue_unsolicited_at(&strict.sp.config().entity_id, "alice", &alice_attributes(), None, t0())?;
    let result = strict
        .sp
        .complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, t0());
    assert!(
        matches!(result, Err(SamlError::UnsolicitedResponse(_))),
        "unsolicited responses are refused by default, got {result:?}"
    );
    Ok(())
}

#[test]
fn persistent_name_id_is_stable_per_user() -> anyhow::Result<()> {
    let mut idp = idp_config();
    idp.name_id_formats = vec![NameIdFormat::Persistent, NameIdFormat::Transient];
    idp.persistent_id_secret = Some("integration-secret".into());
    let mut sp = sp_config();
    sp.name_id_format = NameIdFormat::Persistent;
    let fed = Federation::with(idp, sp)?;

    let mut seen = Vec::new();
    for user in ["alice", "alice", "bob"] {
        let (_, issued) = fed.login_as(user, &BTreeMap::new(), None, t0())?;
        let identity = fed
            .sp
            .complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, t0())?;
        seen.push(identity.name_id.value);
    }
    assert_eq!(seen[0], seen[1], "same user, same pseudonym");
    assert_ne!(seen[0], seen[2], "different users, different pseudonyms");
    assert!(!seen[0].contains("alice"), "pseudonym must not reveal the user");
    Ok(())
}

#[test]
fn failure_response_surfaces_status() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let login = fed.sp.begin_login_at(IDP_ID, None, t0())?;
    let received = fed.idp.receive(&login.message.to_raw(), login.binding())?;
    let validated = fed.idp.validate_at(received, t0())?;
    let issued = fed.idp.issue_failure_at(
        validated,
        &SamlError::AuthenticationFailed("wrong password".into()),
        t0(),
    )?;

    let result = fed
        .sp
        .complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, t0());
    match result {
        Err(SamlError::StatusNotSuccess { status, message }) => {
            assert!(status.ends_with(":AuthnFailed"), "unexpected status {status}");
            assert!(message.contains("wrong password"));
        }
        other => panic!("expected StatusNotSuccess, got {other:?}"),
    }
    Ok(())
}

#[test]
fn ecdsa_keys_work_end_to_end() -> anyhow::Result<()> {
    let (idp_credential, signing) = generated_credential("idp1.example.com")?;
    let mut idp = idp_config();
    idp.signing = signing;

    let registry = Arc::new(MetadataRegistry::new());
    registry.register(idp.descriptor(idp_credential.certificate().clone()))?;
    let sp = sp_config();
    registry.register(sp.descriptor(sp_credential().certificate().clone()))?;

    let idp_engine = IdpEngine::new(idp, idp_credential, Arc::clone(&registry))?;
    let sp_engine = SpEngine::new(
        sp,
        None,
        registry,
        Arc::new(saml_protocol::InMemoryReplayStore::new()),
    )?;

    let login = sp_engine.begin_login_at(IDP_ID, None, t0())?;
    let received = idp_engine.receive(&login.message.to_raw(), login.binding())?;
    let validated = idp_engine.validate_at(received, t0())?;
    assert_eq!(validated.acs_url(), SP_ACS);
    let issued = idp_engine.issue_at(validated, "alice", &alice_attributes(), t0() + Duration::seconds(2))?;
    let identity = sp_engine.complete_login_at(
        &issued.message.to_raw(),
        SamlBinding::HttpPost,
        t0() + Duration::seconds(3),
    )?;
    assert_eq!(identity.first("mail"), Some("alice@example.com"));
    Ok(())
}
