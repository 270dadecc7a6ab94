//! Hostile and stale inputs: each must fail with its own error kind.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::Duration;
use saml_protocol::metadata::{Endpoint, EntityRole, ServiceType};
use saml_protocol::{EntityDescriptor, IdpEngine, ReplayStore, SamlBinding, SamlError};

use crate::common::{
    alice_attributes, generated_credential, idp_config, post_body, sp_config, sp_credential, t0,
    Federation, IDP_ID,
};

#[test]
fn replayed_response_is_rejected() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let (_, issued) = fed.login()?;
    let raw = issued.message.to_raw();

    fed.sp.complete_login_at(&raw, SamlBinding::HttpPost, t0())?;
    let replay = fed
        .sp
        .complete_login_at(&raw, SamlBinding::HttpPost, t0() + Duration::seconds(30));
    assert!(
        matches!(replay, Err(SamlError::ReplayedResponse(ref id)) if *id == issued.response.id),
        "second delivery must be a replay, got {replay:?}"
    );
    Ok(())
}

#[test]
fn altered_attribute_breaks_the_signature() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let (login, issued) = fed.login()?;
    let tampered = issued.xml.replace("alice@example.com", "mallory@example.com");
    assert_ne!(tampered, issued.xml, "fixture must contain the attribute value");

    let result = fed
        .sp
        .complete_login_at(&post_body(&tampered)?, SamlBinding::HttpPost, t0());
    assert!(
        matches!(result, Err(SamlError::SignatureInvalid(_))),
        "tampering must be detected, got {result:?}"
    );
    assert!(
        fed.store.is_pending(&login.request.id, t0()),
        "a rejected response must not consume the pending request"
    );
    Ok(())
}

#[test]
fn response_signed_by_unregistered_key_is_rejected() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let (rogue_credential, signing) = generated_credential("rogue.example.com")?;
    let mut rogue_config = idp_config();
    rogue_config.signing = signing;
    let rogue = IdpEngine::new(rogue_config, rogue_credential, Arc::clone(&fed.registry))?;

    let login = fed.sp.begin_login_at(IDP_ID, None, t0())?;
    let received = rogue.receive(&login.message.to_raw(), login.binding())?;
    let validated = rogue.validate_at(received, t0())?;
    let forged = rogue.issue_at(validated, "admin", &alice_attributes(), t0())?;

    let result = fed
        .sp
        .complete_login_at(&forged.message.to_raw(), SamlBinding::HttpPost, t0());
    assert!(
        matches!(result, Err(SamlError::SignatureInvalid(_))),
        "only the registered certificate is trusted, got {result:?}"
    );
    Ok(())
}

#[test]
fn unsigned_response_is_rejected_when_signature_is_wanted() -> anyhow::Result<()> {
    let mut idp = idp_config();
    idp.sign_responses = false;
    let fed = Federation::with(idp, sp_config())?;
    let (_, issued) = fed.login()?;
    let result = fed
        .sp
        .complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, t0());
    assert!(matches!(result, Err(SamlError::SignatureInvalid(_))), "got {result:?}");

    let mut relaxed = sp_config();
    relaxed.want_response_signed = false;
    let mut idp = idp_config();
    idp.sign_responses = false;
    let fed = Federation::with(idp, relaxed)?;
    let (_, issued) = fed.login()?;
    fed.sp
        .complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, t0())?;
    Ok(())
}

#[test]
fn duplicated_assertion_is_rejected() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let (_, issued) = fed.login()?;
    let start = issued.xml.find("<saml:Assertion").expect("assertion start");
    let end = issued.xml.find("</saml:Assertion>").expect("assertion end") + "</saml:Assertion>".len();
    let assertion = &issued.xml[start..end];
    let wrapped = format!("{}{}{}", &issued.xml[..end], assertion, &issued.xml[end..]);

    let result = fed
        .sp
        .complete_login_at(&post_body(&wrapped)?, SamlBinding::HttpPost, t0());
    assert!(
        matches!(result, Err(SamlError::MalformedMessage(_))),
        "duplicate IDs must be refused before any signature is trusted, got {result:?}"
    );
    Ok(())
}

#[test]
fn expired_response_is_rejected() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let (_, issued) = fed.login()?;
    let late = t0() + Duration::minutes(15);
    let result = fed
        .sp
        .complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, late);
    assert!(matches!(result, Err(SamlError::AssertionExpired)), "got {result:?}");
    Ok(())
}

#[test]
fn response_after_pending_request_expired_is_unsolicited() -> anyhow::Result<()> {
    let mut sp = sp_config();
    sp.request_lifetime_seconds = 60;
    let fed = Federation::with(idp_config(), sp)?;
    let (_, issued) = fed.login()?;
    let result = fed.sp.complete_login_at(
        &issued.message.to_raw(),
        SamlBinding::HttpPost,
        t0() + Duration::seconds(120),
    );
    assert!(matches!(result, Err(SamlError::UnsolicitedResponse(_))), "got {result:?}");
    Ok(())
}

#[test]
fn response_meant_for_another_sp_is_rejected() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let other = EntityDescriptor::new(
        "https://other.example.com",
        EntityRole::Sp,
        sp_credential().certificate().clone(),
    )
    .with_endpoint(Endpoint::new(
        ServiceType::AssertionConsumer,
        "https://other.example.com/acs",
        SamlBinding::HttpPost,
    ));
    fed.registry.register(other)?;

    let issued = fed.idp.issue_unsolicited_at(
        "https://other.example.com",
        "alice",
        &alice_attributes(),
        None,
        t0(),
    )?;
    let result = fed
        .sp
        .complete_login_at(&issued.message.to_raw(), SamlBinding::HttpPost, t0());
    assert!(
        matches!(result, Err(SamlError::DestinationMismatch { .. })),
        "got {result:?}"
    );
    Ok(())
}

#[test]
fn request_for_unregistered_sp_is_rejected() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let mut sp = sp_config();
    sp.entity_id = "https://stranger.example.com".into();
    let stranger = Federation::with(idp_config(), sp)?;

    let login = stranger.sp.begin_login_at(IDP_ID, None, t0())?;
    let received = fed.idp.receive(&login.message.to_raw(), login.binding())?;
    let result = fed.idp.validate_at(received, t0());
    assert!(matches!(result, Err(SamlError::UnknownIssuer(_))), "got {result:?}");
    Ok(())
}

#[test]
fn oversized_message_is_rejected_before_decoding() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let body = format!("SAMLResponse={}", "A".repeat(512 * 1024));
    let result = fed.sp.complete_login_at(&body, SamlBinding::HttpPost, t0());
    assert!(matches!(result, Err(SamlError::MalformedMessage(_))), "got {result:?}");
    Ok(())
}

#[test]
fn concurrent_deliveries_accept_exactly_one() -> anyhow::Result<()> {
    let fed = Arc::new(Federation::new()?);
    let (_, issued) = fed.login()?;
    let raw = Arc::new(issued.message.to_raw());
    let accepted = Arc::new(AtomicUsize::new(0));
    let replayed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let (fed, raw) = (Arc::clone(&fed), Arc::clone(&raw));
            let (accepted, replayed) = (Arc::clone(&accepted), Arc::clone(&replayed));
            thread::spawn(move || match fed.sp.complete_login_at(&raw, SamlBinding::HttpPost, t0()) {
                Ok(_) => accepted.fetch_add(1, Ordering::SeqCst),
                Err(SamlError::ReplayedResponse(_)) => replayed.fetch_add(1, Ordering::SeqCst),
                Err(e) => panic!("unexpected error {e}"),
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }
    assert_eq!(accepted.load(Ordering::SeqCst), 1, "exactly one delivery wins");
    assert_eq!(replayed.load(Ordering::SeqCst), 7);
    Ok(())
}

#[test]
fn pending_requests_are_independent() -> anyhow::Result<()> {
    let fed = Federation::new()?;
    let (first_login, first) = fed.login()?;
    let (second_login, second) = fed.login()?;
    assert_ne!(first_login.request.id, second_login.request.id);

    let identity = fed
        .sp
        .complete_login_at(&second.message.to_raw(), SamlBinding::HttpPost, t0())?;
    assert_eq!(identity.in_response_to.as_deref(), Some(second_login.request.id.as_str()));
    assert!(fed.store.is_pending(&first_login.request.id, t0()));
    fed.sp
        .complete_login_at(&first.message.to_raw(), SamlBinding::HttpPost, t0())?;
    Ok(())
}
