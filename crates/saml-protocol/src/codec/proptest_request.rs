//! Property-based round trips of AuthnRequests over both bindings.

use chrono::{DateTime, Utc};
use proptest::prelude::*;

use super::MessageCodec;
use crate::types::{AuthnRequest, NameIdFormat, NameIdPolicy, SamlBinding, SAML_VERSION};

/// `xs:ID` values as `generate_id` and foreign SPs produce them.
fn id() -> impl Strategy<Value = String> {
    "[_A-Za-z][A-Za-z0-9._-]{0,40}"
}

/// URIs with the characters XML must escape. Leading and trailing spaces
/// are left out because element text is trimmed on parse.
fn uri() -> impl Strategy<Value = String> {
    "[a-z]{2,6}:[A-Za-z0-9/?=.&<>\"'%#-]{1,40}"
}

/// The endpoint the Redirect URL is built on; always present since a
/// request cannot be encoded without it.
fn destination() -> impl Strategy<Value = String> {
    "https://[a-z]{1,12}\\.example(/[a-z0-9]{1,8}){0,3}"
}

/// Instants between 1970 and 2100 with arbitrary sub-second parts.
fn instant() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800, 0u32..1_000_000_000)
        .prop_map(|(secs, nanos)| DateTime::from_timestamp(secs, nanos).unwrap())
}

fn name_id_policy() -> impl Strategy<Value = NameIdPolicy> {
    (
        prop::option::of(prop::sample::select(vec![
            NameIdFormat::Unspecified,
            NameIdFormat::Email,
            NameIdFormat::Persistent,
            NameIdFormat::Transient,
        ])),
        prop::option::of(uri()),
        any::<bool>(),
    )
        .prop_map(|(format, sp_name_qualifier, allow_create)| NameIdPolicy {
            format: format.map(|f| f.uri().to_string()),
            sp_name_qualifier,
            allow_create,
        })
}

fn authn_request() -> impl Strategy<Value = AuthnRequest> {
    (
        (id(), uri(), instant()),
        (
            destination(),
            prop::option::of(uri()),
            prop::option::of(prop::sample::select(vec![
                SamlBinding::HttpPost,
                SamlBinding::HttpRedirect,
            ])),
        ),
        (
            prop::option::of(name_id_policy()),
            any::<bool>(),
            any::<bool>(),
            prop::option::of("[A-Za-z][A-Za-z0-9 &<>\"']{0,30}"),
        ),
    )
        .prop_map(
            |(
                (id, issuer, issue_instant),
                (destination, acs_url, binding),
                (name_id_policy, force_authn, is_passive, provider_name),
            )| AuthnRequest {
                id,
                version: SAML_VERSION.to_string(),
                issue_instant,
                issuer,
                destination: Some(destination),
                assertion_consumer_service_url: acs_url,
                protocol_binding: binding.map(|b| b.uri().to_string()),
                name_id_policy,
                force_authn,
                is_passive,
                provider_name,
            },
        )
}

proptest! {
    /// Every valid request decodes to itself on both bindings.
    #[test]
    fn prop_requests_survive_both_bindings(request in authn_request()) {
        prop_assert!(request.validate().is_ok());
        let codec = MessageCodec::default();
        for binding in [SamlBinding::HttpRedirect, SamlBinding::HttpPost] {
            let encoded = codec.encode_request(&request, binding, None, None).unwrap();
            let (decoded, _) = codec.decode_authn_request(&encoded.to_raw(), binding).unwrap();
            prop_assert_eq!(&decoded, &request);
        }
    }
}
