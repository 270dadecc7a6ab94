//! Namespaces, binding URIs, NameID formats and algorithm identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const SAML_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
pub const SAMLP_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
pub const MD_NS: &str = "urn:oasis:names:tc:SAML:2.0:metadata";
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Value of every `Version` attribute written or accepted.
pub const SAML_VERSION: &str = "2.0";

const BINDING_PREFIX: &str = "urn:oasis:names:tc:SAML:2.0:bindings:";

/// Transport binding of a SAML message.
///
/// Artifact and SOAP are named so that metadata and configuration can refuse
/// them with a precise error; no message travels over them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamlBinding {
    HttpPost,
    HttpRedirect,
    HttpArtifact,
    Soap,
}

impl SamlBinding {
    const ALL: [Self; 4] = [
        Self::HttpPost,
        Self::HttpRedirect,
        Self::HttpArtifact,
        Self::Soap,
    ];

    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::HttpPost => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST",
            Self::HttpRedirect => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect",
            Self::HttpArtifact => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Artifact",
            Self::Soap => "urn:oasis:names:tc:SAML:2.0:bindings:SOAP",
        }
    }

    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        if !uri.starts_with(BINDING_PREFIX) {
            return None;
        }
        Self::ALL.into_iter().find(|b| b.uri() == uri)
    }

    /// POST and Redirect: the two bindings a browser carries.
    #[must_use]
    pub const fn is_front_channel(&self) -> bool {
        matches!(self, Self::HttpPost | Self::HttpRedirect)
    }
}

impl fmt::Display for SamlBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// NameID formats an IdP may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NameIdFormat {
    /// No preference; the IdP picks.
    #[default]
    Unspecified,
    Email,
    /// Opaque, stable per (IdP, SP, subject).
    Persistent,
    /// Opaque, fresh on every assertion.
    Transient,
}

impl NameIdFormat {
    const ALL: [Self; 4] = [
        Self::Unspecified,
        Self::Email,
        Self::Persistent,
        Self::Transient,
    ];

    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Unspecified => "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified",
            Self::Email => "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress",
            Self::Persistent => "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent",
            Self::Transient => "urn:oasis:names:tc:SAML:2.0:nameid-format:transient",
        }
    }

    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.uri() == uri)
    }
}

/// `AuthnContextClassRef` values the IdP can be configured to assert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthnContextClass {
    Unspecified,
    Password,
    PasswordProtectedTransport,
    X509,
}

impl AuthnContextClass {
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Unspecified => "urn:oasis:names:tc:SAML:2.0:ac:classes:unspecified",
            Self::Password => "urn:oasis:names:tc:SAML:2.0:ac:classes:Password",
            Self::PasswordProtectedTransport => {
                "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport"
            }
            Self::X509 => "urn:oasis:names:tc:SAML:2.0:ac:classes:X509",
        }
    }
}

/// Top-level `StatusCode` values.
pub mod status_codes {
    pub const SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
    /// The requester (the SP) is at fault.
    pub const REQUESTER: &str = "urn:oasis:names:tc:SAML:2.0:status:Requester";
    /// The responder (the IdP) is at fault.
    pub const RESPONDER: &str = "urn:oasis:names:tc:SAML:2.0:status:Responder";
}

/// Second-level `StatusCode` values used in failure responses.
pub mod sub_status_codes {
    pub const AUTHN_FAILED: &str = "urn:oasis:names:tc:SAML:2.0:status:AuthnFailed";
    pub const INVALID_NAMEID_POLICY: &str = "urn:oasis:names:tc:SAML:2.0:status:InvalidNameIDPolicy";
    pub const REQUEST_DENIED: &str = "urn:oasis:names:tc:SAML:2.0:status:RequestDenied";
    pub const UNSUPPORTED_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:status:UnsupportedBinding";
}

/// `SignatureMethod` and `SigAlg` URIs. SHA-1 variants are deliberately absent.
pub mod signature_algorithms {
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
    pub const RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
    pub const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";
    pub const ECDSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";
    pub const ECDSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha384";
}

/// `DigestMethod` URIs.
pub mod digest_algorithms {
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
    pub const SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
    pub const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";
}

/// Transform and `CanonicalizationMethod` URIs.
pub mod canonicalization_algorithms {
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    pub const EXCLUSIVE_C14N_WITH_COMMENTS: &str =
        "http://www.w3.org/2001/10/xml-exc-c14n#WithComments";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_binding_is_found_by_its_uri() {
        for binding in SamlBinding::ALL {
            assert_eq!(SamlBinding::from_uri(binding.uri()), Some(binding));
        }
        assert_eq!(SamlBinding::from_uri("urn:oasis:names:tc:SAML:2.0:bindings:PAOS"), None);
        assert_eq!(SamlBinding::from_uri("HTTP-POST"), None);
    }

    #[test]
    fn only_browser_bindings_are_front_channel() {
        let front: Vec<_> = SamlBinding::ALL
            .into_iter()
            .filter(SamlBinding::is_front_channel)
            .collect();
        assert_eq!(front, [SamlBinding::HttpPost, SamlBinding::HttpRedirect]);
    }

    #[test]
    fn configuration_names_are_kebab_case() {
        let parsed: SamlBinding = serde_json::from_str("\"http-redirect\"").unwrap();
        assert_eq!(parsed, SamlBinding::HttpRedirect);
        let parsed: NameIdFormat = serde_json::from_str("\"persistent\"").unwrap();
        assert_eq!(parsed, NameIdFormat::Persistent);
        let parsed: AuthnContextClass =
            serde_json::from_str("\"password-protected-transport\"").unwrap();
        assert_eq!(parsed, AuthnContextClass::PasswordProtectedTransport);
    }

    #[test]
    fn name_id_formats_mix_saml_versions() {
        assert!(NameIdFormat::Email.uri().contains(":1.1:"));
        assert!(NameIdFormat::Transient.uri().contains(":2.0:"));
        assert_eq!(
            NameIdFormat::from_uri("urn:oasis:names:tc:SAML:2.0:nameid-format:entity"),
            None
        );
    }
}
