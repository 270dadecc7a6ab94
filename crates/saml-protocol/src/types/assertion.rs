//! `saml:Assertion` and the statements it carries.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{NameId, SAML_VERSION};
use crate::xml::truncate_to_seconds;

/// Statements an IdP makes about one subject.
///
/// Built by the IdP engine, immutable once signed. On the SP side `signed`
/// records whether an enveloped signature directly on this element verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub issue_instant: DateTime<Utc>,
    /// Entity ID of the issuing IdP.
    pub issuer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_statement: Option<AuthnStatement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_statement: Option<AttributeStatement>,
    #[serde(skip)]
    pub signed: bool,
}

fn default_version() -> String {
    SAML_VERSION.to_string()
}

impl Assertion {
    /// Starts an empty assertion with a fresh ID; instants are kept at
    /// whole seconds.
    #[must_use]
    pub fn new(issuer: impl Into<String>, issue_instant: DateTime<Utc>) -> Self {
        Self {
            id: saml_crypto::generate_id(),
            version: default_version(),
            issue_instant: truncate_to_seconds(issue_instant),
            issuer: issuer.into(),
            subject: None,
            conditions: None,
            authn_statement: None,
            attribute_statement: None,
            signed: false,
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    #[must_use]
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    #[must_use]
    pub fn with_authn_statement(mut self, statement: AuthnStatement) -> Self {
        self.authn_statement = Some(statement);
        self
    }

    #[must_use]
    pub fn with_attribute_statement(mut self, statement: AttributeStatement) -> Self {
        self.attribute_statement = Some(statement);
        self
    }

    #[must_use]
    pub fn name_id(&self) -> Option<&NameId> {
        self.subject.as_ref().and_then(|s| s.name_id.as_ref())
    }

    /// The earlier of `Conditions/@NotOnOrAfter` and the bearer
    /// confirmation's `NotOnOrAfter`.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let conditions = self.conditions.as_ref().and_then(|c| c.not_on_or_after);
        let confirmation = self
            .subject
            .as_ref()
            .and_then(Subject::bearer_confirmation_data)
            .and_then(|d| d.not_on_or_after);
        [conditions, confirmation].into_iter().flatten().min()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id: Option<NameId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    #[must_use]
    pub fn new(name_id: NameId) -> Self {
        Self {
            name_id: Some(name_id),
            subject_confirmations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_confirmation(mut self, confirmation: SubjectConfirmation) -> Self {
        self.subject_confirmations.push(confirmation);
        self
    }

    /// Data of the first bearer confirmation; other methods are ignored.
    #[must_use]
    pub fn bearer_confirmation_data(&self) -> Option<&SubjectConfirmationData> {
        self.subject_confirmations
            .iter()
            .find(|c| c.method == SubjectConfirmation::BEARER)
            .and_then(|c| c.subject_confirmation_data.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// Confirmation method URI.
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_confirmation_data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    pub const BEARER: &'static str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";

    #[must_use]
    pub fn bearer(data: SubjectConfirmationData) -> Self {
        Self {
            method: Self::BEARER.to_string(),
            subject_confirmation_data: Some(data),
        }
    }
}

/// Where, until when and in answer to what the bearer may present the
/// assertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmationData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// ACS URL the assertion is delivered to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl SubjectConfirmationData {
    #[must_use]
    pub fn for_request(
        request_id: Option<String>,
        recipient: impl Into<String>,
        not_on_or_after: DateTime<Utc>,
    ) -> Self {
        Self {
            in_response_to: request_id,
            recipient: Some(recipient.into()),
            not_on_or_after: Some(truncate_to_seconds(not_on_or_after)),
        }
    }
}

/// Validity window and audiences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Every restriction must name the consuming SP.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audience_restrictions: Vec<AudienceRestriction>,
}

impl Conditions {
    /// Window `[now - skew, now + lifetime)` with no audience yet.
    #[must_use]
    pub fn with_validity(now: DateTime<Utc>, skew: Duration, lifetime: Duration) -> Self {
        Self {
            not_before: Some(truncate_to_seconds(now - skew)),
            not_on_or_after: Some(truncate_to_seconds(now + lifetime)),
            audience_restrictions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience_restrictions.push(AudienceRestriction {
            audiences: vec![audience.into()],
        });
        self
    }
}

/// Satisfied when any one of `audiences` matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceRestriction {
    pub audiences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnStatement {
    pub authn_instant: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_not_on_or_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_context_class_ref: Option<String>,
}

impl AuthnStatement {
    /// A statement with a fresh random session index.
    #[must_use]
    pub fn new(context_class_ref: impl Into<String>, authn_instant: DateTime<Utc>) -> Self {
        Self {
            authn_instant: truncate_to_seconds(authn_instant),
            session_index: Some(saml_crypto::generate_id()),
            session_not_on_or_after: None,
            authn_context_class_ref: Some(context_class_ref.into()),
        }
    }

    #[must_use]
    pub fn with_session_not_on_or_after(mut self, at: DateTime<Utc>) -> Self {
        self.session_not_on_or_after = Some(truncate_to_seconds(at));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStatement {
    pub attributes: Vec<Attribute>,
}

impl AttributeStatement {
    /// One `basic`-format attribute per map entry, in key order.
    #[must_use]
    pub fn from_map(attrs: &BTreeMap<String, Vec<String>>) -> Self {
        let attributes = attrs
            .iter()
            .map(|(name, values)| Attribute::multi(name.clone(), values.clone()))
            .collect();
        Self { attributes }
    }

    /// Collapses the statement into a map; values of repeated names are
    /// appended in document order.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for attr in &self.attributes {
            map.entry(attr.name.clone())
                .or_default()
                .extend(attr.values.iter().cloned());
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    pub values: Vec<String>,
}

impl Attribute {
    pub const NAME_FORMAT_BASIC: &'static str =
        "urn:oasis:names:tc:SAML:2.0:attrname-format:basic";

    #[must_use]
    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::multi(name, vec![value.into()])
    }

    #[must_use]
    pub fn multi(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            name_format: Some(Self::NAME_FORMAT_BASIC.to_string()),
            friendly_name: None,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NameIdFormat;
    use chrono::TimeZone;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn builder_sets_window_and_audience() {
        let now = instant();
        let assertion = Assertion::new("https://idp.example.com", now)
            .with_subject(Subject::new(NameId::of_format(
                NameIdFormat::Email,
                "user@example.com",
            )))
            .with_conditions(
                Conditions::with_validity(now, Duration::seconds(60), Duration::minutes(5))
                    .with_audience("https://sp.example.com"),
            );

        assert!(assertion.id.starts_with('_'));
        assert_eq!(assertion.name_id().map(|n| n.value.as_str()), Some("user@example.com"));
        let conditions = assertion.conditions.as_ref().unwrap();
        assert_eq!(conditions.not_before, Some(now - Duration::seconds(60)));
        assert_eq!(conditions.not_on_or_after, Some(now + Duration::minutes(5)));
        assert_eq!(
            conditions.audience_restrictions[0].audiences,
            vec!["https://sp.example.com".to_string()]
        );
    }

    #[test]
    fn expires_at_takes_earliest_bound() {
        let now = instant();
        let assertion = Assertion::new("idp", now)
            .with_subject(
                Subject::new(NameId::new("u")).with_confirmation(SubjectConfirmation::bearer(
                    SubjectConfirmationData::for_request(None, "acs", now + Duration::minutes(2)),
                )),
            )
            .with_conditions(Conditions::with_validity(
                now,
                Duration::zero(),
                Duration::minutes(5),
            ));
        assert_eq!(assertion.expires_at(), Some(now + Duration::minutes(2)));
        assert_eq!(Assertion::new("idp", now).expires_at(), None);
    }

    #[test]
    fn repeated_attribute_names_merge() {
        let stmt = AttributeStatement {
            attributes: vec![
                Attribute::single("role", "admin"),
                Attribute::single("uid", "alice"),
                Attribute::single("role", "user"),
            ],
        };

        let map = stmt.to_map();
        assert_eq!(map["role"], vec!["admin".to_string(), "user".to_string()]);
        assert_eq!(map["uid"], vec!["alice".to_string()]);

        let rebuilt = AttributeStatement::from_map(&map);
        assert_eq!(rebuilt.attributes.len(), 2);
        assert_eq!(rebuilt.to_map(), map);
    }
}
