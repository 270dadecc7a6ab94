//! The identity handed to the application after a completed login.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::NameId;

/// An authenticated subject extracted from a verified Response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The IdP that authenticated the subject.
    pub issuer: String,
    /// The subject's name identifier.
    pub name_id: NameId,
    /// The IdP session index, used for later logout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,
    /// When the subject authenticated at the IdP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_instant: Option<DateTime<Utc>>,
    /// The authentication context class the IdP reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_context_class_ref: Option<String>,
    /// Attribute name → values, merged across assertions.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// The consumed response ID.
    pub response_id: String,
    /// The request this login answered; `None` for IdP-initiated logins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,
    /// The RelayState that travelled with the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_state: Option<String>,
}

impl Identity {
    /// Returns all values of an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Returns the first value of an attribute.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.attribute(name)
            .and_then(<[String]>::first)
            .map(String::as_str)
    }
}
