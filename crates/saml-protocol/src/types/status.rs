//! `samlp:Status`.

use serde::{Deserialize, Serialize};

use super::status_codes;
use crate::error::SamlError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub status_code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Status {
    #[must_use]
    pub fn success() -> Self {
        Self {
            status_code: StatusCode::new(status_codes::SUCCESS),
            status_message: None,
        }
    }

    /// The failure status an IdP answers `error` with; codes come from
    /// [`SamlError::status_code`] and [`SamlError::sub_status_code`] and the
    /// message is the error's display text.
    #[must_use]
    pub fn from_error(error: &SamlError) -> Self {
        Self {
            status_code: StatusCode {
                value: error.status_code().to_string(),
                status_code: error.sub_status_code().map(|sub| Box::new(StatusCode::new(sub))),
            },
            status_message: Some(error.to_string()),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.value == status_codes::SUCCESS
    }

    /// The second-level code when present, else the top-level one.
    #[must_use]
    pub fn most_specific_code(&self) -> &str {
        self.status_code
            .status_code
            .as_deref()
            .map_or(&self.status_code.value, |sub| &sub.value)
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// A status code URI with at most one nested second-level code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status_code: None,
        }
    }

    #[must_use]
    pub fn with_sub_status(mut self, sub: StatusCode) -> Self {
        self.status_code = Some(Box::new(sub));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::sub_status_codes;

    #[test]
    fn success_has_no_message() {
        let status = Status::success();
        assert!(status.is_success());
        assert!(status.status_message.is_none());
        assert_eq!(status.most_specific_code(), status_codes::SUCCESS);
    }

    #[test]
    fn authentication_failure_nests_authn_failed() {
        let status = Status::from_error(&SamlError::AuthenticationFailed("wrong password".into()));
        assert!(!status.is_success());
        assert_eq!(status.status_code.value, status_codes::RESPONDER);
        assert_eq!(status.most_specific_code(), sub_status_codes::AUTHN_FAILED);
        assert!(status
            .status_message
            .as_deref()
            .is_some_and(|m| m.contains("wrong password")));
    }

    #[test]
    fn plain_requester_error_has_no_second_level() {
        let status = Status::from_error(&SamlError::RequestExpired("too old".into()));
        assert_eq!(status.status_code.value, status_codes::REQUESTER);
        assert!(status.status_code.status_code.is_none());
        assert_eq!(status.most_specific_code(), status_codes::REQUESTER);
    }
}
