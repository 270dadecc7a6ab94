//! Individual protocol checks.
//!
//! The engines compose these; each one is usable and testable on its own
//! and fails with the specific error kind for what it checks.

use chrono::{DateTime, Duration, Utc};

use crate::error::{SamlError, SamlResult};
use crate::types::{Conditions, Status, Subject, SubjectConfirmation};

/// Requires `actual` to equal this endpoint's own URL.
///
/// # Errors
///
/// Returns `DestinationMismatch` if it differs or is absent.
pub fn check_destination(expected: &str, actual: Option<&str>) -> SamlResult<()> {
    match actual {
        Some(actual) if actual == expected => Ok(()),
        other => Err(SamlError::DestinationMismatch {
            expected: expected.to_string(),
            actual: other.unwrap_or("(none)").to_string(),
        }),
    }
}

/// Requires `now` to lie within `[not_before, not_on_or_after)`, widened
/// by `skew` on both sides.
///
/// # Errors
///
/// Returns `AssertionNotYetValid` or `AssertionExpired`.
pub fn check_time_window(
    not_before: Option<DateTime<Utc>>,
    not_on_or_after: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    skew: Duration,
) -> SamlResult<()> {
    if not_before.is_some_and(|nb| now + skew < nb) {
        return Err(SamlError::AssertionNotYetValid);
    }
    if not_on_or_after.is_some_and(|noa| now - skew >= noa) {
        return Err(SamlError::AssertionExpired);
    }
    Ok(())
}

/// Checks the assertion conditions: time window and audience.
///
/// Every `AudienceRestriction` must list `audience`, and at least one
/// restriction must be present.
///
/// # Errors
///
/// Returns the time-window errors or `AudienceMismatch`.
pub fn check_conditions(
    conditions: Option<&Conditions>,
    audience: &str,
    now: DateTime<Utc>,
    skew: Duration,
) -> SamlResult<()> {
    let Some(conditions) = conditions else {
        return Err(SamlError::AudienceMismatch {
            expected: audience.to_string(),
            actual: "(no Conditions)".into(),
        });
    };
    check_time_window(conditions.not_before, conditions.not_on_or_after, now, skew)?;
    check_audience(conditions, audience)
}

/// Requires every audience restriction to name `audience`.
///
/// # Errors
///
/// Returns `AudienceMismatch` if a restriction omits it or none exists.
pub fn check_audience(conditions: &Conditions, audience: &str) -> SamlResult<()> {
    let restrictions = &conditions.audience_restrictions;
    let satisfied = !restrictions.is_empty()
        && restrictions
            .iter()
            .all(|r| r.audiences.iter().any(|a| a == audience));
    if satisfied {
        return Ok(());
    }
    let actual = restrictions
        .iter()
        .flat_map(|r| r.audiences.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(", ");
    Err(SamlError::AudienceMismatch {
        expected: audience.to_string(),
        actual: if actual.is_empty() { "(none)".into() } else { actual },
    })
}

/// Requires an element's issuer to equal the expected peer.
///
/// # Errors
///
/// Returns `IssuerMismatch`.
pub fn check_issuer(expected: &str, actual: &str) -> SamlResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SamlError::IssuerMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Rejects requests issued more than `max_age` ago or in the future,
/// allowing `skew` either way.
///
/// # Errors
///
/// Returns `RequestExpired`.
pub fn check_request_age(
    issue_instant: DateTime<Utc>,
    now: DateTime<Utc>,
    max_age: Duration,
    skew: Duration,
) -> SamlResult<()> {
    if issue_instant > now + skew {
        return Err(SamlError::RequestExpired(format!(
            "issued in the future at {issue_instant}"
        )));
    }
    if issue_instant + max_age + skew < now {
        return Err(SamlError::RequestExpired(format!(
            "issued at {issue_instant}, older than {}s",
            max_age.num_seconds()
        )));
    }
    Ok(())
}

/// Requires a success status.
///
/// # Errors
///
/// Returns `StatusNotSuccess` carrying the most specific code.
pub fn check_status(status: &Status) -> SamlResult<()> {
    if status.is_success() {
        return Ok(());
    }
    Err(SamlError::StatusNotSuccess {
        status: status.most_specific_code().to_string(),
        message: status.status_message.clone().unwrap_or_default(),
    })
}

/// Checks the bearer `SubjectConfirmation` of an assertion.
///
/// A bearer confirmation must exist. Its `Recipient` must be the ACS URL,
/// its `NotOnOrAfter` must not have passed and its `InResponseTo`, when
/// present, must equal the response's.
///
/// # Errors
///
/// Returns `MalformedMessage`, `DestinationMismatch`, `AssertionExpired`
/// or `UnsolicitedResponse`.
pub fn check_subject_confirmation(
    subject: Option<&Subject>,
    acs_url: &str,
    in_response_to: Option<&str>,
    now: DateTime<Utc>,
    skew: Duration,
) -> SamlResult<()> {
    let data = subject
        .and_then(Subject::bearer_confirmation_data)
        .ok_or_else(|| {
            SamlError::MalformedMessage(format!(
                "assertion has no {} SubjectConfirmation",
                SubjectConfirmation::BEARER
            ))
        })?;
    check_destination(acs_url, data.recipient.as_deref())?;
    let Some(not_on_or_after) = data.not_on_or_after else {
        return Err(SamlError::MalformedMessage(
            "bearer SubjectConfirmationData has no NotOnOrAfter".into(),
        ));
    };
    check_time_window(None, Some(not_on_or_after), now, skew)?;
    match (data.in_response_to.as_deref(), in_response_to) {
        (None, _) => Ok(()),
        (Some(confirmed), Some(expected)) if confirmed == expected => Ok(()),
        (Some(confirmed), _) => Err(SamlError::UnsolicitedResponse(format!(
            "SubjectConfirmationData answers {confirmed}, response answers {}",
            in_response_to.unwrap_or("nothing")
        ))),
    }
}
