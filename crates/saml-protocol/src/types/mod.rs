//! The SAML protocol model: requests, responses, assertions and the
//! [`Identity`] a completed login yields.

mod assertion;
mod authn_request;
pub mod constants;
mod identity;
mod name_id;
mod response;
mod status;

pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use identity::*;
pub use name_id::*;
pub use response::*;
pub use status::*;

use crate::error::{SamlError, SamlResult};

fn check_header(element: &str, id: &str, version: &str, issuer: &str) -> SamlResult<()> {
    let defect = if id.is_empty() {
        "has no ID".to_string()
    } else if version != SAML_VERSION {
        format!("has unsupported version {version}")
    } else if issuer.is_empty() {
        "has no Issuer".to_string()
    } else {
        return Ok(());
    };
    Err(SamlError::MalformedMessage(format!("{element} {defect}")))
}
