//! # saml-cli
//!
//! Command-line tools for the SAML SSO engines:
//! - Metadata generation for either side
//! - Decoding of Redirect and POST protocol messages
//! - Configuration and key material checks
//! - In-process login simulation

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::Cli;
pub use config::CliConfig;
pub use error::{CliError, CliResult};
