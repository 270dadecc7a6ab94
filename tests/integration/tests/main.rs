//! End-to-end tests: an IdP engine and an SP engine federated in one process.
//!
//! Run with:
//! ```bash
//! cargo test -p saml-integration-tests
//! ```

mod common;
mod login_flow;
mod metadata;
mod security;
