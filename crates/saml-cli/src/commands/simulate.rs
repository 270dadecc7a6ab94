//! `simulate` command: both engines, one process, no browser.

use std::collections::BTreeMap;
use std::sync::Arc;

use saml_protocol::{
    Identity, IdpEngine, InMemoryReplayStore, MetadataRegistry, SamlBinding, SpEngine,
};
use tracing::debug;

use crate::cli::{OutputFormat, SimulateArgs};
use crate::output::{identity, info};
use crate::{CliConfig, CliError, CliResult};

/// Runs beginLogin, receive, validate, issue and completeLogin in turn.
pub fn run_simulate(args: &SimulateArgs, format: OutputFormat) -> CliResult<()> {
    let config = CliConfig::load(&args.config.config)?;
    let attributes = parse_attributes(&args.attributes)?;
    let result = simulate(&config, &args.user, &attributes, args.relay_state.as_deref())?;
    identity(&result, format)
}

/// Performs the login round trip described by `config`.
pub fn simulate(
    config: &CliConfig,
    user: &str,
    attributes: &BTreeMap<String, Vec<String>>,
    relay_state: Option<&str>,
) -> CliResult<Identity> {
    let (idp, sp) = (config.idp()?, config.sp()?);
    let idp_credential = config.credential(&idp.keys)?;
    let sp_credential = config.credential(&sp.keys)?;

    let registry = Arc::new(MetadataRegistry::new());
    registry.register(idp.settings.descriptor(idp_credential.certificate().clone()))?;
    registry.register(sp.settings.descriptor(sp_credential.certificate().clone()))?;

    let idp_engine = IdpEngine::new(idp.settings.clone(), idp_credential, Arc::clone(&registry))?;
    let sp_engine = SpEngine::new(
        sp.settings.clone(),
        Some(sp_credential),
        registry,
        Arc::new(InMemoryReplayStore::new()),
    )?;

    let login = sp_engine.begin_login(&idp.settings.entity_id, relay_state)?;
    info(&format!(
        "AuthnRequest {} sent over {}",
        login.request.id,
        login.binding()
    ));
    debug!(raw = %login.message.to_raw(), "request message");

    let received = idp_engine.receive(&login.message.to_raw(), login.binding())?;
    let validated = idp_engine.validate(received)?;
    info(&format!("request validated, response goes to {}", validated.acs_url()));

    let issued = idp_engine.issue(validated, user, attributes)?;
    info(&format!("Response {} issued", issued.response.id));

    Ok(sp_engine.complete_login(&issued.message.to_raw(), SamlBinding::HttpPost)?)
}

/// Parses `name=value` pairs; repeated names accumulate values.
pub fn parse_attributes(pairs: &[String]) -> CliResult<BTreeMap<String, Vec<String>>> {
    let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .filter(|(name, _)| !name.trim().is_empty())
            .ok_or_else(|| CliError::InvalidArgument(format!("expected NAME=VALUE, got {pair}")))?;
        attributes
            .entry(name.trim().to_string())
            .or_default()
            .push(value.to_string());
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn demo_configuration_completes_a_login() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/sso.toml");
        let config = CliConfig::load(&path).unwrap();
        let attributes = parse_attributes(&["mail=alice@example.com".to_string()]).unwrap();
        let identity = simulate(&config, "alice", &attributes, Some("/inbox")).unwrap();
        assert_eq!(identity.issuer, config.idp().unwrap().settings.entity_id);
        assert_eq!(identity.first("mail"), Some("alice@example.com"));
        assert_eq!(identity.relay_state.as_deref(), Some("/inbox"));
        assert!(identity.in_response_to.is_some());
    }

    #[test]
    fn attribute_pairs_accumulate() {
        let attrs = parse_attributes(&[
            "role=admin".to_string(),
            "role=dev".to_string(),
            "mail=a=b@example.com".to_string(),
        ])
        .unwrap();
        assert_eq!(attrs["role"], vec!["admin", "dev"]);
        assert_eq!(attrs["mail"], vec!["a=b@example.com"]);
        assert!(parse_attributes(&["novalue".to_string()]).is_err());
        assert!(parse_attributes(&["=x".to_string()]).is_err());
    }
}
