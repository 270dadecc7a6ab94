//! `check` command.

use saml_protocol::signature::SignatureConfig;
use saml_protocol::{SigningCredential, XmlSigner};

use crate::cli::ConfigArgs;
use saml_crypto::HashAlgorithm;

use crate::output::{field, success, warning};
use crate::{CliConfig, CliResult};

/// Validates every present section and its key material.
pub fn run_check(args: &ConfigArgs) -> CliResult<()> {
    let config = CliConfig::load(&args.config)?;
    if let Some(idp) = &config.idp {
        idp.settings.validate()?;
        let credential = config.credential(&idp.keys)?;
        check_credential(credential, idp.settings.signing, "idp")?;
        success(&format!("[idp] {} is valid", idp.settings.entity_id));
    }
    if let Some(sp) = &config.sp {
        sp.settings.validate()?;
        let credential = config.credential(&sp.keys)?;
        check_credential(credential, sp.settings.signing, "sp")?;
        success(&format!("[sp] {} is valid", sp.settings.entity_id));
    }
    Ok(())
}

/// Confirms the key can produce the configured algorithm and warns about
/// an expired certificate.
fn check_credential(
    credential: SigningCredential,
    signing: SignatureConfig,
    section: &str,
) -> CliResult<()> {
    let certificate = credential.certificate().clone();
    let signer = XmlSigner::new(credential, signing)?;
    tracing::debug!(section, algorithm = ?signer.algorithm(), "credential loaded");
    field(
        &format!("[{section}] certificate SHA-256"),
        &fingerprint_hex(&certificate.fingerprint(HashAlgorithm::Sha256)),
    );

    if certificate.not_after() < chrono::Utc::now().timestamp() {
        warning(&format!(
            "[{section}] certificate {} has expired",
            certificate.subject()
        ));
    }
    Ok(())
}

fn fingerprint_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}
