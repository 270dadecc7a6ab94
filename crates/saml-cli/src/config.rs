//! CLI configuration file.
//!
//! ```toml
//! [idp]
//! entity_id = "https://idp.example.com"
//! sso_url = "https://idp.example.com/sso"
//! key_file = "pki/idp.key"
//! cert_file = "pki/idp.crt"
//!
//! [sp]
//! entity_id = "https://sp.example.com"
//! acs_url = "https://sp.example.com/acs"
//! key_file = "pki/sp.key"
//! cert_file = "pki/sp.crt"
//! ```
//!
//! Key and certificate paths are relative to the configuration file.

use std::path::{Path, PathBuf};

use saml_protocol::{IdpConfig, SigningCredential, SpConfig};
use serde::Deserialize;

use crate::{CliError, CliResult};

/// PEM files holding an entity's signing credential.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyFiles {
    /// PKCS#8 private key.
    pub key_file: PathBuf,
    /// X.509 certificate.
    pub cert_file: PathBuf,
}

/// The `[idp]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct IdpSection {
    /// Engine settings.
    #[serde(flatten)]
    pub settings: IdpConfig,
    /// Signing credential.
    #[serde(flatten)]
    pub keys: KeyFiles,
}

/// The `[sp]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SpSection {
    /// Engine settings.
    #[serde(flatten)]
    pub settings: SpConfig,
    /// Signing credential.
    #[serde(flatten)]
    pub keys: KeyFiles,
}

/// A parsed configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    /// Identity provider settings.
    pub idp: Option<IdpSection>,
    /// Service provider settings.
    pub sp: Option<SpSection>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl CliConfig {
    /// Loads configuration from `path`.
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::parse(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    /// Parses configuration text; relative paths resolve against the
    /// working directory.
    pub fn parse(content: &str) -> CliResult<Self> {
        let config: Self = toml::from_str(content)?;
        if config.idp.is_none() && config.sp.is_none() {
            return Err(CliError::Config("neither [idp] nor [sp] is present".into()));
        }
        Ok(config)
    }

    /// The `[idp]` section, required.
    pub fn idp(&self) -> CliResult<&IdpSection> {
        self.idp
            .as_ref()
            .ok_or_else(|| CliError::Config("missing [idp] section".into()))
    }

    /// The `[sp]` section, required.
    pub fn sp(&self) -> CliResult<&SpSection> {
        self.sp
            .as_ref()
            .ok_or_else(|| CliError::Config("missing [sp] section".into()))
    }

    /// Loads the credential named by `keys`.
    pub fn credential(&self, keys: &KeyFiles) -> CliResult<SigningCredential> {
        let read = |file: &Path| {
            let path = self.base_dir.join(file);
            std::fs::read_to_string(&path)
                .map_err(|e| CliError::Config(format!("cannot read {}: {e}", path.display())))
        };
        let key = read(&keys.key_file)?;
        let cert = read(&keys.cert_file)?;
        Ok(SigningCredential::from_pem(&key, &cert)?)
    }
}
