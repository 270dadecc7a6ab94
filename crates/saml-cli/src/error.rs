//! Failures surfaced by the `saml` binary.

use saml_protocol::SamlError;
use thiserror::Error;

/// Anything a command can fail with.
#[derive(Debug, Error)]
pub enum CliError {
    /// The TOML file is missing a section or names unreadable key files.
    #[error("configuration error: {0}")]
    Config(String),

    /// The engines rejected a message, a key or a configuration record.
    #[error("SAML error: {0}")]
    Saml(#[from] SamlError),

    /// A command-line value that clap accepted but the command cannot use.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Reading input or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rendering JSON output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file is not valid TOML for the expected layout.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CliError {
    /// Process exit status: 2 for bad input, 3 for a protocol rejection,
    /// 1 otherwise.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::InvalidArgument(_) | Self::Toml(_) => 2,
            Self::Saml(_) => 3,
            Self::Io(_) | Self::Json(_) => 1,
        }
    }
}

/// Result alias for command functions.
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_rejections_have_their_own_exit_code() {
        let replay = CliError::from(SamlError::ReplayedResponse("_r".into()));
        assert_eq!(replay.exit_code(), 3);
        assert_eq!(CliError::Config("no [idp]".into()).exit_code(), 2);
    }
}
