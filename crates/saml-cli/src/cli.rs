//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use saml_protocol::SamlBinding;

/// SAML SSO tool - metadata, message inspection and login simulation.
#[derive(Debug, Parser)]
#[command(name = "saml")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print or write an entity's metadata document.
    Metadata(MetadataArgs),

    /// Decode a protocol message received on a binding.
    Decode(DecodeArgs),

    /// Validate a configuration file and its key material.
    Check(ConfigArgs),

    /// Run a complete SP-initiated login in-process.
    Simulate(SimulateArgs),
}

/// Configuration file argument.
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// TOML file with `[idp]` and/or `[sp]` sections.
    #[arg(short, long, env = "SAML_CONFIG")]
    pub config: PathBuf,
}

/// `metadata` arguments.
#[derive(Debug, clap::Args)]
pub struct MetadataArgs {
    /// Which side to describe.
    #[arg(value_enum)]
    pub role: Role,

    /// Configuration holding the section to describe.
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Write to this file instead of stdout.
    #[arg(short = 'w', long)]
    pub write: Option<PathBuf>,
}

/// `decode` arguments.
#[derive(Debug, clap::Args)]
pub struct DecodeArgs {
    /// Binding the message arrived on.
    #[arg(short, long, value_enum)]
    pub binding: BindingArg,

    /// Redirect URL or query string, or POST form body; `-` reads stdin.
    pub raw: String,
}

/// `simulate` arguments.
#[derive(Debug, clap::Args)]
pub struct SimulateArgs {
    /// Configuration holding both `[idp]` and `[sp]`.
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Subject the IdP authenticates.
    #[arg(short, long)]
    pub user: String,

    /// Attribute to release, as `name=value`; repeatable.
    #[arg(short, long = "attr", value_name = "NAME=VALUE")]
    pub attributes: Vec<String>,

    /// RelayState to carry through the round trip.
    #[arg(long)]
    pub relay_state: Option<String>,
}

/// Entity role selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Role {
    /// Identity provider.
    Idp,
    /// Service provider.
    Sp,
}

/// Front-channel binding selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BindingArg {
    /// HTTP-Redirect.
    Redirect,
    /// HTTP-POST.
    Post,
}

impl From<BindingArg> for SamlBinding {
    fn from(arg: BindingArg) -> Self {
        match arg {
            BindingArg::Redirect => Self::HttpRedirect,
            BindingArg::Post => Self::HttpPost,
        }
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn simulate_collects_repeated_attributes() {
        let cli = Cli::try_parse_from([
            "saml", "simulate", "-c", "sso.toml", "-u", "alice", "-a", "mail=a@x", "--attr",
            "role=admin",
        ])
        .unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.user, "alice");
        assert_eq!(args.attributes, vec!["mail=a@x", "role=admin"]);
    }

    #[test]
    fn decode_parses_binding() {
        let cli = Cli::try_parse_from(["saml", "decode", "--binding", "redirect", "SAMLRequest=x"]).unwrap();
        let Command::Decode(args) = cli.command else {
            panic!("expected decode");
        };
        assert_eq!(SamlBinding::from(args.binding), SamlBinding::HttpRedirect);
    }
}
