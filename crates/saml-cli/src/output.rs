//! Output formatting utilities.

use colored::Colorize;
use saml_protocol::Identity;

use crate::cli::OutputFormat;

/// Prints a success message.
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Prints an error message.
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Prints a warning message.
pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Prints an info message.
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Prints a labelled value.
pub fn field(label: &str, value: &str) {
    println!("  {:<24} {}", format!("{label}:").dimmed(), value);
}

/// Prints an authenticated identity.
pub fn identity(identity: &Identity, format: OutputFormat) -> crate::CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(identity)?),
        OutputFormat::Text => {
            success(&format!("authenticated {}", identity.name_id.value.bold()));
            field("issuer", &identity.issuer);
            if let Some(format) = &identity.name_id.format {
                field("name id format", format);
            }
            field("response", &identity.response_id);
            field("in response to", identity.in_response_to.as_deref().unwrap_or("-"));
            field("session index", identity.session_index.as_deref().unwrap_or("-"));
            field("relay state", identity.relay_state.as_deref().unwrap_or("-"));
            for (name, values) in &identity.attributes {
                field(name, &values.join(", "));
            }
        }
    }
    Ok(())
}
