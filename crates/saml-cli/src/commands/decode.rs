//! `decode` command.

use std::io::Read;

use saml_protocol::bindings::SamlMessageType;
use saml_protocol::codec::MessageCodec;
use saml_protocol::SamlBinding;
use serde_json::json;

use crate::cli::{DecodeArgs, OutputFormat};
use crate::output::{field, info};
use crate::CliResult;

/// Decodes a message without checking any signature.
pub fn run_decode(args: &DecodeArgs, format: OutputFormat) -> CliResult<()> {
    let raw = if args.raw == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf.trim().to_string()
    } else {
        args.raw.clone()
    };

    let binding = SamlBinding::from(args.binding);
    let decoded = MessageCodec::default().decode(&raw, binding)?;
    let kind = match decoded.message_type {
        SamlMessageType::Request => "request",
        SamlMessageType::Response => "response",
    };

    match format {
        OutputFormat::Json => {
            let value = json!({
                "binding": binding.uri(),
                "message_type": kind,
                "relay_state": decoded.relay_state,
                "sig_alg": decoded.detached_signature.as_ref().map(|s| s.sig_alg.as_str()),
                "xml": decoded.xml,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            info(&format!("decoded SAML {kind} ({binding})"));
            field("relay state", decoded.relay_state.as_deref().unwrap_or("-"));
            if let Some(signature) = &decoded.detached_signature {
                field("detached signature", &signature.sig_alg);
            }
            println!("{}", decoded.xml);
        }
    }
    Ok(())
}
