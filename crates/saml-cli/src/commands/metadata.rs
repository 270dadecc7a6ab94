//! `metadata` command.

use saml_protocol::metadata::serialize_metadata;
use saml_protocol::EntityDescriptor;

use crate::cli::{MetadataArgs, Role};
use crate::output::success;
use crate::{CliConfig, CliResult};

/// Builds the requested side's entity descriptor and prints or writes it.
pub fn run_metadata(args: &MetadataArgs) -> CliResult<()> {
    let config = CliConfig::load(&args.config.config)?;
    let xml = serialize_metadata(&descriptor(&config, args.role)?)?;
    match &args.write {
        Some(path) => {
            std::fs::write(path, &xml)?;
            success(&format!("metadata written to {}", path.display()));
        }
        None => println!("{xml}"),
    }
    Ok(())
}

/// The descriptor the configured `role` publishes.
pub fn descriptor(config: &CliConfig, role: Role) -> CliResult<EntityDescriptor> {
    let descriptor = match role {
        Role::Idp => {
            let idp = config.idp()?;
            idp.settings.validate()?;
            let credential = config.credential(&idp.keys)?;
            idp.settings.descriptor(credential.certificate().clone())
        }
        Role::Sp => {
            let sp = config.sp()?;
            sp.settings.validate()?;
            let credential = config.credential(&sp.keys)?;
            sp.settings.descriptor(credential.certificate().clone())
        }
    };
    descriptor.validate()?;
    Ok(descriptor)
}
