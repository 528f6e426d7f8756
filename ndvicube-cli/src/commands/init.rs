//! Init command - write the default configuration file.

use ndvicube::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
///
/// An existing file is loaded and rewritten, which fills in any keys it is
/// missing without losing the values it has.
pub fn run() -> Result<(), CliError> {
    let path = config_file_path();
    let existed = path.exists();
    let config = if existed {
        ConfigFile::load_from(&path)?
    } else {
        ConfigFile::default()
    };
    config.save_to(&path)?;

    if existed {
        println!("Updated configuration file: {}", path.display());
    } else {
        println!("Created configuration file: {}", path.display());
    }
    println!();
    println!("Set client_id and client_secret in the [sentinelhub] section,");
    println!("or export SH_CLIENT_ID and SH_CLIENT_SECRET.");
    println!("CLI arguments override config file values when specified.");
    Ok(())
}
