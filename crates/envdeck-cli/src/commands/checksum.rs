use envdeck_core::sources::wettercom::WetterComAccount;
use envdeck_core::{Config, ConfigError};
use std::path::Path;

pub fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_from(config_path)?;
    let c = &config.wettercom;
    if !c.is_configured() {
        return Err(ConfigError::MissingKey(
            "wettercom.city_code / wettercom.project_name / wettercom.api_key".into(),
        )
        .into());
    }

    let account = WetterComAccount {
        city_code: c.city_code.clone(),
        project_name: c.project_name.clone(),
        api_key: c.api_key.clone(),
    };
    println!("{}", account.checksum());
    Ok(())
}
