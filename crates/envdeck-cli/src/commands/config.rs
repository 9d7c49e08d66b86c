use clap::Subcommand;
use envdeck_core::Config;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the effective configuration as TOML
    Show,
    /// Get a config value
    Get {
        /// Dot-separated key (e.g. "brightness.enabled", "netatmo.username")
        key: String,
    },
    /// Set a config value and save the file
    Set {
        /// Dot-separated key
        key: String,
        /// New value
        value: String,
    },
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Report sources that cannot start with this configuration
    Check,
}

pub fn run(config_path: &Path, action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Show => {
            let config = Config::load_from(config_path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Get { key } => {
            let config = Config::load_from(config_path)?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load_from(config_path)?;
            config.set(&key, &value)?;
            config.save_to(config_path)?;
            println!("ok");
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                return Err(format!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                )
                .into());
            }
            Config::default().save_to(config_path)?;
            println!("wrote {}", config_path.display());
        }
        ConfigAction::Check => {
            let config = Config::load_from(config_path)?;
            let problems = config.validate();
            if problems.is_empty() {
                println!("ok");
            }
            for problem in &problems {
                println!("{problem}");
            }
        }
    }
    Ok(())
}
