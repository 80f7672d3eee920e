use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use shared::config::server::{Config, Profile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    fn extension(self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Json => "json",
            ConfigFormat::Toml => "toml",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    Dev,
    Test,
    Prod,
}

impl From<ProfileArg> for Profile {
    fn from(value: ProfileArg) -> Self {
        match value {
            ProfileArg::Dev => Profile::Dev,
            ProfileArg::Test => Profile::Test,
            ProfileArg::Prod => Profile::Prod,
        }
    }
}

#[derive(Args, Debug)]
#[command(about = "Write a configuration file with profile defaults")]
pub struct ConfigArgs {
    #[arg(long, short, value_enum, default_value = "yaml")]
    pub format: ConfigFormat,

    #[arg(long, short, value_enum, default_value = "dev")]
    pub profile: ProfileArg,

    /// Destination file; `-` prints to stdout. Defaults to `beacon.<format>`.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Serializes the defaults for `profile` in `format`.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn render_config(profile: Profile, format: ConfigFormat) -> Result<String> {
    let config = Config::default_for_profile(profile);
    let rendered = match format {
        ConfigFormat::Yaml => serde_yml::to_string(&config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
        ConfigFormat::Toml => toml::to_string_pretty(&config)?,
    };
    Ok(rendered)
}

/// # Errors
/// Returns an error if serialization or writing the file fails.
pub fn generate_config(args: &ConfigArgs) -> Result<()> {
    let rendered = render_config(args.profile.into(), args.format)?;

    let path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("beacon.{}", args.format.extension())));
    if path.as_os_str() == "-" {
        print!("{rendered}");
        return Ok(());
    }

    fs::write(&path, rendered)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Configuration file '{}' generated successfully.", path.display());
    Ok(())
}
