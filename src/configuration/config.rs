#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::env;
use std::path;
use std::str::FromStr;

use anyhow::bail;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;
use strum::IntoEnumIterator;
use tokio::fs;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    ConfigFile,
    CredentialFile,
    Diagram,
    GeminiToken,
    GeminiURL,
    HealthCheckTimeout,
    MaxOutputTokens,
    MaxToolRounds,
    Model,
    Project,
    SnapshotDebounce,
    Temperature,
}

fn app_dir(base: Option<path::PathBuf>) -> path::PathBuf {
    return base.unwrap_or_else(env::temp_dir).join("excaligenius");
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    /// Reads a key and parses it into the requested type.
    pub fn parse<T: FromStr>(key: ConfigKey) -> Result<T> {
        let val = Config::get(key);
        return Config::parse_value(key, &val);
    }

    fn parse_value<T: FromStr>(key: ConfigKey, val: &str) -> Result<T> {
        match val.trim().parse::<T>() {
            Ok(res) => return Ok(res),
            Err(_) => bail!(format!("Invalid value for config key '{key}': {val}")),
        }
    }

    /// Rejects values that would only fail later, once a turn is running.
    pub fn validate(key: ConfigKey, val: &str) -> Result<()> {
        match key {
            ConfigKey::HealthCheckTimeout | ConfigKey::SnapshotDebounce => {
                Config::parse_value::<u64>(key, val)?;
            }
            ConfigKey::MaxOutputTokens => {
                Config::parse_value::<u32>(key, val)?;
            }
            ConfigKey::MaxToolRounds => {
                let rounds = Config::parse_value::<usize>(key, val)?;
                if rounds == 0 {
                    bail!(format!("Config key '{key}' must be at least 1"));
                }
            }
            ConfigKey::Temperature => {
                let temperature = Config::parse_value::<f32>(key, val)?;
                if !(0.0..=2.0).contains(&temperature) {
                    bail!(format!(
                        "Config key '{key}' must be between 0 and 2, got {val}"
                    ));
                }
            }
            _ => {}
        }

        return Ok(());
    }

    pub fn default(key: ConfigKey) -> String {
        let config_path = app_dir(dirs::config_dir()).join("config.toml");
        let credential_path = app_dir(dirs::cache_dir()).join("credentials.toml");

        let res = match key {
            ConfigKey::ConfigFile => config_path.to_string_lossy().to_string(),
            ConfigKey::CredentialFile => credential_path.to_string_lossy().to_string(),
            ConfigKey::Diagram => "diagram.excalidraw".to_string(),
            ConfigKey::GeminiToken => "".to_string(),
            ConfigKey::GeminiURL => "https://generativelanguage.googleapis.com".to_string(),
            ConfigKey::HealthCheckTimeout => "1000".to_string(),
            ConfigKey::MaxOutputTokens => "2048".to_string(),
            ConfigKey::MaxToolRounds => "8".to_string(),
            ConfigKey::Model => "gemini-2.5-flash".to_string(),
            ConfigKey::Project => "".to_string(),
            ConfigKey::SnapshotDebounce => "500".to_string(),
            ConfigKey::Temperature => "0.7".to_string(),
        };

        return res;
    }

    pub async fn load(clap_arg_matches: Vec<&ArgMatches>) -> Result<()> {
        for key in ConfigKey::iter() {
            Config::set(key, &Config::default(key))
        }

        let mut config_file = Config::default(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }
        Config::set(ConfigKey::ConfigFile, &config_file);

        let config_path = path::PathBuf::from(config_file);
        if config_path.exists() {
            let toml_str = fs::read_to_string(config_path).await?;
            let doc = toml_str.parse::<toml_edit::Document>()?;

            for key in ConfigKey::iter() {
                if let Some(val) = doc.get(&key.to_string()) {
                    let val_str = if let Some(val_int) = val.as_integer() {
                        val_int.to_string()
                    } else if let Some(val_float) = val.as_float() {
                        val_float.to_string()
                    } else if let Some(val_str) = val.as_str() {
                        val_str.to_string()
                    } else {
                        bail!(format!("config.toml has an invalid value for key '{key}'"));
                    };

                    if val_str.is_empty() {
                        continue;
                    }
                    if let Err(err) = Config::validate(key, &val_str) {
                        bail!(format!("config.toml has an invalid value: {err}"));
                    }
                    Config::set(key, &val_str);
                }
            }
        }

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    Config::validate(key, val)?;
                    Config::set(key, val)
                }
            }
        }

        tracing::debug!(
            model = Config::get(ConfigKey::Model),
            gemini_url = Config::get(ConfigKey::GeminiURL),
            diagram = Config::get(ConfigKey::Diagram),
            max_tool_rounds = Config::get(ConfigKey::MaxToolRounds),
            temperature = Config::get(ConfigKey::Temperature),
            "config"
        );

        return Ok(());
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile {
                    return None;
                }

                let arg = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(key.to_string().as_str()))?;

                let description = arg
                    .get_help()
                    .map(|help| return help.to_string())
                    .unwrap_or_default()
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                let mut val = Config::default(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if val.parse::<f64>().is_ok() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{}\"", val.replace('\\', "\\\\"));
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}
