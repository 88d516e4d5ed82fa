use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use yansi::Paint;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::CredentialStore;
use crate::domain::services::actions::help_text;
use crate::infrastructure::credentials::FileCredentialStore;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
    std::process::exit(0);
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_credential() -> Command {
    return Command::new("credential")
        .about("Manage the stored Gemini API key.")
        .subcommand(
            Command::new("set")
                .about("Saves an API key to the credential file.")
                .arg(
                    clap::Arg::new("value")
                        .help("The Gemini API key.")
                        .required(true),
                ),
        )
        .subcommand(Command::new("clear").about("Removes the stored API key."))
        .subcommand(Command::new("path").about("Returns the path of the credential file."));
}

fn subcommand_chat() -> Command {
    return Command::new("chat").about("Start a new review session. This is the default.");
}

fn arg_config(key: ConfigKey, env: &'static str, help: String) -> Arg {
    return Arg::new(key.to_string())
        .long(key.to_string())
        .env(env)
        .num_args(1)
        .help(help)
        .global(true);
}

fn with_default(help: &str, key: ConfigKey) -> String {
    return format!("{help} [default: {}]", Config::default(key));
}

pub fn build() -> Command {
    let commands_text = help_text()
        .split('\n')
        .map(|line| {
            if line.starts_with('-') {
                return format!("  {line}");
            }
            if line.starts_with("COMMANDS:") {
                return Paint::new(format!("CHAT {line}"))
                    .underline()
                    .bold()
                    .to_string();
            }
            return line.to_string();
        })
        .collect::<Vec<String>>()
        .join("\n");

    let about = format!(
        "{}\n\nVersion: {}\nCommit: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_DESCRIBE")
    );

    return Command::new("excaligenius")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(commands_text)
        .arg_required_else_help(false)
        .subcommand(subcommand_chat())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(subcommand_credential())
        .arg(
            arg_config(
                ConfigKey::ConfigFile,
                "EXCALIGENIUS_CONFIG_FILE",
                with_default("Path to configuration file.", ConfigKey::ConfigFile),
            )
            .short('c'),
        )
        .arg(arg_config(
            ConfigKey::CredentialFile,
            "EXCALIGENIUS_CREDENTIAL_FILE",
            with_default(
                "Path to the file the Gemini API key is saved to.",
                ConfigKey::CredentialFile,
            ),
        ))
        .arg(
            arg_config(
                ConfigKey::Diagram,
                "EXCALIGENIUS_DIAGRAM",
                with_default(
                    "Path to the Excalidraw scene file to review. Created on the first change if missing.",
                    ConfigKey::Diagram,
                ),
            )
            .short('d'),
        )
        .arg(arg_config(
            ConfigKey::GeminiToken,
            "EXCALIGENIUS_GEMINI_TOKEN",
            "Gemini API key. Takes precedence over the credential file and is never written to disk."
                .to_string(),
        ))
        .arg(arg_config(
            ConfigKey::GeminiURL,
            "EXCALIGENIUS_GEMINI_URL",
            with_default(
                "Gemini API URL. Can be swapped to a compatible proxy.",
                ConfigKey::GeminiURL,
            ),
        ))
        .arg(arg_config(
            ConfigKey::HealthCheckTimeout,
            "EXCALIGENIUS_HEALTH_CHECK_TIMEOUT",
            with_default(
                "Time to wait in milliseconds before timing out when doing a healthcheck for Gemini.",
                ConfigKey::HealthCheckTimeout,
            ),
        ))
        .arg(arg_config(
            ConfigKey::MaxOutputTokens,
            "EXCALIGENIUS_MAX_OUTPUT_TOKENS",
            with_default(
                "Maximum number of tokens the model may generate per response.",
                ConfigKey::MaxOutputTokens,
            ),
        ))
        .arg(arg_config(
            ConfigKey::MaxToolRounds,
            "EXCALIGENIUS_MAX_TOOL_ROUNDS",
            with_default(
                "Maximum number of tool round trips the model may take in a single turn.",
                ConfigKey::MaxToolRounds,
            ),
        ))
        .arg(
            arg_config(
                ConfigKey::Model,
                "EXCALIGENIUS_MODEL",
                with_default("The Gemini model to review with.", ConfigKey::Model),
            )
            .short('m'),
        )
        .arg(
            arg_config(
                ConfigKey::Project,
                "EXCALIGENIUS_PROJECT",
                "Describes what you are building. Can also be set from the chat with /project."
                    .to_string(),
            )
            .short('p'),
        )
        .arg(arg_config(
            ConfigKey::SnapshotDebounce,
            "EXCALIGENIUS_SNAPSHOT_DEBOUNCE",
            with_default(
                "Quiet time in milliseconds before a changed diagram snapshot is published.",
                ConfigKey::SnapshotDebounce,
            ),
        ))
        .arg(arg_config(
            ConfigKey::Temperature,
            "EXCALIGENIUS_TEMPERATURE",
            with_default(
                "Sampling temperature between 0 and 2.",
                ConfigKey::Temperature,
            ),
        ));
}

async fn handle_credential(matches: &ArgMatches, credential_matches: &ArgMatches) -> Result<()> {
    Config::load(vec![matches, credential_matches]).await?;
    let store = FileCredentialStore::default();

    match credential_matches.subcommand() {
        Some(("set", set_matches)) => {
            let Some(value) = set_matches.get_one::<String>("value") else {
                bail!("An API key is required");
            };
            store.set(value).await?;
            println!("Saved API key to {}", store.path().to_string_lossy());
        }
        Some(("clear", _)) => {
            store.clear().await?;
            println!("Removed API key from {}", store.path().to_string_lossy());
        }
        Some(("path", _)) => {
            println!("{}", store.path().to_string_lossy());
        }
        _ => {
            subcommand_credential().print_long_help()?;
        }
    }

    return Ok(());
}

pub async fn parse() -> Result<bool> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("chat", subcmd_matches)) => {
            Config::load(vec![&matches, subcmd_matches]).await?;
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
                return Ok(false);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(false);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(false);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(false);
            }
        },
        Some(("credential", subcmd_matches)) => {
            handle_credential(&matches, subcmd_matches).await?;
            return Ok(false);
        }
        _ => {
            Config::load(vec![&matches]).await?;
        }
    }

    return Ok(true);
}
