use anyhow::Result;
use banana_dev::commands::{self, CallOptions, ConfigAction};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// banana - call models hosted on Banana
///
/// Credentials come from ~/.banana/config.json or the BANANA_APIKEY and
/// BANANA_MODEL_KEY environment variables. Outputs are printed as JSON.
///
/// Examples:
///   banana run '{"prompt": "a banana"}'         # Run the current model
///   banana start '{"prompt": "x"}' --model sd   # Submit without waiting
///   banana check <CALL_ID>                      # Poll a submitted job once
#[derive(Parser, Debug)]
#[command(author, version = env!("BANANA_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of ~/.banana/config.json
    #[arg(long = "config", short = 'c', value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Fail on 400, 423 and 503 instead of waiting them out
    #[arg(long = "no-retry", global = true)]
    pub no_retry: bool,

    /// Give up retrying after this many seconds (default 300)
    #[arg(long = "deadline", value_name = "SECS", global = true)]
    pub deadline: Option<u64>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a model and wait for its outputs
    Run(CallArgs),

    /// Submit a job and print its call id
    Start(CallArgs),

    /// Check a submitted job once
    Check(CheckArgs),

    /// Show or edit the config file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(clap::Args, Debug)]
pub struct CallArgs {
    /// Model inputs as a JSON document
    #[arg(value_name = "JSON")]
    pub inputs: String,

    /// Registered model name (defaults to the current model)
    #[arg(long = "model", short = 'm', value_name = "NAME")]
    pub model: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    #[arg(value_name = "CALL_ID")]
    pub call_id: String,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigCommand {
    /// Print the config (API key masked)
    Show,
    /// Set the API key
    SetKey { key: String },
    /// Set the base URL
    SetUrl { url: String },
    /// Register a model under a name
    AddModel { name: String, key: String },
    /// Forget a registered model
    RemoveModel { name: String },
    /// Make a registered model the current one
    UseModel { name: String },
}

impl From<ConfigCommand> for ConfigAction {
    fn from(command: ConfigCommand) -> Self {
        match command {
            ConfigCommand::Show => ConfigAction::Show,
            ConfigCommand::SetKey { key } => ConfigAction::SetKey(key),
            ConfigCommand::SetUrl { url } => ConfigAction::SetUrl(url),
            ConfigCommand::AddModel { name, key } => ConfigAction::AddModel { name, key },
            ConfigCommand::RemoveModel { name } => ConfigAction::RemoveModel(name),
            ConfigCommand::UseModel { name } => ConfigAction::UseModel(name),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = banana_dev::runtime::RealRuntime;
    let options = CallOptions {
        config_path: cli.config.clone(),
        no_retry: cli.no_retry,
        deadline: cli.deadline.map(Duration::from_secs),
    };

    let output = match cli.command {
        Commands::Run(args) => {
            commands::run(&runtime, &options, &args.inputs, args.model.as_deref()).await?
        }
        Commands::Start(args) => {
            commands::start(&runtime, &options, &args.inputs, args.model.as_deref()).await?
        }
        Commands::Check(args) => commands::check(&runtime, &options, &args.call_id).await?,
        Commands::Config(command) => {
            commands::config(&runtime, cli.config.as_deref(), command.into())?
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_run_parsing() {
        let cli = Cli::try_parse_from(&["banana", "run", r#"{"a": 1}"#, "--model", "sd"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.inputs, r#"{"a": 1}"#);
                assert_eq!(args.model.as_deref(), Some("sd"));
            }
            _ => panic!("Expected Run command"),
        }
        assert!(!cli.no_retry);
        assert_eq!(cli.deadline, None);
    }

    #[test]
    fn test_cli_global_flags_parsing() {
        let cli = Cli::try_parse_from(&[
            "banana",
            "--config",
            "/tmp/c.json",
            "check",
            "call-1",
            "--no-retry",
            "--deadline",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Check(args) => assert_eq!(args.call_id, "call-1"),
            _ => panic!("Expected Check command"),
        }
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(cli.no_retry);
        assert_eq!(cli.deadline, Some(30));
    }

    #[test]
    fn test_cli_config_parsing() {
        let cli = Cli::try_parse_from(&["banana", "config", "add-model", "sd", "sd-key"]).unwrap();
        match cli.command {
            Commands::Config(command) => assert_eq!(
                ConfigAction::from(command),
                ConfigAction::AddModel {
                    name: "sd".to_string(),
                    key: "sd-key".to_string()
                }
            ),
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_cli_run_requires_inputs() {
        assert!(Cli::try_parse_from(&["banana", "run"]).is_err());
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(&["banana"]).is_err());
    }
}
