use clap::{Parser, Subcommand};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

/// Fallback config file picked up from the working directory.
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE", global = true)]
    pub config: Option<String>,

    /// Base URL of the answer service
    #[arg(long, env = "RAGBOT_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Give up on a question after this many seconds
    #[arg(long, env = "RAGBOT_TIMEOUT_SECS", global = true)]
    pub timeout_secs: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    pub log_json: Option<bool>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the chat page over HTTP
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT")]
        port: Option<u16>,

        /// Address to bind
        #[arg(long, env = "HOST")]
        host: Option<String>,
    },
    /// Chat interactively in the terminal
    Chat,
    /// Ask a single question and print the reply
    Ask {
        /// The question to ask
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Per-request timeout for the chat routes; unset means none.
    pub request_timeout_secs: Option<u64>,
    /// Sessions idle longer than this are dropped.
    pub session_idle_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    /// Unset means a question waits for as long as the service takes.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<(Self, Cli), config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Parse the command line and build the layered configuration.
    ///
    /// Priority: CLI flag > CLI env var > `RAGBOT_` env > config file > defaults.
    pub fn load_from_args<I, T>(args: I) -> Result<(Self, Cli), config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        let config = Self::from_cli(&cli)?;
        Ok((config, cli))
    }

    pub fn from_cli(cli: &Cli) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.session_idle_secs", 30 * 60)?
            .set_default("backend.base_url", "http://127.0.0.1:8000")?
            .set_default("logging.json", false)?;

        match &cli.config {
            Some(path) => {
                builder = builder.add_source(File::new(path, FileFormat::Yaml).required(true));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder
                    .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));
            }
            None => {}
        }

        // E.g. RAGBOT_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("RAGBOT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(url) = &cli.base_url {
            builder = builder.set_override("backend.base_url", url.as_str())?;
        }
        if let Some(secs) = cli.timeout_secs {
            builder = builder.set_override("backend.timeout_secs", secs)?;
        }
        if let Some(json) = cli.log_json {
            builder = builder.set_override("logging.json", json)?;
        }
        if let Some(Command::Serve { port, host }) = &cli.command {
            if let Some(port) = port {
                builder = builder.set_override("server.port", i64::from(*port))?;
            }
            if let Some(host) = host {
                builder = builder.set_override("server.host", host.as_str())?;
            }
        }

        builder.build()?.try_deserialize()
    }
}
