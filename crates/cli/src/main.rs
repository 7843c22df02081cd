use clap::{Parser, Subcommand};
use rotor_core::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
use commands::{
    handle_config_command,
    rpc::{self, parse_params},
    utils::{load_config, print_error, CliResult},
    ConfigCommands, Session,
};

#[derive(Parser)]
#[command(name = "rotor-cli")]
#[command(about = "Rotor CLI - send JSON-RPC calls through the provider rotation engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (defaults to `ROTOR_CONFIG` or config/rotor.toml)
    #[arg(short, long = "config", global = true)]
    config_path: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a JSON-RPC method and print its result
    Call {
        /// Method name, e.g. `eth_blockNumber`
        method: String,

        /// Parameters as a JSON array
        #[arg(short, long)]
        params: Option<String>,
    },

    /// Send a raw JSON-RPC payload and print the full response
    Send {
        /// Request object, e.g. '{"method":"eth_chainId"}'
        payload: String,
    },

    /// Run a batch of calls and print the router's state
    Stats {
        /// Method to call
        #[arg(short, long, default_value = "eth_blockNumber")]
        method: String,

        /// Parameters as a JSON array
        #[arg(short, long)]
        params: Option<String>,

        /// Number of calls to make
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Also print Prometheus metrics
        #[arg(long)]
        metrics: bool,
    },

    /// Configuration Management
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Installs the global subscriber. Logs go to stderr so command output stays parseable.
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,rotor_core={level},cli={level}", level = config.level))
    });

    let registry = tracing_subscriber::registry().with(filter);

    if config.format.as_str() == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr);
        registry.with(fmt_layer).init();
    } else {
        // "pretty" and any other format default to pretty logging
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_writer(std::io::stderr);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Config(command) => handle_config_command(command),
        command => run(command, cli.config_path.as_deref()).await,
    };

    if let Err(e) = outcome {
        print_error(&e.to_string());
        return Err(e.into());
    }
    Ok(())
}

async fn run(command: Commands, config_path: Option<&str>) -> CliResult<()> {
    let config = load_config(config_path)?;
    init_logging(&config.logging);
    let session = Session::from_config(&config)?;

    match command {
        Commands::Call { method, params } => {
            rpc::call(&session, &method, parse_params(params.as_deref())?).await
        }
        Commands::Send { payload } => rpc::send(&session, &payload).await,
        Commands::Stats { method, params, count, metrics } => {
            rpc::stats(&session, &method, parse_params(params.as_deref())?, count, metrics).await
        }
        Commands::Config(command) => handle_config_command(command),
    }
}
