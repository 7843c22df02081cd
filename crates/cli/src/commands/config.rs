use clap::Subcommand;
use rotor_core::config::{EndpointSpec, RotorConfig};
use std::path::Path;

use super::utils::{load_config, print_info, print_success, CliError, CliResult};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to config file (defaults to `ROTOR_CONFIG` or config/rotor.toml)
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Show the effective configuration
    Show {
        /// Path to config file (defaults to `ROTOR_CONFIG` or config/rotor.toml)
        #[arg(short, long)]
        file: Option<String>,

        /// Print the merged configuration as TOML instead of a summary
        #[arg(long)]
        raw: bool,
    },

    /// Write the built-in defaults to a configuration file
    Generate {
        /// Output path for the config file
        #[arg(short, long, default_value = rotor_core::config::DEFAULT_CONFIG_PATH)]
        output: String,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(file.as_deref()),
        ConfigCommands::Show { file, raw } => show_config(file.as_deref(), raw),
        ConfigCommands::Generate { output, force } => generate_config(&output, force),
    }
}

fn validate_config(file: Option<&str>) -> CliResult<()> {
    print_info("Loading configuration...");
    let config = load_config(file)?;

    print_info("Validating configuration...");
    config.validate().map_err(CliError::Config)?;

    print_success("Configuration is valid!");
    println!("Configuration Summary:");
    println!("  Preferred providers: {}", config.providers.preferred.len());
    println!("  Fallback providers: {}", config.providers.fallback.len());
    println!("  Fallback cooldown: {} calls", config.rotation.fallback_cooldown_calls);
    println!("  Metrics: {}", if config.metrics.enabled { "enabled" } else { "disabled" });

    Ok(())
}

fn show_config(file: Option<&str>, raw: bool) -> CliResult<()> {
    let config = load_config(file)?;

    if raw {
        print!("{}", render_toml(&config)?);
        return Ok(());
    }

    println!("\n[Rotation]");
    println!("  Fallback Cooldown Calls: {}", config.rotation.fallback_cooldown_calls);
    println!("  Max Consecutive Failures: {}", config.rotation.max_consecutive_failures);
    println!("  Max Fallback Attempts: {}", config.rotation.max_fallback_attempts);
    println!("  Attempt Timeout: {}ms", config.rotation.attempt_timeout_ms);
    println!("  Starting Preferred Index: {}", config.rotation.starting_preferred_index);

    println!("\n[Preferred] ({} providers)", config.providers.preferred.len());
    for spec in &config.providers.preferred {
        println!("  {}", describe_endpoint(spec));
    }

    println!("\n[Fallback] ({} providers)", config.providers.fallback.len());
    for spec in &config.providers.fallback {
        println!("  {}", describe_endpoint(spec));
    }

    println!("\n[Metrics]");
    println!("  Enabled: {}", config.metrics.enabled);

    println!("\n[Logging]");
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);

    Ok(())
}

fn generate_config(output: &str, force: bool) -> CliResult<()> {
    if Path::new(output).exists() && !force {
        return Err(CliError::Config(format!(
            "File {output} already exists. Use --force to overwrite."
        )));
    }

    if let Some(parent) = Path::new(output).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, render_toml(&RotorConfig::default())?)?;

    print_success(&format!("Configuration generated: {output}"));
    Ok(())
}

fn render_toml(config: &RotorConfig) -> CliResult<String> {
    toml::to_string_pretty(config).map_err(|e| CliError::General(e.to_string()))
}

fn describe_endpoint(spec: &EndpointSpec) -> String {
    let EndpointSpec::Detailed(endpoint) = spec else {
        return format!("{} (unlimited)", spec.url());
    };

    let limits: Vec<String> = [
        ("min", endpoint.limit_per_minute),
        ("hour", endpoint.limit_per_hour),
        ("day", endpoint.limit_per_day),
    ]
    .into_iter()
    .filter_map(|(window, limit)| limit.filter(|l| *l > 0).map(|l| format!("{l}/{window}")))
    .collect();

    if limits.is_empty() {
        format!("{} (unlimited)", endpoint.url)
    } else {
        format!("{} ({})", endpoint.url, limits.join(", "))
    }
}
