use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use tarpot::cli::{Cli, Command};
use tarpot::config;
use tarpot::config::types::AppConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Command::CheckConfig) => {
            let cfg = config::load_config(&cli.config)?;
            println!("Configuration is valid.");
            if cfg.ssh.enabled {
                println!("  SSH listen:    {}", cfg.ssh.listen);
            }
            if cfg.telnet.enabled {
                println!("  Telnet listen: {}", cfg.telnet.listen);
            }
            println!("  Extra users:   {}", cfg.users.len());
            println!(
                "  Rate limit:    {} per {}s per peer",
                cfg.security.max_connections_per_ip, cfg.security.rate_limit_window
            );
            return Ok(());
        }
        Some(Command::Init { output }) => {
            if output.exists() {
                anyhow::bail!("refusing to overwrite existing file: {}", output.display());
            }
            let toml_str = toml::to_string_pretty(&AppConfig::default())?;
            std::fs::write(output, toml_str)?;
            eprintln!("Configuration written to: {}", output.display());
            eprintln!();
            eprintln!("Start the server with:");
            eprintln!("  tarpot -c {}", output.display());
            return Ok(());
        }
        None => {}
    }

    // Missing config file is not an error: the built-in defaults describe a
    // complete deployment.
    let (app_config, from_file) = if cli.config.exists() {
        (config::load_config(&cli.config)?, true)
    } else {
        (AppConfig::default(), false)
    };

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| app_config.logging.level.to_string());
    tarpot::logging::setup_logging(&log_level, app_config.logging.format);

    if !from_file {
        info!(path = %cli.config.display(), "No config file found, using built-in defaults");
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        ssh = %app_config.ssh.listen,
        telnet = %app_config.telnet.listen,
        "Starting tarpot deception server"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        if let Err(e) = tarpot::server::run(app_config).await {
            error!(error = %e, "Server error");
            std::process::exit(1);
        }
    });

    Ok(())
}
