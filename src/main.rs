use anyhow::Result;
use bse_monitor::config::AppConfig;
use bse_monitor::server::ServerBuilder;
use bse_monitor::setup::{self, SetupOptions};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "bse-monitor")]
#[command(about = "BSE watchlists with Telegram alerts and news sentiment", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web service (default)
    Serve {
        /// Overrides HOST
        #[arg(long)]
        host: Option<String>,
        /// Overrides PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Walk through the Twitter and NewsAPI credentials
    Setup {
        #[arg(long)]
        non_interactive: bool,
        #[arg(long, default_value = "env_template.txt")]
        output: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bse_monitor=info,tower_http=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let mut config = AppConfig::load()?;

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            let addr = config.bind_addr();
            ServerBuilder::new().with_config(config).serve(&addr).await
        }
        Command::Setup {
            non_interactive,
            output,
        } => {
            let options = SetupOptions {
                non_interactive,
                output,
            };
            let stdin = std::io::stdin();
            let mut input = stdin.lock();
            let mut out = std::io::stdout();
            setup::run(&config, &options, &mut input, &mut out)?;
            Ok(())
        }
    }
}
