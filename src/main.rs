use clap::{Args, Parser};
use std::path::PathBuf;
use tracing::info;

use modbus_relay::{setup_logging, ModbusRelay, RelayConfig};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct CommonArgs {
    /// Path to a config file; when omitted, config/{default,RUN_MODE,local}.yaml
    /// plus MODBUS_RELAY_* environment variables are layered per the usual
    /// precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dump default config and exit
    #[arg(long = "dump-default-config")]
    dump_default: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.common.dump_default {
        let config = RelayConfig::default();
        println!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let config = match cli.common.config {
        Some(path) => RelayConfig::from_file(path)?,
        None => RelayConfig::new()?,
    };

    setup_logging(&config)?;

    info!("Starting modbus-relay");

    let relay = std::sync::Arc::new(ModbusRelay::new(config)?);
    relay.run().await?;

    Ok(())
}
