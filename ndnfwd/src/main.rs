use std::fs::OpenOptions;
use std::process;

use anyhow::Context;
use clap::{value_parser, Arg, Command};
use log::{error, info};

use ndnfw_core::Mode;

mod config;
mod control;
mod daemon;

use config::Config;
use daemon::Daemon;

pub(crate) fn cli() -> Command {
    Command::new("ndnfwd")
        .version("0.1.0")
        .about("NDN firewall - filters Interests between downstream faces and an upstream forwarder")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/ndnfw/ndnfwd.toml"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("Default policy for unmatched names: accept or drop")
                .value_parser(value_parser!(Mode)),
        )
        .arg(
            Arg::new("whitelist-size")
                .short('w')
                .long("whitelist-size")
                .value_name("N")
                .help("Maximum number of whitelist rules")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("blacklist-size")
                .short('b')
                .long("blacklist-size")
                .value_name("N")
                .help("Maximum number of blacklist rules")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("pit-size")
                .long("pit-size")
                .value_name("N")
                .help("Maximum number of pending Interest entries")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("local-port")
                .long("local-port")
                .value_name("PORT")
                .help("TCP port for downstream faces")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("command-port")
                .long("command-port")
                .value_name("PORT")
                .help("UDP port for the control channel")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("remote-address")
                .long("remote-address")
                .value_name("IP")
                .help("Upstream forwarder address"),
        )
        .arg(
            Arg::new("remote-port")
                .long("remote-port")
                .value_name("PORT")
                .help("Upstream forwarder TCP port")
                .value_parser(value_parser!(u16)),
        )
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let env = env_logger::Env::default().default_filter_or(config.logging.level.as_str());
    let mut builder = env_logger::Builder::from_env(env);

    if let Some(path) = &config.logging.file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    Ok(())
}

fn load_config() -> anyhow::Result<Config> {
    let matches = cli().get_matches();
    let config_path = matches
        .get_one::<String>("config")
        .context("missing --config value")?;

    let mut config = Config::load(config_path)?;
    config.apply_args(&matches);
    config.validate()?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config) {
        eprintln!("Failed to initialise logging: {:#}", e);
        process::exit(1);
    }

    info!("Starting NDN firewall in {} mode", config.firewall.mode);

    if let Err(e) = Daemon::new(config).run().await {
        error!("NDN firewall stopped: {:#}", e);
        process::exit(1);
    }

    info!("NDN firewall stopped");
}
