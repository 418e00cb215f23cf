use std::net::SocketAddr;
use std::process;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgMatches, Command};
use log::{debug, error};
use serde_json::Value;
use tokio::net::UdpSocket;

mod commands;

use commands::*;

const MAX_REPLY_SIZE: usize = 65536;

pub(crate) fn cli() -> Command {
    Command::new("ndnfw-cli")
        .version("0.1.0")
        .about("NDN firewall control client")
        .arg(
            Arg::new("server")
                .short('s')
                .long("server")
                .value_name("HOST:PORT")
                .help("Control channel address of ndnfwd")
                .default_value("127.0.0.1:6362")
                .value_parser(value_parser!(SocketAddr))
                .global(true),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("MS")
                .help("Stop waiting after this many milliseconds without a reply")
                .default_value("500")
                .value_parser(value_parser!(u64))
                .global(true),
        )
        .subcommand(
            Command::new("mode")
                .about("Show or change the default policy")
                .subcommand(
                    Command::new("set")
                        .about("Set the default policy")
                        .arg(
                            Arg::new("mode")
                                .required(true)
                                .value_parser(["accept", "drop"])
                                .help("accept or drop"),
                        ),
                ),
        )
        .subcommand(
            Command::new("rules")
                .about("Rule management commands")
                .subcommand_required(true)
                .subcommand(
                    Command::new("list").about("List one rule set").arg(
                        Arg::new("list")
                            .required(true)
                            .value_parser(["white", "black"])
                            .help("white or black"),
                    ),
                )
                .subcommand(rule_edit("append", "Append prefixes to a rule set"))
                .subcommand(rule_edit("delete", "Delete prefixes from a rule set")),
        )
        .subcommand(Command::new("pit").about("Dump the pending Interest table"))
}

fn rule_edit(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(
            Arg::new("policy")
                .required(true)
                .value_parser(["accept", "drop"])
                .help("accept edits the whitelist, drop the blacklist"),
        )
        .arg(
            Arg::new("prefix")
                .required(true)
                .num_args(1..)
                .help("Name prefixes such as /example/video"),
        )
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let matches = cli().get_matches();

    if let Err(e) = run_command(&matches).await {
        error!("Command failed: {:#}", e);
        process::exit(1);
    }
}

async fn run_command(matches: &ArgMatches) -> anyhow::Result<()> {
    let request = match matches.subcommand() {
        Some(("mode", sub_matches)) => mode_request(sub_matches),
        Some(("rules", sub_matches)) => match rules_request(sub_matches) {
            Some(request) => request,
            None => bail!("incomplete rules command"),
        },
        Some(("pit", _)) => pit_request(),
        _ => {
            println!("No command specified. Use --help for usage information.");
            return Ok(());
        }
    };

    let server = *matches
        .get_one::<SocketAddr>("server")
        .context("missing --server")?;
    let timeout = Duration::from_millis(*matches.get_one::<u64>("timeout").context("missing --timeout")?);

    for reply in exchange(server, &request, timeout).await? {
        println!("{}", format_reply(&reply));
    }
    Ok(())
}

/// Send `request` and collect replies until `timeout` passes quietly.
async fn exchange(server: SocketAddr, request: &Value, timeout: Duration) -> anyhow::Result<Vec<Vec<u8>>> {
    let bind: SocketAddr = if server.is_ipv4() {
        "0.0.0.0:0".parse()?
    } else {
        "[::]:0".parse()?
    };
    let socket = UdpSocket::bind(bind).await.context("failed to open UDP socket")?;
    socket
        .send_to(request.to_string().as_bytes(), server)
        .await
        .with_context(|| format!("failed to send to {}", server))?;
    debug!("Sent {} to {}", request, server);

    let mut replies = Vec::new();
    let mut buffer = vec![0u8; MAX_REPLY_SIZE];
    while let Ok(received) = tokio::time::timeout(timeout, socket.recv_from(&mut buffer)).await {
        let (len, peer) = received.context("failed to receive reply")?;
        if peer != server {
            debug!("Ignoring datagram from {}", peer);
            continue;
        }
        replies.push(buffer[..len].to_vec());
    }
    Ok(replies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_exchange_collects_replies() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let responder = tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            let (len, peer) = server.recv_from(&mut buffer).await.unwrap();
            let request: Value = serde_json::from_slice(&buffer[..len]).unwrap();
            assert_eq!(request, json!({ "get": { "mode": [] } }));
            server.send_to(br#"{"mode":"accept"}"#, peer).await.unwrap();
            server.send_to(br#"{"whitelist":[]}"#, peer).await.unwrap();
        });

        let request = json!({ "get": { "mode": [] } });
        let replies = exchange(addr, &request, Duration::from_millis(300)).await.unwrap();
        responder.await.unwrap();

        assert_eq!(replies.len(), 2);
        assert_eq!(format_reply(&replies[0]), "mode: accept");
    }

    #[tokio::test]
    async fn test_exchange_without_server_times_out_empty() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();
        let replies = exchange(addr, &json!({}), Duration::from_millis(50)).await.unwrap();
        assert!(replies.is_empty());
    }
}
