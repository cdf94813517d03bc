use alloy::primitives::{Address, B256};
use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use eth_orchestrator::ethereum::{utils, Filter, Log};
use eth_orchestrator::service::LATEST;
use eth_orchestrator::{Config, EthereumService, FilterWatch, Response};
use serde::Serialize;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("generate-config", _)) => {
            println!("{}", Config::generate_sample());
            return Ok(());
        }
        Some(("config-path", _)) => match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        },
        _ => {}
    }

    let config = load_config(&matches).await?;
    let service = EthereumService::from_config(&config, None)?;
    info!("Default network: {}", config.default_network);

    let outcome = run_command(&service, &matches).await;
    service.close().await;
    outcome
}

fn cli() -> Command {
    Command::new("eth-orchestrator")
        .version("0.1.0")
        .about("Pooled JSON-RPC calls, filter watches and Solidity compilation for Ethereum nodes")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("network")
                .short('n')
                .long("network")
                .value_name("NETWORK")
                .global(true)
                .help("Network to use (local, sepolia, or any configured name)"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .global(true)
                .help("RPC endpoint URL"),
        )
        .arg(
            Arg::new("pool-size")
                .short('p')
                .long("pool-size")
                .value_name("N")
                .global(true)
                .value_parser(clap::value_parser!(usize))
                .help("Number of executor workers"),
        )
        .subcommand(Command::new("block-number").about("Print the latest block number"))
        .subcommand(Command::new("accounts").about("List accounts managed by the node"))
        .subcommand(
            Command::new("balance")
                .about("Print the balance of an address")
                .arg(Arg::new("address").required(true).value_name("ADDRESS"))
                .arg(
                    Arg::new("tag")
                        .long("tag")
                        .value_name("TAG")
                        .default_value(LATEST)
                        .help("Block tag: latest, pending, earliest or a block number"),
                ),
        )
        .subcommand(
            Command::new("send-raw")
                .about("Submit a signed, RLP-encoded transaction")
                .arg(Arg::new("hex").required(true).value_name("HEX")),
        )
        .subcommand(
            Command::new("compile")
                .about("Compile a Solidity source file")
                .arg(Arg::new("file").required(true).value_name("FILE")),
        )
        .subcommand(
            Command::new("watch-logs")
                .about("Stream new logs until interrupted")
                .arg(
                    Arg::new("address")
                        .long("address")
                        .value_name("ADDRESS")
                        .help("Only logs emitted by this contract"),
                ),
        )
        .subcommand(Command::new("watch-blocks").about("Stream new block hashes until interrupted"))
        .subcommand(
            Command::new("watch-pending")
                .about("Stream pending transaction hashes until interrupted"),
        )
        .subcommand(
            Command::new("generate-config").about("Print a sample configuration file and exit"),
        )
        .subcommand(
            Command::new("config-path").about("Print the default configuration file path and exit"),
        )
}

async fn load_config(matches: &ArgMatches) -> Result<Config> {
    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let mut config = Config::load_or_default(config_path).await;

    // Override with command line arguments
    if let Some(network) = matches.get_one::<String>("network") {
        config.default_network = network.clone();
    }

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        let network = config.default_network.clone();
        let network_config = config
            .default_network_config_mut()
            .ok_or_else(|| anyhow!("Network '{}' is not configured", network))?;
        network_config.rpc_url = rpc_url.clone();
    }

    if let Some(pool_size) = matches.get_one::<usize>("pool-size") {
        config.executor.pool_size = *pool_size;
    }

    config.validate()?;
    Ok(config)
}

async fn run_command(service: &EthereumService, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("block-number", _)) => print_response(&service.get_block_number().await),
        Some(("accounts", _)) => print_response(&service.get_accounts().await),
        Some(("balance", args)) => {
            let address = parse_address(args, "address")?;
            let tag = block_tag(
                args.get_one::<String>("tag")
                    .map(String::as_str)
                    .unwrap_or(LATEST),
            )?;
            print_response(&service.get_balance(address, &tag).await)
        }
        Some(("send-raw", args)) => {
            let encoded = required(args, "hex")?;
            print_response(&service.send_raw_transaction(encoded).await)
        }
        Some(("compile", args)) => {
            let path = required(args, "file")?;
            let source = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| anyhow!("Failed to read source file {}: {}", path, e))?;
            let response = service.compile_solidity(source).await.map(|output| {
                output
                    .contracts()
                    .map(|c| {
                        (
                            c.name.clone(),
                            serde_json::json!({
                                "abi": c.abi,
                                "bytecode": format!("0x{}", hex::encode(&c.bytecode)),
                            }),
                        )
                    })
                    .collect::<serde_json::Map<_, _>>()
            });
            print_response(&response)
        }
        Some(("watch-logs", args)) => {
            let mut filter = Filter::new();
            if args.contains_id("address") {
                filter = filter.address(parse_address(args, "address")?);
            }
            let watch = service
                .watch_logs(filter, |batch: Response<Vec<Log>>| {
                    let _ = print_response(&batch);
                })
                .await;
            stream_until_interrupted(watch).await
        }
        Some(("watch-blocks", _)) => {
            let watch = service
                .watch_blocks(|batch: Response<Vec<B256>>| {
                    let _ = print_response(&batch);
                })
                .await;
            stream_until_interrupted(watch).await
        }
        Some(("watch-pending", _)) => {
            let watch = service
                .watch_pending_transactions(|batch: Response<Vec<B256>>| {
                    let _ = print_response(&batch);
                })
                .await;
            stream_until_interrupted(watch).await
        }
        Some((other, _)) => Err(anyhow!("Unknown command '{}'", other)),
        None => Err(anyhow!("No command given")),
    }
}

/// Block until Ctrl-C or until the watch stops by itself, then clean up.
async fn stream_until_interrupted(watch: Response<FilterWatch>) -> Result<()> {
    let watch = match watch.into_result() {
        Ok(watch) => watch,
        Err(e) => {
            print_response(&Response::<()>::failure(e.clone()))?;
            return Err(e.into());
        }
    };
    info!(filter_id = %watch.handle().id, "Watching; press Ctrl-C to stop");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| anyhow!("Failed to listen for Ctrl-C: {}", e))?;
            info!("Interrupted, uninstalling filter");
            watch.cancel_and_wait().await;
        }
        state = watch.stopped() => {
            error!("Watch stopped: {:?}", state);
        }
    }
    Ok(())
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing argument '{}'", name))
}

fn parse_address(args: &ArgMatches, name: &str) -> Result<Address> {
    utils::validate_address(required(args, name)?)
}

/// Named tags pass through; block numbers become hex quantities.
fn block_tag(tag: &str) -> Result<String> {
    match tag {
        "latest" | "pending" | "earliest" | "safe" | "finalized" => Ok(tag.to_string()),
        number => Ok(format!("{:#x}", utils::parse_quantity(number)?)),
    }
}

fn print_response<T: Serialize>(response: &Response<T>) -> Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| anyhow!("Failed to serialize response: {}", e))?;
    println!("{}", json);
    Ok(())
}
