//! Command line entry point of the governor.
//!
//! Deploys contracts, routes administrative calls through the configured
//! governance executor and maintains the deployment registry. Every run ends
//! by printing every contract in the registry.

use alloy_primitives::{Address, Bytes};
use clap::{Parser, Subcommand};
use governor_config::Config;
use governor_core::{
	DeployRequest, DispatchCall, DispatchOutcome, Governor, GovernorBuilder, GovernorFactories,
};
use governor_types::ConstructorArg;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Command-line arguments of the governor.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "governor.toml")]
	config: PathBuf,

	/// Network to operate on, overriding `deployer.network`
	#[arg(short, long)]
	network: Option<String>,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// Governance executor, overriding `governance.executor`
	#[arg(short, long)]
	executor: Option<String>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Deploy a contract and record it in the registry
	Deploy {
		/// Artifact name, `Contract` or `path/Contract.sol:Contract`
		artifact: String,
		/// Registry id, defaults to the artifact's contract name
		#[arg(long)]
		id: Option<String>,
		/// Constructor arguments as a JSON array
		#[arg(long, default_value = "[]")]
		args: String,
		/// Treat the last two arguments as `(implementation, initData)`
		#[arg(long)]
		proxy: bool,
		/// Verify the source after deploying
		#[arg(long)]
		verify: bool,
		/// Library to link, `Name=0x...`
		#[arg(long = "library", value_parser = parse_library)]
		libraries: Vec<(String, String)>,
	},
	/// Record a contract deployed elsewhere
	Register {
		id: String,
		address: Address,
		/// Allow verification sweeps to pick the contract up
		#[arg(long)]
		verifiable: bool,
	},
	/// Route calls through the governance executor
	Dispatch {
		#[arg(long = "target", required = true)]
		targets: Vec<Address>,
		#[arg(long = "data", required = true)]
		datas: Vec<Bytes>,
		/// Time-lock execution time per call
		#[arg(long = "time")]
		times: Vec<u64>,
	},
	/// Queue the buffered time-lock actions
	QueueBuffered,
	/// Execute the buffered time-lock actions that are queued
	ExecuteBuffered,
	/// Propose the buffered time-lock actions to the multisig
	ProposeBuffered,
	/// Print the buffered time-lock actions
	DecodeBuffered,
	/// Print the actions queued on the time-lock executor
	DecodeQueued,
	/// Print the calls of the pending multisig proposals
	DecodeSafe,
	/// Verify every eligible contract that is not verified yet
	VerifyAll,
	/// Print the admin and implementation of a proxy
	ProxyInfo { proxy: Address },
	/// Print the registry
	Print,
	/// Remove every registry record
	DeleteDb,
}

fn parse_library(value: &str) -> Result<(String, String), String> {
	let (name, address) = value
		.split_once('=')
		.ok_or_else(|| format!("expected Name=0x..., got '{}'", value))?;
	address
		.parse::<Address>()
		.map_err(|e| format!("invalid address for {}: {}", name, e))?;
	Ok((name.to_string(), address.to_string()))
}

fn parse_args(json: &str) -> Result<Vec<ConstructorArg>, serde_json::Error> {
	serde_json::from_str(json)
}

/// Pairs targets and data with optional execution times, all or none.
fn dispatch_calls(
	targets: Vec<Address>,
	datas: Vec<Bytes>,
	times: Vec<u64>,
) -> Result<Vec<DispatchCall>, governor_core::DispatchError> {
	let times = if times.is_empty() {
		vec![None; targets.len()]
	} else {
		times.into_iter().map(Some).collect()
	};
	DispatchCall::zip(targets, datas, times)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_target(true)
		.init();

	let config_path = args.config.to_string_lossy().to_string();
	let mut config = Config::from_file(&config_path).await?;
	if let Some(network) = &args.network {
		config.deployer.network = network.clone();
	}
	tracing::info!(config = %config_path, network = %config.deployer.network, "Loaded configuration");

	let mut builder = GovernorBuilder::new(config);
	if let Some(executor) = &args.executor {
		builder = builder.with_executor(executor);
	}
	let governor = builder.build(GovernorFactories::default()).await?;

	if let Err(e) = run(&governor, args.command).await {
		tracing::error!(error = %e, "Command failed");
		return Err(e);
	}

	print!("{}", governor.summary().await?);
	Ok(())
}

async fn run(governor: &Governor, command: Command) -> Result<(), Box<dyn std::error::Error>> {
	match command {
		Command::Deploy {
			artifact,
			id,
			args,
			proxy,
			verify,
			libraries,
		} => {
			let mut request = DeployRequest::new(
				id.as_deref()
					.unwrap_or_else(|| governor_types::normalize_library_name(&artifact)),
				parse_args(&args)?,
			);
			request.artifact = artifact;
			request.proxy = proxy;
			request.verify = verify || governor.config().deployer.verify;
			if !libraries.is_empty() {
				request.libraries = Some(libraries.into_iter().collect::<BTreeMap<_, _>>());
			}
			let address = governor.deploy(&request).await?;
			println!("{}: {}", request.id, address.to_checksum(None));
		},
		Command::Register {
			id,
			address,
			verifiable,
		} => governor.register(&id, address, verifiable).await?,
		Command::Dispatch {
			targets,
			datas,
			times,
		} => {
			let calls = dispatch_calls(targets, datas, times)?;
			print_outcome(&governor.dispatch_many(&calls).await?);
		},
		Command::QueueBuffered => {
			let report = governor.queue_buffered().await?;
			println!("Queued {}, skipped {}", report.sent.len(), report.skipped.len());
		},
		Command::ExecuteBuffered => {
			let report = governor.execute_buffered().await?;
			println!("Executed {}, skipped {}", report.sent.len(), report.skipped.len());
		},
		Command::ProposeBuffered => print_outcome(&governor.propose_buffered().await?),
		Command::DecodeBuffered => {
			for entry in governor.decode_buffered().await? {
				println!(
					"{} {} executes {} expires {}",
					entry.action_hash,
					entry.action.target,
					entry.execute_time,
					entry.execute_expire_time
				);
				println!("  {}", entry.action.data);
			}
		},
		Command::DecodeQueued => {
			for action in governor.decode_queued().await? {
				println!("{} at {}: {}", action.target, action.execution_time, action.data);
			}
		},
		Command::DecodeSafe => {
			for call in governor.decode_safe().await? {
				println!("{}", call);
			}
		},
		Command::VerifyAll => {
			let summary = governor.verify_all().await?;
			println!("Verified {}, failed {}", summary.verified, summary.failed);
		},
		Command::ProxyInfo { proxy } => {
			let info = governor.proxy_info(proxy).await?;
			println!("admin: {}", info.admin.to_checksum(None));
			println!("implementation: {}", info.implementation.to_checksum(None));
		},
		Command::Print => {},
		Command::DeleteDb => governor.delete_db().await?,
	}
	Ok(())
}

fn print_outcome(outcome: &DispatchOutcome) {
	match outcome {
		DispatchOutcome::Buffered(hashes) => {
			for hash in hashes {
				println!("Buffered action {}", hash);
			}
		},
		DispatchOutcome::Proposed(hashes) => {
			for hash in hashes {
				println!("Proposed safe transaction {}", hash);
			}
		},
		DispatchOutcome::Submitted(hashes) => {
			for hash in hashes {
				println!("Submitted transaction {}", hash);
			}
		},
		DispatchOutcome::Printed(calls) => {
			for call in calls {
				println!("{}", call);
			}
		},
	}
}
