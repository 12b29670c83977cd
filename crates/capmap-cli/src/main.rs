//! `capmap` command line: run, validate and export sessions

use anyhow::{bail, Context, Result};
use capmap_core::{
    FileSessionStore, HttpOracle, MemorySessionStore, Orchestrator, PhaseResult, SessionConfig,
    SessionStore, SimulatedOracle,
};
use capmap_search::{registry, EvaluationOracle};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("capmap")
        .version(capmap_core::VERSION)
        .about("Multi-phase MCTS capability mapping")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Run every phase of a session")
                .arg(config_arg())
                .arg(
                    Arg::new("store")
                        .long("store")
                        .value_parser(value_parser!(PathBuf))
                        .help("Session directory (in-memory when omitted)"),
                )
                .arg(
                    Arg::new("simulate")
                        .long("simulate")
                        .action(ArgAction::SetTrue)
                        .help("Use the simulated oracle instead of the HTTP endpoint"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .help("Seed every phase and the simulated oracle"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Check a session document without running it")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("export")
                .about("Print a stored session tree as JSON")
                .arg(
                    Arg::new("session")
                        .long("session")
                        .required(true)
                        .help("Session id"),
                )
                .arg(
                    Arg::new("store")
                        .long("store")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Session directory"),
                )
                .arg(
                    Arg::new("summary")
                        .long("summary")
                        .action(ArgAction::SetTrue)
                        .help("Print aggregate statistics and phase history instead of nodes"),
                ),
        )
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Session YAML document")
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn load_config(args: &ArgMatches) -> Result<SessionConfig> {
    let path = args
        .get_one::<PathBuf>("config")
        .context("missing --config")?;
    SessionConfig::load(path)
        .await
        .with_context(|| format!("loading {}", path.display()))
}

fn oracle_for(config: &SessionConfig, simulate: bool, seed: Option<u64>) -> Result<Arc<dyn EvaluationOracle>> {
    if simulate {
        let seed = seed
            .or_else(|| config.phases.iter().find_map(|p| p.environment.seed))
            .unwrap_or(0);
        return Ok(Arc::new(SimulatedOracle::new(seed)));
    }
    let Some(endpoint) = config
        .phases
        .iter()
        .find_map(|p| p.environment.oracle_endpoint.as_deref())
    else {
        bail!("no environment.oracle_endpoint configured; pass --simulate to run offline");
    };
    tracing::info!("Evaluating against {}", endpoint);
    Ok(Arc::new(HttpOracle::new(endpoint)?))
}

fn print_results(results: &[PhaseResult]) {
    for result in results {
        let aggregate = result
            .final_aggregate
            .map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
        println!(
            "{:<12} {:<10} iterations={:<4} aggregate={:<8} nodes={}",
            result.phase,
            result.state,
            result.iterations,
            aggregate,
            result.snapshot.len()
        );
    }
}

async fn run(args: &ArgMatches) -> Result<()> {
    let mut config = load_config(args).await?;
    let seed = args.get_one::<u64>("seed").copied();
    if let Some(seed) = seed {
        for phase in &mut config.phases {
            phase.environment.seed = Some(seed);
        }
    }
    config.validate()?;

    let oracle = oracle_for(&config, args.get_flag("simulate"), seed)?;
    let store: Arc<dyn SessionStore> = match args.get_one::<PathBuf>("store") {
        Some(dir) => Arc::new(FileSessionStore::new(dir)),
        None => Arc::new(MemorySessionStore::new()),
    };

    let orchestrator = Orchestrator::new(oracle, store);
    match orchestrator.run_session(&config).await {
        Ok(results) => {
            print_results(&results);
            Ok(())
        }
        Err(err) => {
            print_results(&err.results);
            Err(err.into())
        }
    }
}

async fn validate(args: &ArgMatches) -> Result<()> {
    let config = load_config(args).await?;
    config.validate()?;
    let registry = registry::global();
    for name in config.phase_names() {
        let strategies = registry.resolve(name)?;
        println!(
            "{name}: select={} expand={} score={}",
            strategies.select.name(),
            strategies.expand.name(),
            strategies.score.name()
        );
    }
    println!("{}: ok ({} phases)", config.session_id, config.phases.len());
    Ok(())
}

async fn export(args: &ArgMatches) -> Result<()> {
    let session = args
        .get_one::<String>("session")
        .context("missing --session")?;
    let dir = args.get_one::<PathBuf>("store").context("missing --store")?;
    let store = FileSessionStore::new(dir);

    let Some(tree) = store.load(session).await? else {
        bail!("session `{session}` has no stored tree in {}", dir.display());
    };
    let export = tree.export();

    if args.get_flag("summary") {
        let history = store.history(session).await?;
        let document = serde_json::json!({
            "session_id": session,
            "summary": export.summary(),
            "history": history,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        println!("{}", export.to_json_pretty()?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("validate", args)) => validate(args).await,
        Some(("export", args)) => export(args).await,
        _ => unreachable!("subcommand_required"),
    }
}
