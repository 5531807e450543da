use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use remedy_core::{
    Incident, InvestigationReport, RemediationOrchestrator, RemedyConfig, SimulatedCluster,
    SimulatedReasoning, SimulatedVerifier,
};
use remedy_actions::{ExecutionMode, Target};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Command::new("remedy")
        .version(remedy_core::VERSION)
        .about("Phase orchestration and action-safety engine for self-healing remediation")
        .arg_required_else_help(true)
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run one investigation cycle against simulated collaborators")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file"),
                )
                .arg(
                    Arg::new("incident")
                        .long("incident")
                        .default_value("inc-demo")
                        .help("Incident id used as correlation id"),
                )
                .arg(
                    Arg::new("namespace")
                        .long("namespace")
                        .default_value("demo")
                        .help("Namespace of the affected deployment"),
                )
                .arg(
                    Arg::new("deployment")
                        .long("deployment")
                        .default_value("web")
                        .help("Affected deployment"),
                )
                .arg(
                    Arg::new("fail-verification")
                        .long("fail-verification")
                        .action(ArgAction::SetTrue)
                        .help("Report the remediation as unhealthy to exercise rollback"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the cycle report as JSON"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("Load and validate a configuration file")
                .arg(
                    Arg::new("path")
                        .long("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file"),
                ),
        );

    let matches = cli.get_matches();
    init_tracing(matches.get_flag("json-logs"));

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let report = simulate(args).await?;
            std::process::exit(if report.succeeded() { 0 } else { 1 });
        }
        Some(("check-config", args)) => {
            let path = args
                .get_one::<PathBuf>("path")
                .context("--path is required")?;
            let config = RemedyConfig::load(path)
                .with_context(|| format!("invalid configuration {}", path.display()))?;
            println!("Configuration OK: {}", path.display());
            println!("  Default mode: {}", config.default_mode);
            println!("  Default max retries: {}", config.phases.default_max_retries);
            println!(
                "  Cooldown window: {}s, {} actions",
                config.cooldown.window_secs, config.cooldown.max_actions_per_window
            );
            println!(
                "  Rollback confidence threshold: {}",
                config.rollback.confidence_threshold
            );
            println!("  Rollback approval required: {}", config.rollback.require_approval);
            println!("  Maintenance interval: {}s", config.maintenance_interval_secs);
        }
        _ => {}
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn simulate(args: &ArgMatches) -> Result<InvestigationReport> {
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => RemedyConfig::load(path)
            .with_context(|| format!("invalid configuration {}", path.display()))?,
        None => RemedyConfig::new(),
    }
    .with_default_mode(ExecutionMode::Simulated);

    let arg = |name: &str| args.get_one::<String>(name).cloned().unwrap_or_default();
    let target = Target::new(arg("namespace"), arg("deployment"));
    let incident = Incident::new(arg("incident"), format!("{target} is failing readiness"), target.clone());
    let verifier = if args.get_flag("fail-verification") {
        SimulatedVerifier::failing()
    } else {
        SimulatedVerifier::healthy()
    };

    let orchestrator = RemediationOrchestrator::new(config)?.with_cluster(Arc::new(SimulatedCluster::new()));
    let maintenance = orchestrator.spawn_maintenance(orchestrator.config().maintenance_interval());
    let report = orchestrator
        .run_investigation(&incident, &SimulatedReasoning::new(target), &verifier)
        .await?;
    maintenance.stop().await;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report)
}

fn print_report(report: &InvestigationReport) {
    println!("Investigation Report");
    println!("====================");
    println!("  Cycle: {}", report.cycle.id);
    println!("  Final phase: {}", report.cycle.phase);
    if let Some(error) = &report.cycle.error {
        println!("  Error: {}", error.message);
    }
    println!();
    println!("Hypotheses:");
    for hypothesis in &report.hypotheses {
        println!("  - {} ({:.0}%)", hypothesis.description, hypothesis.confidence * 100.0);
    }
    println!("Actions:");
    for action in &report.actions {
        let status = if action.success { "ok" } else { "failed" };
        println!("  - {} on {}: {status} ({})", action.kind, action.target, action.message);
    }
    println!("Rollbacks:");
    for assessment in &report.assessments {
        if let Some(decision) = &assessment.decision {
            println!(
                "  - decision: rollback={} confidence={:.2} urgency={} ({})",
                decision.should_rollback, decision.confidence, decision.urgency, decision.reasoning
            );
        }
        if let Some(rollback) = &assessment.rollback {
            println!("    request {}: {}", rollback.id, rollback.status);
        }
    }
}
