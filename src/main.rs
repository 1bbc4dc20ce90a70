use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use shipshape::config::{self, Config};
use shipshape::docker::{self, CancelToken, ProcessRunner, SystemRunner};
use shipshape::pipeline::{
    self, LogOptions, Orchestrator, PipelineEvent, PortMapping, RequestOverrides, RunOutcome,
    Verdict,
};
use shipshape::repair::{NoRepair, RepairCollaborator, ScriptRepair};
use shipshape::repo::{self, GitProvider, LocalProvider, RepositoryProvider};

#[derive(Parser)]
#[command(name = "shipshape", version, about)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build and run a repository as a container, repairing on failure.
    Validate(ValidateArgs),
    /// List the Dockerfiles found under a directory.
    Locate {
        dir: PathBuf,
        #[arg(long)]
        depth: Option<usize>,
    },
}

#[derive(Args)]
struct ValidateArgs {
    /// Local path, or with --git an `owner/name` slug or clone URL.
    repository: String,

    /// Clone or pull the repository instead of using a local path.
    #[arg(long)]
    git: bool,

    /// Where --git checkouts live.
    #[arg(long)]
    workspace: Option<PathBuf>,

    #[arg(long)]
    image: Option<String>,

    #[arg(long)]
    platform: Option<String>,

    /// Build file relative to the repository root.
    #[arg(long)]
    dockerfile: Option<String>,

    #[arg(long)]
    container_name: Option<String>,

    /// HOST:CONTAINER[/PROTOCOL]
    #[arg(short = 'p', long = "publish")]
    ports: Vec<PortMapping>,

    /// KEY=VALUE
    #[arg(short = 'e', long = "env", value_parser = pipeline::parse_env_var)]
    env: Vec<(String, String)>,

    /// Command override, shell-style.
    #[arg(long)]
    command: Option<String>,

    #[arg(long)]
    follow: bool,

    #[arg(long)]
    tail: Option<usize>,

    #[arg(long)]
    since: Option<String>,

    #[arg(long)]
    until: Option<String>,

    /// External repair command; receives context JSON on stdin.
    #[arg(long)]
    repair_command: Option<String>,

    /// Repair attempts, at most 3.
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=3))]
    max_attempts: Option<u32>,

    #[arg(long)]
    keep_container: bool,

    /// Print the structured report as JSON instead of the rendered text.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Validate(args) => validate(args),
        Command::Locate { dir, depth } => locate(&dir, depth),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn locate(dir: &Path, depth: Option<usize>) -> Result<ExitCode> {
    let cfg = config::load(&[dir])?;
    let runner = SystemRunner::with_capture_limit(cfg.capture_limit);
    let depth = depth.unwrap_or(cfg.search_depth);
    let found = repo::find_dockerfiles(&runner, dir, depth, &CancelToken::new())?;
    let mut stdout = std::io::stdout().lock();
    for path in found {
        writeln!(stdout, "{}", path.display())?;
    }
    Ok(ExitCode::SUCCESS)
}

fn validate(args: ValidateArgs) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let mut dirs: Vec<&Path> = vec![cwd.as_path()];
    let local_repo = PathBuf::from(&args.repository);
    if !args.git {
        dirs.push(local_repo.as_path());
    }
    let mut cfg = config::load(&dirs)?;
    apply_args(&mut cfg, &args);

    let runner: Arc<dyn ProcessRunner> =
        Arc::new(SystemRunner::with_capture_limit(cfg.capture_limit));
    docker::ensure_available(runner.as_ref(), &cfg.docker_bin)?;

    let repos: Arc<dyn RepositoryProvider> = if args.git {
        let workspace = args
            .workspace
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("shipshape"));
        Arc::new(GitProvider::new(workspace, runner.clone()))
    } else {
        Arc::new(LocalProvider)
    };
    let repair: Arc<dyn RepairCollaborator> = match &cfg.repair_command {
        Some(command) => Arc::new(ScriptRepair::new(
            command,
            cfg.repair_timeout(),
            runner.clone(),
        )?),
        None => Arc::new(NoRepair),
    };

    let log_options = LogOptions {
        tail: cfg.log_tail,
        since: args.since.clone(),
        until: args.until.clone(),
        follow: cfg.follow_logs,
    };
    let overrides = RequestOverrides {
        image_name: args.image.clone(),
        platform: args.platform.clone(),
        dockerfile: args.dockerfile.clone(),
        container_name: args.container_name.clone(),
        ports: args.ports.clone(),
        env: args.env.clone(),
        command: args
            .command
            .as_deref()
            .map(shell_words::split)
            .transpose()
            .context("invalid --command")?,
    };

    let orchestrator =
        Arc::new(Orchestrator::new(cfg, repos, repair, runner).with_log_options(log_options));
    let rx = pipeline::run_pipeline(
        orchestrator,
        args.repository.clone(),
        overrides,
        CancelToken::new(),
    );

    let mut outcome: Option<RunOutcome> = None;
    for event in rx {
        match event {
            PipelineEvent::Log { phase, line } => eprintln!("[{phase}] {line}"),
            PipelineEvent::PassStarted { pass } => eprintln!("--- validation pass {pass} ---"),
            PipelineEvent::RepairStarted { attempt } => {
                eprintln!("--- repair attempt {attempt} ---")
            }
            PipelineEvent::RepairFinished(Ok(attempt)) => {
                for fix in &attempt.fixes_applied {
                    eprintln!("  fix: {fix}");
                }
            }
            PipelineEvent::Completed(done) => {
                outcome = Some(*done);
                break;
            }
            PipelineEvent::PhaseStarted(_)
            | PipelineEvent::PhaseFinished { .. }
            | PipelineEvent::RepairFinished(Err(_)) => {}
        }
    }
    let outcome = outcome.context("pipeline ended without a result")?;

    let mut stdout = std::io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut stdout, &outcome)?;
        writeln!(stdout)?;
    } else {
        write!(stdout, "{}", outcome.report.rendered)?;
    }

    let passed = pipeline::parse_overall_success(&outcome.report.rendered)
        .unwrap_or(outcome.verdict == Verdict::Passed);
    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn apply_args(cfg: &mut Config, args: &ValidateArgs) {
    if let Some(platform) = &args.platform {
        cfg.platform = platform.clone();
    }
    if let Some(tail) = args.tail {
        cfg.log_tail = Some(tail);
    }
    if args.follow {
        cfg.follow_logs = true;
    }
    if args.keep_container {
        cfg.keep_container = true;
    }
    if let Some(command) = &args.repair_command {
        cfg.repair_command = Some(command.clone());
    }
    if let Some(max) = args.max_attempts {
        cfg.max_repair_attempts = max;
    }
}
