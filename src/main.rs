//! CLI entry point for `handoff`.
//!
//! # Architecture overview
//!
//! `main.rs` is a thin coordination layer over the library crate: parse
//! arguments, load config, pick an adapter, and dispatch to one of seven
//! subcommands. All of the actual work — normalizing a session, compressing
//! it, rendering a prompt — lives in the library and has no knowledge of
//! `clap` or stdio.
//!
//! # Configuration merging
//!
//! CLI flags always win; an unset flag falls back to `Config::load()`; an
//! unset config value falls back to the built-in default (auto-select for
//! source, no project filter, clipboard/file-sized budget).
//!
//! # Exit codes
//!
//! `main()` maps every error through `HandoffError::exit_code()` and a bare
//! "nothing detected" condition to `ExitCode::NoAgents`, per the taxonomy in
//! `error.rs`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser as ClapParser, Subcommand};

use agent_handoff::adapters::{all_adapters, auto_select, AgentAdapter};
use agent_handoff::compress::{self, Target};
use agent_handoff::config::Config;
use agent_handoff::error::{ExitCode, HandoffError};
use agent_handoff::model::{CanonicalSession, Source};
use agent_handoff::{enrich, prompt, watcher};

#[derive(ClapParser)]
#[command(name = "handoff", about = "Capture an AI coding session and hand it off to a different assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Source to operate on (claude-code, cursor, codex, copilot, gemini, opencode, droid)
    #[arg(long, global = true)]
    source: Option<Source>,

    /// Restrict to sessions whose project matches this path
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Assistant the resume prompt is tuned for (handoff/resume only)
    #[arg(long, global = true)]
    target: Option<Source>,

    /// Explicit token budget, overriding the per-target default (handoff/resume only)
    #[arg(long, global = true)]
    tokens: Option<u64>,

    /// Print machine-readable JSON instead of human-readable text (detect/list/info)
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug-level logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Enable trace-level logging
    #[arg(long, global = true)]
    trace: bool,

    /// Ignore the config file; all options must be explicit
    #[arg(long, global = true)]
    detached: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List which agent sources are installed on this machine
    Detect,
    /// List sessions for a source (or the auto-selected source)
    List,
    /// Capture one session into `.handoff/session.json`
    Capture {
        /// Session id (defaults to the most recent)
        #[arg(long)]
        session: Option<String>,
        /// Output directory for `.handoff/`
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Capture, compress, and write a resume prompt in one step
    Handoff {
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Rebuild a resume prompt from a previously captured `.handoff/session.json`
    Resume {
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Poll every detected source for session activity
    Watch {
        /// Polling interval in seconds
        #[arg(long, default_value_t = 3)]
        interval: u64,
    },
    /// Print the per-source registry: storage roots, budgets, detection status
    Info,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.trace {
        tracing_subscriber::EnvFilter::new("trace")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match run(cli) {
        Ok(()) => std::process::exit(ExitCode::Success as i32),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code() as i32);
        }
    }
}

fn run(cli: Cli) -> Result<(), HandoffError> {
    let config = if cli.detached { Config::default() } else { Config::load() };

    match cli.command {
        Command::Detect => cmd_detect(cli.json),
        Command::List => cmd_list(&cli),
        Command::Capture { session, output } => {
            cmd_capture(&cli, &config, session.as_deref(), output.as_deref())
        }
        Command::Handoff { session, output } => {
            cmd_handoff(&cli, &config, session.as_deref(), output.as_deref())
        }
        Command::Resume { input } => cmd_resume(&cli, &config, input.as_deref()),
        Command::Watch { interval } => cmd_watch(&cli, interval),
        Command::Info => cmd_info(cli.json),
    }
}

fn cmd_detect(json: bool) -> Result<(), HandoffError> {
    let detected: Vec<_> = all_adapters().into_iter().filter(|a| a.detect()).collect();
    if detected.is_empty() {
        if json {
            println!("[]");
        } else {
            println!("No agent sources detected.");
        }
        return Err(HandoffError::NoAgents("no agent sources detected".to_string()));
    }
    if json {
        let names: Vec<&str> = detected.iter().map(|a| a.source().as_str()).collect();
        println!("{}", serde_json::to_string(&names)?);
    } else {
        for adapter in &detected {
            println!("{}", adapter.source().as_str());
        }
    }
    Ok(())
}

/// Resolve the adapter to operate on: `--source` wins, otherwise auto-select
/// across every detected source.
fn resolve_adapter(cli: &Cli) -> Result<Box<dyn AgentAdapter>, HandoffError> {
    if let Some(source) = cli.source {
        let adapter = all_adapters().into_iter().find(|a| a.source() == source).expect("all sources covered");
        if !adapter.detect() {
            return Err(HandoffError::NoAgents(format!("{source} is not installed on this machine")));
        }
        return Ok(adapter);
    }
    auto_select(cli.project.as_deref()).ok_or_else(|| HandoffError::NoAgents("no agent sources detected".to_string()))
}

fn cmd_list(cli: &Cli) -> Result<(), HandoffError> {
    let adapter = resolve_adapter(cli)?;
    let sessions = adapter.list_sessions(cli.project.as_deref());
    if cli.json {
        println!("{}", serde_json::to_string(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No sessions found for {}.", adapter.source());
        return Ok(());
    }
    for info in sessions {
        println!(
            "{}\t{}\t{} msgs\t{}",
            info.id,
            info.last_active_at.to_rfc3339(),
            info.message_count,
            info.preview
        );
    }
    Ok(())
}

/// Capture one session, enrich its project context in place, and return it.
fn capture_enriched(cli: &Cli, session_id: Option<&str>) -> Result<CanonicalSession, HandoffError> {
    let adapter = resolve_adapter(cli)?;
    let mut session = match session_id {
        Some(id) => adapter.capture(id)?,
        None => adapter.capture_latest(cli.project.as_deref())?,
    };
    let project_path = Path::new(&session.project.path);
    session.project = enrich::enrich(project_path, session.source);
    Ok(session)
}

fn handoff_dir(cli_output: Option<&Path>, config: &Config) -> PathBuf {
    cli_output.map(Path::to_path_buf).or_else(|| config.output_path()).unwrap_or_else(|| PathBuf::from(".handoff"))
}

fn write_session_json(dir: &Path, session: &CanonicalSession) -> Result<(), HandoffError> {
    std::fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(session)?;
    std::fs::write(dir.join("session.json"), json)?;
    Ok(())
}

fn cmd_capture(cli: &Cli, config: &Config, session_id: Option<&str>, output: Option<&Path>) -> Result<(), HandoffError> {
    let session = capture_enriched(cli, session_id)?;
    let dir = handoff_dir(output, config);
    write_session_json(&dir, &session)?;
    println!("Captured {} ({} messages) to {}", session.session_key(), session.conversation.message_count, dir.join("session.json").display());
    Ok(())
}

fn resolve_target(cli: &Cli, config: &Config) -> Option<Source> {
    cli.target.or_else(|| config.target_source())
}

fn render_prompt(session: &CanonicalSession, target: Option<Source>, budget_override: Option<u64>) -> String {
    let target_enum = match target {
        Some(source) => Target::Agent(source),
        None => Target::ClipboardOrFile,
    };
    let budget = compress::resolve_budget(budget_override, &target_enum);
    let compressed = compress::compress(session, budget);
    prompt::build(session, &compressed, target)
}

fn cmd_handoff(cli: &Cli, config: &Config, session_id: Option<&str>, output: Option<&Path>) -> Result<(), HandoffError> {
    let session = capture_enriched(cli, session_id)?;
    let dir = handoff_dir(output, config);
    write_session_json(&dir, &session)?;

    let target = resolve_target(cli, config);
    let rendered = render_prompt(&session, target, cli.tokens);
    std::fs::write(dir.join("RESUME.md"), &rendered)?;
    println!("{rendered}");
    Ok(())
}

fn cmd_resume(cli: &Cli, config: &Config, input: Option<&Path>) -> Result<(), HandoffError> {
    let dir = handoff_dir(input, config);
    let path = if dir.is_file() { dir.clone() } else { dir.join("session.json") };
    let raw = std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            HandoffError::NotFound(format!("no captured session at {}", path.display()))
        } else {
            HandoffError::Io(e)
        }
    })?;
    let session: CanonicalSession = serde_json::from_str(&raw)?;

    let target = resolve_target(cli, config);
    let rendered = render_prompt(&session, target, cli.tokens);
    println!("{rendered}");
    Ok(())
}

fn cmd_watch(cli: &Cli, interval: u64) -> Result<(), HandoffError> {
    let (mut watcher, _guard) = watcher::Watcher::start()?;
    println!("Watching for session activity (interval {interval}s)... Ctrl-C to stop.");
    watcher.run(cli.project.as_deref(), Duration::from_secs(interval), |event| match event {
        watcher::WatchEvent::NewSession { key, info } => {
            println!("[new] {key} ({} msgs) {}", info.message_count, info.preview);
        }
        watcher::WatchEvent::SessionUpdated { key, message_delta, .. } => {
            println!("[update] {key} ({message_delta:+} messages)");
        }
        watcher::WatchEvent::RateLimited { key } => {
            println!("[rate-limit?] {key} has stopped growing after recent activity");
        }
        watcher::WatchEvent::Idle => {}
    });
    Ok(())
}

fn cmd_info(json: bool) -> Result<(), HandoffError> {
    if json {
        let mut entries = Vec::new();
        for adapter in all_adapters() {
            let descriptor = agent_handoff::registry::descriptor(adapter.source());
            entries.push(serde_json::json!({
                "source": descriptor.id.as_str(),
                "displayName": descriptor.display_name,
                "detected": adapter.detect(),
                "contextWindowTokens": descriptor.context_window_tokens,
                "usableBudgetTokens": descriptor.usable_budget_tokens,
                "storageRoot": descriptor.storage_root().map(|p| p.display().to_string()),
            }));
        }
        println!("{}", serde_json::to_string(&entries)?);
        return Ok(());
    }
    for adapter in all_adapters() {
        let descriptor = agent_handoff::registry::descriptor(adapter.source());
        let root = descriptor.storage_root().map(|p| p.display().to_string()).unwrap_or_else(|| "n/a".to_string());
        println!(
            "{}\tdetected={}\tcontext={}\tbudget={}\troot={}",
            descriptor.display_name,
            adapter.detect(),
            descriptor.context_window_tokens,
            descriptor.usable_budget_tokens,
            root,
        );
    }
    Ok(())
}
