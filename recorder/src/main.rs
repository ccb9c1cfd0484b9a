//! `acp`: record and inspect agent traces.
//!
//! `acp demo` drives a scripted mock agent through the recorder and prints the
//! run directory it wrote. `acp show` prints a per-step summary of a run.

use std::path::{Path, PathBuf};

use acp_recorder::core::stop_policy::StopReason;
use acp_recorder::core::types::{RunSpec, RunStatus, StepRecord, Stream};
use acp_recorder::instrument;
use acp_recorder::io::config::{RecorderConfig, load_config};
use acp_recorder::io::trace::load_trace;
use acp_recorder::{Recorder, exit_codes, logging};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use tracing::{info, warn};

/// Fake credential returned by the demo's `read_file` tool.
const DEMO_SECRET: &str = "sk-demo0123456789abcdefghijkl";
/// Longest output preview printed by `acp show`.
const PREVIEW_CHARS: usize = 72;

#[derive(Parser)]
#[command(name = "acp", version, about = "Agent trace recorder")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scripted mock agent and record its trace.
    Demo(DemoArgs),
    /// Print a one-line summary per step of a recorded run.
    Show {
        /// Run directory (`<base>/run_<id>`).
        run_dir: PathBuf,
    },
}

#[derive(Args)]
struct DemoArgs {
    /// Directory that receives the run directory (overrides the config).
    #[arg(long)]
    base_path: Option<PathBuf>,

    /// Recorder config file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fail on recorder misuse instead of warning.
    #[arg(long)]
    strict: bool,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Demo(args) => cmd_demo(args),
        Command::Show { run_dir } => cmd_show(&run_dir),
    }
}

fn cmd_demo(args: DemoArgs) -> Result<i32> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RecorderConfig::default(),
    };
    if let Some(base_path) = args.base_path {
        config.base_path = base_path;
    }
    config.strict |= args.strict;

    let recorder = Recorder::new(config)?;
    let spec = RunSpec::new("demo-v1", "gpt-4-mock").tools(["search_web", "read_file"]);
    let run = recorder.start(&spec)?;

    let outcome = run_demo_agent(&recorder);
    let reason = match &outcome {
        Ok(()) => StopReason::Success,
        Err(err) => {
            warn!(err = %err, "demo agent failed");
            StopReason::Error
        }
    };
    recorder.stop(reason)?;
    outcome?;

    println!("{}", run.dir.display());
    Ok(exit_codes::OK)
}

/// Reason, search, observe, read a file holding a secret, answer.
fn run_demo_agent(recorder: &Recorder) -> Result<()> {
    let mut memory = vec![json!({"role": "user", "content": "Find the secret key."})];
    recorder.update_memory(json!(memory));

    let mut call_llm = instrument::llm(recorder, |prompt: String| {
        info!(%prompt, "llm thinking");
        Ok("I should check the file.".to_string())
    });
    let mut search_web = instrument::tool(recorder, "search_web", 0, |query: String| {
        Ok(format!("Results for {query}: [Page 1, Page 2]"))
    });
    let mut read_file = instrument::tool(recorder, "read_file", 0, |path: String| {
        info!(%path, "reading file");
        Ok(format!("File content: secret_key={DEMO_SECRET}"))
    });

    call_llm("Given history, what next?".to_string())?;
    let result = search_web("secret key file location".to_string())?;

    recorder.within("observe", json!({"observation": result}), |_| {
        memory.push(json!({"role": "tool", "content": result}));
        recorder.update_memory(json!(memory));
        Ok(())
    })?;

    let file_content = read_file("/etc/secrets".to_string())?;

    recorder.within("reason", json!({"thought": "Found it"}), |step| {
        step.set_output("answer", format!("The key is in the file: {file_content}"));
        Ok(())
    })
}

fn cmd_show(run_dir: &Path) -> Result<i32> {
    let trace = load_trace(run_dir)?;
    let meta = &trace.meta;
    println!(
        "{} agent={} llm={} status={} steps={}{}",
        meta.run_id,
        meta.agent_version,
        meta.llm,
        meta.status,
        meta.step_count,
        if meta.truncated { " (truncated)" } else { "" }
    );
    if let Some(reason) = &meta.termination_reason {
        println!("terminated: {reason}");
    }
    for step in &trace.steps {
        let console = if trace.console(step.step_id, Stream::Out)?.is_some()
            || trace.console(step.step_id, Stream::Err)?.is_some()
        {
            " [console]"
        } else {
            ""
        };
        println!("{}{console}", step_line(step));
    }

    Ok(match meta.status {
        RunStatus::Failure => exit_codes::RUN_FAILED,
        RunStatus::Active => exit_codes::RUN_ACTIVE,
        RunStatus::Success | RunStatus::Stopped => exit_codes::OK,
    })
}

fn step_line(step: &StepRecord) -> String {
    format!(
        "{:>4}  {:<8} {:<6} {}",
        step.step_id,
        step.phase,
        step.status.to_string(),
        preview(&step.output)
    )
}

fn preview(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= PREVIEW_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}
