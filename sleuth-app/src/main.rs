use anyhow::{Context, Result};
use clap::Parser;
use sleuth_common::observability::{LogConfig, init_logging};
use sleuth_config::{LoggingConfig, SleuthConfig, SleuthConfigLoader};
use sleuth_llm::traits::LlmClient;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
mod wiring;

/// Research assistant: screens the prompt, searches the web, answers with sources.
#[derive(Debug, Parser)]
#[command(name = "sleuth", version)]
struct Cli {
    /// Question to research. Read from stdin when omitted.
    prompt: Option<String>,

    /// YAML config file. Without it, the user config dir's sleuth/sleuth.yaml
    /// and ./sleuth.yaml are merged when present.
    #[arg(long, short, env = "SLEUTH_CONFIG")]
    config: Option<PathBuf>,

    /// Check that the agent and guard models respond, then exit.
    #[arg(long)]
    check: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<SleuthConfig> {
    let loader = match path {
        Some(p) => SleuthConfigLoader::new().with_file(p),
        None => SleuthConfigLoader::new().with_default_files(),
    };
    Ok(loader.load()?)
}

fn log_config(cfg: &LoggingConfig) -> LogConfig {
    let dev = std::env::var("CURRENT_ENV").is_ok_and(|v| v.eq_ignore_ascii_case("dev"));
    LogConfig {
        log_dir: cfg.dir.clone(),
        emit_file: cfg.file || dev,
        format: cfg.format,
        default_filter: cfg.level.clone(),
        ..LogConfig::default()
    }
}

fn read_prompt() -> Result<String> {
    print!("Enter your prompt: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read prompt from stdin")?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // 1) Config (env wins), then logging from it
    let cfg = load_config(cli.config.as_ref())?;
    if let Some(path) = init_logging(log_config(&cfg.logging))? {
        tracing::debug!(path = %path.display(), "logging to file");
    }

    if cli.check {
        let agent_model = wiring::build_agent_model(&cfg.agent)?;
        let guard_model = wiring::build_guard_model(&cfg.guard)?;
        let agent_ok = agent_model.health_check().await?;
        let guard_ok = guard_model.health_check().await?;
        println!("agent model ({}): {}", agent_model.model_name(), status(agent_ok));
        println!("guard model ({}): {}", guard_model.model_name(), status(guard_ok));
        return Ok(if agent_ok && guard_ok {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let prompt = match cli.prompt {
        Some(p) => p,
        None => read_prompt()?,
    };
    if prompt.trim().is_empty() {
        eprintln!("Empty prompt. Exiting.");
        return Ok(ExitCode::FAILURE);
    }

    let wiring = wiring::build(&cfg)?;
    if wiring::screen_prompt(&wiring.gate, &prompt).await?.is_blocked() {
        println!("Prompt is not safe. Exiting.");
        return Ok(ExitCode::FAILURE);
    }

    let response = wiring.agent.run(prompt).await?;
    tracing::info!(
        iterations = response.iterations,
        tools = ?response.tool_calls_made,
        "agent.done"
    );
    println!("model answer: {}", response.content);
    Ok(ExitCode::SUCCESS)
}

fn status(ok: bool) -> &'static str {
    if ok { "ok" } else { "unreachable" }
}
