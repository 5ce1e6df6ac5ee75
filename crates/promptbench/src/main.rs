//! Command-line access to the dispatch engine.
//!
//! Reads the API key from `OPENROUTER_API_KEY` (or `OPENROUTER_KEY`), also
//! looking in a `.env` file in the working directory.
//!
//! # Examples
//!
//! ```sh
//! # List the free-tier models requests may target
//! promptbench models
//!
//! # One completion, buffered or streamed as SSE frames
//! promptbench generate --model google/gemma-3-27b-it:free "Write a haiku"
//! promptbench generate --model google/gemma-3-27b-it:free --stream "Write a haiku"
//!
//! # Latency benchmark: one prompt per line, 5 runs each
//! promptbench bench prompts.txt --model google/gemma-3-27b-it:free \
//!   --runs 5 --csv benchmark_results.csv --html report.html
//! ```

use clap::{Parser, Subcommand};
use promptbench::api::SseFrame;
use promptbench::benchmark::parse_prompts;
use promptbench::config::{LogArgs, UpstreamArgs};
use promptbench::report;
use promptbench::{DEFAULT_MAX_TOKENS, GenerationRequest};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing::info;

/// Free-tier OpenRouter completions, streaming, and latency benchmarks.
#[derive(Parser)]
#[command(name = "promptbench", version)]
struct Cli {
    #[command(flatten)]
    upstream: UpstreamArgs,

    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the allowed model identifiers, one per line
    Models,

    /// Send one prompt and print the response
    Generate {
        /// Model identifier (must be free-tier)
        #[arg(long)]
        model: String,

        /// Completion budget
        #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
        max_tokens: u32,

        /// Print SSE frames as they arrive instead of waiting for the result
        #[arg(long)]
        stream: bool,

        /// Prompt text; read from stdin when omitted
        prompt: Option<String>,
    },

    /// Benchmark every line of a prompts file
    Bench {
        /// UTF-8 text file, one prompt per line
        prompts: PathBuf,

        /// Model identifier (must be free-tier)
        #[arg(long)]
        model: String,

        /// Calls per prompt
        #[arg(long, default_value_t = 5)]
        runs: u32,

        /// Write the CSV report here
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write the HTML report here
        #[arg(long)]
        html: Option<PathBuf>,
    },
}

async fn run(cli: Cli) -> Result<(), String> {
    let engine = cli.upstream.connect().await?;

    match cli.command {
        Command::Models => {
            for model in engine.list_models() {
                println!("{model}");
            }
        }

        Command::Generate {
            model,
            max_tokens,
            stream,
            prompt,
        } => {
            let prompt = match prompt {
                Some(p) => p,
                None => {
                    let mut buf = String::new();
                    io::stdin()
                        .read_to_string(&mut buf)
                        .map_err(|e| format!("failed to read stdin: {e}"))?;
                    buf
                }
            };
            let req = GenerationRequest::new(prompt, model).with_max_tokens(max_tokens);

            if stream {
                let mut frames = engine.stream(&req).await.map_err(|e| e.to_string())?;
                let mut stdout = io::stdout();
                while let Some(frame) = frames.next_frame().await {
                    stdout
                        .write_all(frame.encode().as_bytes())
                        .and_then(|()| stdout.flush())
                        .map_err(|e| format!("failed to write to stdout: {e}"))?;
                    if frame.is_terminal() {
                        if let SseFrame::Error(message) = frame {
                            return Err(message);
                        }
                        break;
                    }
                }
            } else {
                let result = engine.generate(&req).await.map_err(|e| e.to_string())?;
                println!("{}", result.text);
                eprintln!(
                    "--- {:.3}s | {} tokens ---",
                    result.latency_seconds,
                    result
                        .tokens_used
                        .map_or_else(|| "?".to_string(), |t| t.to_string())
                );
            }
        }

        Command::Bench {
            prompts,
            model,
            runs,
            csv,
            html,
        } => {
            let text = std::fs::read_to_string(&prompts)
                .map_err(|e| format!("failed to read {}: {e}", prompts.display()))?;
            let prompts = parse_prompts(&text);
            info!("Read {} prompt(s)", prompts.len());

            let bench = engine
                .run_benchmark(&prompts, &model, runs)
                .await
                .map_err(|e| e.to_string())?;
            print!("{}", report::to_table(&bench));

            if let Some(path) = &csv {
                report::write_csv(&bench, path)
                    .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            }
            if let Some(path) = &html {
                let href = csv.as_ref().map(|p| p.to_string_lossy().into_owned());
                std::fs::write(path, report::to_html(&bench, href.as_deref()))
                    .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
                info!("Wrote HTML report to {}", path.display());
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = cli.log.init() {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
