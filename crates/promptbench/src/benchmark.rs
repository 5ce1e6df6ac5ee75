//! Sequential latency benchmarks.
//!
//! A run sends every prompt `runs` times to one model, one call at a time,
//! and records each call's latency. Trials never overlap so queueing inside
//! this process cannot inflate the numbers. The first failed call aborts
//! the whole run; no partial report is produced.

use crate::DispatchError;
use crate::GenerationRequest;
use crate::api::CompletionClient;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

/// Summary statistics for one prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptStats {
    pub prompt: String,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation (divides by the sample count).
    pub std_dev: f64,
}

impl PromptStats {
    /// Compute stats over `samples`. `None` when there are no samples.
    pub fn from_samples(prompt: impl Into<String>, samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let avg = samples.iter().sum::<f64>() / n;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variance = samples.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / n;
        Some(Self {
            prompt: prompt.into(),
            avg,
            min,
            max,
            std_dev: variance.sqrt(),
        })
    }
}

/// Output of one benchmark run, one entry per input prompt, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub model: String,
    pub runs: u32,
    pub generated_at: DateTime<Utc>,
    pub results: Vec<PromptStats>,
}

/// Split an uploaded prompt file into prompts, one per line.
///
/// Line text is kept verbatim apart from the `\n` or `\r\n` terminator.
/// Lines that are empty or whitespace-only are skipped. Duplicates are kept.
pub fn parse_prompts(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(String::from)
        .collect()
}

/// Drives a [`CompletionClient`] over prompts × runs.
#[derive(Clone)]
pub struct BenchmarkRunner {
    client: CompletionClient,
    max_tokens: u32,
}

impl BenchmarkRunner {
    pub fn new(client: CompletionClient) -> Self {
        Self {
            client,
            max_tokens: crate::DEFAULT_MAX_TOKENS,
        }
    }

    /// Completion budget for every trial.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Benchmark `prompts` against `model`, `runs` calls per prompt.
    ///
    /// Fails with [`DispatchError::InvalidRequest`] when `runs` is zero and
    /// [`DispatchError::InvalidModel`] before any call when the model is not
    /// allowed. Any trial failure is returned as-is.
    pub async fn run<S: AsRef<str>>(
        &self,
        prompts: &[S],
        model: &str,
        runs: u32,
    ) -> Result<BenchmarkReport, DispatchError> {
        if runs == 0 {
            return Err(DispatchError::InvalidRequest(
                "runs must be at least 1".into(),
            ));
        }
        self.client.registry().check(model)?;

        info!(
            "Benchmarking {} prompt(s) x {runs} run(s) on {model}",
            prompts.len()
        );

        let mut results = Vec::with_capacity(prompts.len());
        for (index, prompt) in prompts.iter().enumerate() {
            let prompt = prompt.as_ref();
            let req = GenerationRequest::new(prompt, model).with_max_tokens(self.max_tokens);

            let mut samples = Vec::with_capacity(runs as usize);
            for trial in 1..=runs {
                let result = self.client.complete(&req).await?;
                debug!(
                    "prompt {}/{} trial {trial}/{runs}: {:.3}s",
                    index + 1,
                    prompts.len(),
                    result.latency_seconds
                );
                samples.push(result.latency_seconds);
            }

            if let Some(stats) = PromptStats::from_samples(prompt, &samples) {
                info!(
                    "prompt {}/{}: avg={:.3}s min={:.3}s max={:.3}s std_dev={:.3}s",
                    index + 1,
                    prompts.len(),
                    stats.avg,
                    stats.min,
                    stats.max,
                    stats.std_dev
                );
                results.push(stats);
            }
        }

        Ok(BenchmarkReport {
            model: model.to_string(),
            runs,
            generated_at: Utc::now(),
            results,
        })
    }
}
