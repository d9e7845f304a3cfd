//! [`LanguageModelScorer`] backed by the SRILM command-line tools.
//!
//! Training runs `ngram-count` once per order; scoring runs `ngram` once per
//! call with the five models mixed via `-lambda` / `-mix-lmN` /
//! `-mix-lambdaN`, and `-debug 1` so that a perplexity is reported for
//! every line as well as for the whole file.
//!
//! Every invocation is bounded by [`SrilmConfig::timeout_seconds`]; the
//! child is killed when the deadline passes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::error::SearchError;
use crate::scorer::{LanguageModelScorer, PerplexityReport};
use crate::types::{MixtureModelSet, MixtureWeights, Perplexity, MIXTURE_ORDERS};

/// Configuration for the SRILM binaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SrilmConfig {
    /// Directory containing `ngram` and `ngram-count`. If `None`, both are
    /// looked up on `PATH`.
    pub bin_dir: Option<PathBuf>,
    /// Time limit for a single invocation, in seconds.
    pub timeout_seconds: u64,
    /// Smoothing option passed to `ngram-count` (without the leading dash).
    pub discount: String,
}

impl Default for SrilmConfig {
    fn default() -> Self {
        Self {
            bin_dir: None,
            timeout_seconds: 30,
            discount: "wbdiscount".to_owned(),
        }
    }
}

impl SrilmConfig {
    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.timeout_seconds == 0 {
            return Err(SearchError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.discount.trim().is_empty() {
            return Err(SearchError::Config("discount must not be empty".into()));
        }
        Ok(())
    }
}

/// Runs SRILM's `ngram-count` and `ngram` as child processes.
#[derive(Debug, Clone)]
pub struct SrilmScorer {
    ngram: PathBuf,
    ngram_count: PathBuf,
    timeout: Duration,
    discount: String,
}

impl SrilmScorer {
    /// Resolves the SRILM binaries described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the configuration is invalid or,
    /// when no `bin_dir` is set, a binary is not on `PATH`.
    pub fn new(config: &SrilmConfig) -> Result<Self, SearchError> {
        config.validate()?;
        let locate = |name: &str| -> Result<PathBuf, SearchError> {
            match config.bin_dir {
                Some(ref dir) => Ok(dir.join(name)),
                None => which::which(name)
                    .map_err(|e| SearchError::Config(format!("cannot find {name} on PATH: {e}"))),
            }
        };
        let scorer = Self {
            ngram: locate("ngram")?,
            ngram_count: locate("ngram-count")?,
            timeout: Duration::from_secs(config.timeout_seconds),
            discount: config.discount.clone(),
        };
        tracing::debug!(
            ngram = %scorer.ngram.display(),
            ngram_count = %scorer.ngram_count.display(),
            "SRILM scorer ready"
        );
        Ok(scorer)
    }

    /// Arguments for `ngram-count` training one model.
    fn train_args(&self, text: &Path, order: u8, model: &Path) -> Vec<OsString> {
        vec![
            "-order".into(),
            order.to_string().into(),
            "-no-sos".into(),
            "-no-eos".into(),
            format!("-{}", self.discount).into(),
            "-text".into(),
            text.into(),
            "-lm".into(),
            model.into(),
        ]
    }

    /// Arguments for `ngram` scoring `text` against the mixture.
    fn score_args(
        &self,
        text: &Path,
        models: &MixtureModelSet,
        weights: &MixtureWeights,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-order".into(),
            MIXTURE_ORDERS[0].to_string().into(),
            "-no-sos".into(),
            "-no-eos".into(),
        ];
        for (slot, order) in MIXTURE_ORDERS.into_iter().enumerate() {
            let (lm_flag, lambda_flag) = if slot == 0 {
                ("-lm".to_owned(), "-lambda".to_owned())
            } else {
                (format!("-mix-lm{}", slot + 1), format!("-mix-lambda{}", slot + 1))
            };
            let weight = weights.for_order(order).unwrap_or_default();
            args.push(lm_flag.into());
            args.push(models.path(order).into());
            args.push(lambda_flag.into());
            args.push(weight.to_string().into());
        }
        for arg in ["-debug", "1", "-ppl"] {
            args.push(arg.into());
        }
        args.push(text.into());
        args
    }
}

impl LanguageModelScorer for SrilmScorer {
    async fn train(&self, text: &Path, order: u8, model: &Path) -> Result<(), SearchError> {
        let mut cmd = Command::new(&self.ngram_count);
        cmd.args(self.train_args(text, order, model));
        run_with_timeout(cmd, self.timeout).await?;
        Ok(())
    }

    async fn score(
        &self,
        text: &Path,
        models: &MixtureModelSet,
        weights: &MixtureWeights,
    ) -> Result<PerplexityReport, SearchError> {
        let mut cmd = Command::new(&self.ngram);
        cmd.args(self.score_args(text, models, weights));
        let output = run_with_timeout(cmd, self.timeout).await?;
        parse_report(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Run `cmd` to completion within `deadline`, killing it on expiry.
///
/// # Errors
///
/// Returns [`SearchError::ScorerUnavailable`] if the process cannot be
/// spawned, exits unsuccessfully, or times out.
pub async fn run_with_timeout(mut cmd: Command, deadline: Duration) -> Result<Output, SearchError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let child = cmd
        .spawn()
        .map_err(|e| SearchError::ScorerUnavailable(format!("failed to spawn {program}: {e}")))?;

    let output = tokio::time::timeout(deadline, child.wait_with_output())
        .await
        .map_err(|_| {
            tracing::warn!(%program, timeout_secs = deadline.as_secs(), "scorer timed out");
            SearchError::ScorerUnavailable(format!(
                "{program} timed out after {}s",
                deadline.as_secs()
            ))
        })?
        .map_err(|e| SearchError::ScorerUnavailable(format!("{program} failed: {e}")))?;

    tracing::trace!(
        %program,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "scorer invocation finished"
    );

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.lines().next().unwrap_or("").trim();
        return Err(SearchError::ScorerUnavailable(format!(
            "{program} exited with code {code}: {detail}"
        )));
    }
    Ok(output)
}

fn ppl1_pattern() -> &'static Regex {
    static PPL1: OnceLock<Regex> = OnceLock::new();
    PPL1.get_or_init(|| {
        Regex::new(r"^\d+ zeroprobs,.*\bppl1=\s*(\S+)")
            .unwrap_or_else(|_| unreachable!("valid regex"))
    })
}

/// Parse the output of `ngram -debug 1 -ppl`.
///
/// Each scored line produces a block of the echoed line text, a counts line
/// and a `zeroprobs, ... ppl1=` statistics line. The file summary closes the
/// report with one more statistics line. Only statistics lines are read, so
/// echoed corpus text never affects the result: the last one is the overall
/// perplexity and the rest are per-line, in order.
///
/// # Errors
///
/// Returns [`SearchError::ScorerUnavailable`] if there is no statistics line
/// or a perplexity cannot be parsed.
pub fn parse_report(output: &str) -> Result<PerplexityReport, SearchError> {
    let mut lines = output
        .lines()
        .filter_map(|line| ppl1_pattern().captures(line))
        .map(|caps| caps[1].parse::<Perplexity>())
        .collect::<Result<Vec<_>, _>>()?;

    let overall = lines.pop().ok_or_else(|| {
        SearchError::ScorerUnavailable("scorer report has no file summary".into())
    })?;
    Ok(PerplexityReport { lines, overall })
}
