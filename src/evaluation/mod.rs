// Evaluation module
// Runs the RAG pipeline over a labelled test set and scores every answer with a judge model


pub mod judge;
pub mod table;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::RagError;
use crate::rag::RagPipeline;

pub use judge::{JudgeScorer, LlmJudge};
pub use table::{ScoredRow, ScoredTable, format_score};

/// A labelled question from the test set file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub question: String,
    pub ground_truth_answer: String,
}

/// Load the JSON test set: an array of objects with `question` and `ground_truth_answer`
#[inline]
pub fn load_test_set(path: &Path) -> Result<Vec<TestCase>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RagError::TestSet(format!(
            "Failed to read test set {}: {}",
            path.display(),
            e
        ))
    })?;

    let cases: Vec<TestCase> = serde_json::from_str(&content).map_err(|e| {
        RagError::TestSet(format!(
            "Failed to parse test set {}: {}",
            path.display(),
            e
        ))
    })?;

    debug!("Loaded {} test cases from {}", cases.len(), path.display());
    Ok(cases)
}

/// One pipeline answer paired with its reference answer, ready for judging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationSample {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub ground_truth: String,
}

/// The four judge scores for one sample, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    pub faithfulness: f64,
    pub answer_relevancy: f64,
    pub context_recall: f64,
    pub context_precision: f64,
}

impl MetricScores {
    #[inline]
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Faithfulness => self.faithfulness,
            Metric::AnswerRelevancy => self.answer_relevancy,
            Metric::ContextRecall => self.context_recall,
            Metric::ContextPrecision => self.context_precision,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Faithfulness,
    AnswerRelevancy,
    ContextRecall,
    ContextPrecision,
}

impl Metric {
    /// Column order of the scored table
    pub const ALL: [Self; 4] = [
        Self::Faithfulness,
        Self::AnswerRelevancy,
        Self::ContextRecall,
        Self::ContextPrecision,
    ];

    /// Column name in the scored table
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Faithfulness => "faithfulness",
            Self::AnswerRelevancy => "answer_relevancy",
            Self::ContextRecall => "context_recall",
            Self::ContextPrecision => "context_precision",
        }
    }

    #[inline]
    pub fn label(self) -> &'static str {
        match self {
            Self::Faithfulness => "Faithfulness",
            Self::AnswerRelevancy => "Answer Relevancy",
            Self::ContextRecall => "Context Recall",
            Self::ContextPrecision => "Context Precision",
        }
    }
}

impl fmt::Display for Metric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown metric '{}'. Expected one of: {}",
                    s,
                    Self::ALL.map(Self::as_str).join(", ")
                )
            })
    }
}

/// Drives the pipeline over a test set and hands the whole batch to the judge
pub struct EvaluationDriver {
    pipeline: RagPipeline,
    judge: Arc<dyn JudgeScorer>,
}

impl EvaluationDriver {
    #[inline]
    pub fn new(pipeline: RagPipeline, judge: Arc<dyn JudgeScorer>) -> Self {
        Self { pipeline, judge }
    }

    /// Answer every question in order. The first failure aborts the run.
    #[inline]
    pub async fn collect_samples(&self, test_set: &[TestCase]) -> Result<Vec<EvaluationSample>> {
        let bar = progress_bar(test_set.len(), "{spinner} [{pos}/{len}] Answering {msg}");
        let mut samples = Vec::with_capacity(test_set.len());

        for (i, case) in test_set.iter().enumerate() {
            bar.set_message(case.question.clone());

            let response = self
                .pipeline
                .answer(&case.question)
                .await
                .with_context(|| format!("Question {} failed: {}", i + 1, case.question))?;

            samples.push(EvaluationSample {
                question: response.question,
                answer: response.answer,
                contexts: response.contexts,
                ground_truth: case.ground_truth_answer.clone(),
            });
            bar.inc(1);
        }

        bar.finish_and_clear();
        Ok(samples)
    }

    /// Run the pipeline and the judge, producing one scored row per test case in input order
    #[inline]
    pub async fn run(&self, test_set: &[TestCase]) -> Result<ScoredTable> {
        info!("Evaluating {} test questions", test_set.len());

        let samples = self.collect_samples(test_set).await?;

        info!("Scoring {} answers with the judge model", samples.len());
        let scores = self
            .judge
            .score_batch(&samples)
            .context("Judge scoring failed")?;

        if scores.len() != samples.len() {
            return Err(RagError::Judge(format!(
                "Judge returned {} score sets for {} samples",
                scores.len(),
                samples.len()
            ))
            .into());
        }

        let rows = samples
            .into_iter()
            .zip(scores)
            .map(|(sample, scores)| ScoredRow::new(sample, scores))
            .collect();

        Ok(ScoredTable::new(rows))
    }
}

fn progress_bar(len: usize, template: &str) -> ProgressBar {
    if console::user_attended_stderr() {
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        ProgressBar::new(len as u64).with_style(style)
    } else {
        ProgressBar::hidden()
    }
}
