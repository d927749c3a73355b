
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{EvaluationSample, Metric, MetricScores};

/// One judged question: the four scores followed by the sample they were computed from
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub scores: MetricScores,
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub ground_truth: String,
}

impl ScoredRow {
    #[inline]
    pub fn new(sample: EvaluationSample, scores: MetricScores) -> Self {
        Self {
            scores,
            question: sample.question,
            answer: sample.answer,
            contexts: sample.contexts,
            ground_truth: sample.ground_truth,
        }
    }
}

/// On-disk layout. Field order is the CSV column order.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    faithfulness: Option<f64>,
    answer_relevancy: Option<f64>,
    context_recall: Option<f64>,
    context_precision: Option<f64>,
    question: String,
    answer: String,
    /// JSON array of strings
    contexts: String,
    ground_truth: String,
}

impl CsvRow {
    fn from_row(row: &ScoredRow) -> Result<Self> {
        let cell = |v: f64| (!v.is_nan()).then_some(v);
        Ok(Self {
            faithfulness: cell(row.scores.faithfulness),
            answer_relevancy: cell(row.scores.answer_relevancy),
            context_recall: cell(row.scores.context_recall),
            context_precision: cell(row.scores.context_precision),
            question: row.question.clone(),
            answer: row.answer.clone(),
            contexts: serde_json::to_string(&row.contexts)
                .context("Failed to serialize contexts")?,
            ground_truth: row.ground_truth.clone(),
        })
    }

    fn into_row(self) -> Result<ScoredRow> {
        let contexts = serde_json::from_str(&self.contexts)
            .with_context(|| format!("Invalid contexts cell: {}", self.contexts))?;

        Ok(ScoredRow {
            scores: MetricScores {
                faithfulness: self.faithfulness.unwrap_or(f64::NAN),
                answer_relevancy: self.answer_relevancy.unwrap_or(f64::NAN),
                context_recall: self.context_recall.unwrap_or(f64::NAN),
                context_precision: self.context_precision.unwrap_or(f64::NAN),
            },
            question: self.question,
            answer: self.answer,
            contexts,
            ground_truth: self.ground_truth,
        })
    }
}

/// All rows of one evaluation run, in test-set order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoredTable {
    rows: Vec<ScoredRow>,
}

impl ScoredTable {
    #[inline]
    pub fn new(rows: Vec<ScoredRow>) -> Self {
        Self { rows }
    }

    #[inline]
    pub fn rows(&self) -> &[ScoredRow] {
        &self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Arithmetic mean of one metric, skipping NaN cells. NaN when no value is present.
    #[inline]
    pub fn average(&self, metric: Metric) -> f64 {
        let (sum, count) = self
            .rows
            .iter()
            .map(|row| row.scores.get(metric))
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }

    #[inline]
    pub fn averages(&self) -> MetricScores {
        MetricScores {
            faithfulness: self.average(Metric::Faithfulness),
            answer_relevancy: self.average(Metric::AnswerRelevancy),
            context_recall: self.average(Metric::ContextRecall),
            context_precision: self.average(Metric::ContextPrecision),
        }
    }

    /// Rows whose `metric` is at most `threshold`. NaN never qualifies.
    #[inline]
    pub fn at_or_below(&self, metric: Metric, threshold: f64) -> Vec<&ScoredRow> {
        self.rows
            .iter()
            .filter(|row| row.scores.get(metric) <= threshold)
            .collect()
    }

    /// Write the table as CSV, replacing any existing file and creating parent directories
    #[inline]
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create scores file: {}", path.display()))?;

        if self.rows.is_empty() {
            // serde only emits the header alongside the first record
            writer.write_record([
                "faithfulness",
                "answer_relevancy",
                "context_recall",
                "context_precision",
                "question",
                "answer",
                "contexts",
                "ground_truth",
            ])?;
        }

        for row in &self.rows {
            writer
                .serialize(CsvRow::from_row(row)?)
                .context("Failed to write score row")?;
        }
        writer.flush().context("Failed to flush scores file")?;

        info!("Wrote {} scored rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    #[inline]
    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open scores file: {}", path.display()))?;

        let rows = reader
            .deserialize::<CsvRow>()
            .enumerate()
            .map(|(i, record)| {
                record
                    .with_context(|| format!("Malformed row {} in {}", i + 1, path.display()))?
                    .into_row()
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Read {} scored rows from {}", rows.len(), path.display());
        Ok(Self { rows })
    }
}

/// Two decimal places, or `n/a` for a missing value
#[inline]
pub fn format_score(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else {
        format!("{:.2}", value)
    }
}
