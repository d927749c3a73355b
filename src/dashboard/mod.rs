// Results dashboard
// Terminal viewer for the scored table written by an evaluation run


use std::path::Path;

use anyhow::Result;
use console::{Term, style};
use dialoguer::{Input, Select};
use tracing::{debug, warn};

use crate::evaluation::{Metric, ScoredRow, ScoredTable, format_score};

pub const DEFAULT_METRIC: Metric = Metric::Faithfulness;
pub const DEFAULT_THRESHOLD: f64 = 0.7;
/// Rows shown per page of the full results listing
pub const PAGE_SIZE: usize = 10;

pub const NO_DATA_MESSAGE: &str = "No data found. Please run `rag-eval evaluate` first.";
pub const ALL_PASSED_MESSAGE: &str = "No questions found below this threshold. Good job!";

const PREVIEW_CHARS: usize = 120;

/// A scored table as the dashboard sees it. Loading never fails; problems become a warning.
#[derive(Debug, Clone, Default)]
pub struct LoadedTable {
    pub table: ScoredTable,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// The table is missing, unreadable or has no rows
    NoData,
    /// Rows exist but none is at or below the threshold
    AllPassed,
    Rows(Vec<ScoredRow>),
}

/// Read the scored table, substituting an empty one with a warning if it is missing or malformed
#[inline]
pub fn load_table(path: &Path) -> LoadedTable {
    if !path.exists() {
        let warning = format!(
            "Results file not found at {}. Showing an empty table.",
            path.display()
        );
        warn!("{}", warning);
        return LoadedTable {
            table: ScoredTable::default(),
            warning: Some(warning),
        };
    }

    match ScoredTable::read_csv(path) {
        Ok(table) => {
            debug!("Dashboard loaded {} rows", table.len());
            LoadedTable {
                table,
                warning: None,
            }
        }
        Err(e) => {
            let warning = format!(
                "Could not read results file {}: {:#}. Showing an empty table.",
                path.display(),
                e
            );
            warn!("{}", warning);
            LoadedTable {
                table: ScoredTable::default(),
                warning: Some(warning),
            }
        }
    }
}

/// Re-read the table from disk and keep the rows with `metric <= threshold`
#[inline]
pub fn filter_failing(path: &Path, metric: Metric, threshold: f64) -> FilterOutcome {
    let loaded = load_table(path);
    if loaded.table.is_empty() {
        return FilterOutcome::NoData;
    }

    let rows: Vec<ScoredRow> = loaded
        .table
        .at_or_below(metric, threshold)
        .into_iter()
        .cloned()
        .collect();

    if rows.is_empty() {
        FilterOutcome::AllPassed
    } else {
        FilterOutcome::Rows(rows)
    }
}

#[inline]
pub fn parse_threshold(input: &str) -> Result<f64> {
    let value: f64 = input
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("'{}' is not a number", input.trim()))?;

    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(anyhow::anyhow!("Threshold must be between 0.0 and 1.0"))
    }
}

#[inline]
pub fn page_count(rows: usize) -> usize {
    rows.div_ceil(PAGE_SIZE).max(1)
}

/// Rows on zero-based page `page`; empty past the end
#[inline]
pub fn page(rows: &[ScoredRow], page: usize) -> &[ScoredRow] {
    let start = page.saturating_mul(PAGE_SIZE).min(rows.len());
    let end = start.saturating_add(PAGE_SIZE).min(rows.len());
    rows.get(start..end).unwrap_or_default()
}

/// The four average-metric cards
#[inline]
pub fn render_averages(table: &ScoredTable) -> String {
    let averages = table.averages();
    let lines: Vec<String> = Metric::ALL
        .iter()
        .map(|metric| {
            format!(
                "  {:<18} {}",
                format!("{}:", metric.label()),
                style(format_score(averages.get(*metric))).bold().cyan()
            )
        })
        .collect();

    join_lines(&lines)
}

/// Failing rows with the selected metric's value and the full question context
#[inline]
pub fn render_failing(rows: &[ScoredRow], metric: Metric) -> String {
    let mut lines = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        lines.push(format!(
            "{} {}",
            style(format!("#{}", i + 1)).bold(),
            style(&row.question).bold()
        ));
        lines.push(format!(
            "    {}: {}",
            metric.as_str(),
            style(format_score(row.scores.get(metric))).red()
        ));
        lines.push(format!("    Answer: {}", preview(&row.answer)));
        lines.push(format!("    Ground truth: {}", preview(&row.ground_truth)));
        lines.extend(
            row.contexts
                .iter()
                .enumerate()
                .map(|(n, context)| format!("    Context {}: {}", n + 1, preview(context))),
        );
        lines.push(String::new());
    }

    join_lines(&lines)
}

/// One page of the full results listing
#[inline]
pub fn render_full_results(rows: &[ScoredRow], page_index: usize) -> String {
    let offset = page_index * PAGE_SIZE;
    let mut lines = vec![format!(
        "{:>4}  {:>6} {:>6} {:>6} {:>6}  Question",
        "#", "faith", "relev", "recall", "prec"
    )];

    lines.extend(page(rows, page_index).iter().enumerate().map(|(i, row)| {
        format!(
            "{:>4}  {:>6} {:>6} {:>6} {:>6}  {}",
            offset + i + 1,
            format_score(row.scores.faithfulness),
            format_score(row.scores.answer_relevancy),
            format_score(row.scores.context_recall),
            format_score(row.scores.context_precision),
            preview(&row.question)
        )
    }));
    lines.push(format!(
        "Page {} of {} ({} rows)",
        page_index + 1,
        page_count(rows.len()),
        rows.len()
    ));

    join_lines(&lines)
}

/// Newline-terminated lines, ready for `Term::write_str`
fn join_lines(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{}…", cut)
    }
}

/// Interactive terminal dashboard over the scored table at `path`
#[inline]
pub fn run_dashboard(path: &Path) -> Result<()> {
    let term = Term::stdout();
    let mut metric = DEFAULT_METRIC;
    let mut threshold = DEFAULT_THRESHOLD;

    loop {
        let loaded = load_table(path);

        term.write_line(&format!(
            "{}",
            style("⚖️  RAG Evaluation Dashboard").bold().cyan()
        ))?;
        term.write_line("")?;

        if let Some(warning) = &loaded.warning {
            term.write_line(&format!("{}", style(format!("⚠ {}", warning)).yellow()))?;
        }

        if loaded.table.is_empty() {
            term.write_line(&format!("{}", style(NO_DATA_MESSAGE).yellow()))?;
            return Ok(());
        }

        term.write_line(&format!("{}", style("Average Scores").bold().yellow()))?;
        term.write_str(&render_averages(&loaded.table))?;
        term.write_line("")?;

        let actions = [
            "Failed Question Analysis",
            "Detailed Full Results",
            "Reload",
            "Quit",
        ];
        let choice = Select::new()
            .with_prompt("What would you like to see?")
            .items(&actions[..])
            .default(0)
            .interact()?;

        match choice {
            0 => {
                (metric, threshold) = prompt_filter(metric, threshold)?;
                term.write_line("")?;
                match filter_failing(path, metric, threshold) {
                    FilterOutcome::NoData => {
                        term.write_line(&format!("{}", style(NO_DATA_MESSAGE).yellow()))?;
                    }
                    FilterOutcome::AllPassed => {
                        term.write_line(&format!("{}", style(ALL_PASSED_MESSAGE).green()))?;
                    }
                    FilterOutcome::Rows(rows) => {
                        term.write_line(&format!(
                            "{}",
                            style(format!(
                                "Found {} questions with {} <= {:.2}",
                                rows.len(),
                                metric.as_str(),
                                threshold
                            ))
                            .bold()
                            .red()
                        ))?;
                        term.write_str(&render_failing(&rows, metric))?;
                    }
                }
            }
            1 => browse_full_results(&term, loaded.table.rows())?,
            2 => {}
            _ => return Ok(()),
        }

        term.write_line("")?;
    }
}

fn prompt_filter(current_metric: Metric, current_threshold: f64) -> Result<(Metric, f64)> {
    let labels: Vec<&str> = Metric::ALL.iter().map(|m| m.label()).collect();
    let default_index = Metric::ALL
        .iter()
        .position(|m| *m == current_metric)
        .unwrap_or(0);

    let selected = Select::new()
        .with_prompt("Select metric to analyze")
        .items(&labels[..])
        .default(default_index)
        .interact()?;
    let metric = Metric::ALL.get(selected).copied().unwrap_or(DEFAULT_METRIC);

    let threshold_input: String = Input::new()
        .with_prompt("Show questions with a score at or below (0.0 - 1.0)")
        .default(format!("{:.2}", current_threshold))
        .validate_with(|input: &String| -> Result<(), String> {
            parse_threshold(input).map(|_| ()).map_err(|e| e.to_string())
        })
        .interact_text()?;

    Ok((metric, parse_threshold(&threshold_input)?))
}

fn browse_full_results(term: &Term, rows: &[ScoredRow]) -> Result<()> {
    let pages = page_count(rows.len());
    let mut current = 0;

    loop {
        term.write_line(&format!("{}", style("Detailed Full Results").bold().yellow()))?;
        term.write_str(&render_full_results(rows, current))?;

        let mut options = Vec::new();
        if current + 1 < pages {
            options.push("Next page");
        }
        if current > 0 {
            options.push("Previous page");
        }
        options.push("Back");

        let choice = Select::new().items(&options[..]).default(0).interact()?;
        match options.get(choice).copied() {
            Some("Next page") => current += 1,
            Some("Previous page") => current -= 1,
            _ => return Ok(()),
        }
    }
}
