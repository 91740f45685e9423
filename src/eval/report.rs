//! Report exports: CSV, JSON, and Markdown renderings of evaluation runs
//! and A/B comparisons.

use std::fmt::Write as _;

use crate::error::{EvalError, Result};
use crate::eval::{ComparisonRow, EvaluationRun, GENERATION_METRICS, RETRIEVAL_METRICS};

use super::stats::significance_marker;

/// Exports a run as CSV, one row per metric. Percentile columns are
/// optional.
#[must_use]
pub fn to_csv(run: &EvaluationRun, include_percentiles: bool) -> String {
    let mut out = String::new();
    if include_percentiles {
        out.push_str("metric,mean,std_dev,min,max,p50,p95,p99,success,failure\n");
    } else {
        out.push_str("metric,mean,std_dev,min,max,success,failure\n");
    }
    for (name, stats) in &run.stats {
        if include_percentiles {
            let _ = writeln!(
                out,
                "{name},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{},{}",
                stats.mean,
                stats.std_dev,
                stats.min,
                stats.max,
                stats.p50,
                stats.p95,
                stats.p99,
                stats.success_count,
                stats.failure_count,
            );
        } else {
            let _ = writeln!(
                out,
                "{name},{:.6},{:.6},{:.6},{:.6},{},{}",
                stats.mean,
                stats.std_dev,
                stats.min,
                stats.max,
                stats.success_count,
                stats.failure_count,
            );
        }
    }
    let _ = writeln!(out, "composite,{:.6},,,,{},", run.composite, run.samples.len());
    out
}

/// Exports a run as JSON. `include_samples` adds the per-query
/// breakdown; without it only aggregates ship.
///
/// # Errors
///
/// [`EvalError::Export`] on serialization failure.
pub fn to_json(run: &EvaluationRun, pretty: bool, include_samples: bool) -> Result<String> {
    let value = if include_samples {
        serde_json::to_value(run)
    } else {
        let mut trimmed = run.clone();
        trimmed.samples.clear();
        serde_json::to_value(&trimmed)
    }
    .map_err(|e| EvalError::Export {
        reason: e.to_string(),
    })?;

    let rendered = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .map_err(|e| EvalError::Export {
        reason: e.to_string(),
    })?;
    Ok(rendered)
}

fn markdown_metric_rows(out: &mut String, run: &EvaluationRun, names: &[&str]) {
    for name in names {
        if let Some(stats) = run.stats.get(*name) {
            let _ = writeln!(
                out,
                "| {name} | {:.4} | {:.4} | {:.4} | {:.4} |",
                stats.mean, stats.std_dev, stats.min, stats.max
            );
        }
    }
}

/// Exports a run as Markdown, grouped into Retrieval / Generation /
/// Performance sections. Comparison rows, when supplied, are annotated
/// with significance stars.
#[must_use]
pub fn to_markdown(run: &EvaluationRun, comparisons: Option<&[ComparisonRow]>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Evaluation: {}\n", run.config_id);
    let _ = writeln!(
        out,
        "Run `{}` | samples: {} | composite: **{:.4}**\n",
        run.id,
        run.samples.len(),
        run.composite
    );
    for note in &run.notes {
        let _ = writeln!(out, "> {note}\n");
    }

    out.push_str("## Retrieval\n\n");
    out.push_str("| metric | mean | std dev | min | max |\n|---|---|---|---|---|\n");
    markdown_metric_rows(&mut out, run, &RETRIEVAL_METRICS);

    out.push_str("\n## Generation\n\n");
    out.push_str("| metric | mean | std dev | min | max |\n|---|---|---|---|---|\n");
    markdown_metric_rows(&mut out, run, &GENERATION_METRICS);

    out.push_str("\n## Performance\n\n");
    if let Some(latency) = run.stats.get("latency_ms") {
        out.push_str("| metric | p50 | p95 | p99 | mean |\n|---|---|---|---|---|\n");
        let _ = writeln!(
            out,
            "| latency_ms | {:.1} | {:.1} | {:.1} | {:.1} |",
            latency.p50, latency.p95, latency.p99, latency.mean
        );
    }

    if let Some(rows) = comparisons
        && !rows.is_empty()
    {
        out.push_str("\n## Comparison\n\n");
        out.push_str(
            "| variants | metric | Δ mean | t | p (adj) | Cohen's d | |\n|---|---|---|---|---|---|---|\n",
        );
        for row in rows {
            let _ = writeln!(
                out,
                "| {} vs {} | {} | {:+.4} | {:.3} | {:.4} | {:.3} | {} |",
                row.variant_a,
                row.variant_b,
                row.metric,
                row.mean_delta,
                row.test.t,
                row.p_adjusted,
                row.test.cohens_d,
                significance_marker(row.p_adjusted),
            );
        }
    }

    out
}
