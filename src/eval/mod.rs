//! Evaluation and benchmarking engine.
//!
//! Drives ground-truth datasets through the query pipeline under a fixed
//! configuration, scores retrieval and generation per sample, aggregates
//! distribution statistics, compares variants with a paired t-test under
//! Bonferroni correction, and exports CSV/JSON/Markdown reports.

pub mod metrics;
pub mod report;
pub mod stats;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::core::{CancelToken, TenantId};
use crate::error::{Error, EvalError, Result};
use crate::pipeline::{AskOptions, QueryPipeline};

/// One labeled sample of a ground-truth dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthEntry {
    /// Query to ask.
    pub query: String,
    /// Primary expected answer.
    pub expected_answer: String,
    /// Acceptable answer aliases.
    #[serde(default)]
    pub answer_aliases: Vec<String>,
    /// Documents that count as relevant for retrieval scoring.
    #[serde(default)]
    pub relevant_docs: Vec<Uuid>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A loaded ground-truth dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthDataset {
    /// Samples in file order.
    pub entries: Vec<GroundTruthEntry>,
}

impl GroundTruthDataset {
    /// Loads a dataset from a JSON array file or JSONL file (dispatch on
    /// the `.jsonl` suffix).
    ///
    /// # Errors
    ///
    /// [`EvalError::Dataset`] on unreadable or malformed files,
    /// [`EvalError::EmptyDataset`] when no entries survive.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| EvalError::Dataset {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let entries: Vec<GroundTruthEntry> =
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                raw.lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| {
                        serde_json::from_str(line).map_err(|e| EvalError::Dataset {
                            path: path.display().to_string(),
                            reason: e.to_string(),
                        })
                    })
                    .collect::<std::result::Result<_, _>>()?
            } else {
                serde_json::from_str(&raw).map_err(|e| EvalError::Dataset {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?
            };

        if entries.is_empty() {
            return Err(EvalError::EmptyDataset.into());
        }
        Ok(Self { entries })
    }
}

/// Distribution statistics for one metric across a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    /// Sample mean.
    pub mean: f64,
    /// Sample standard deviation.
    pub std_dev: f64,
    /// Minimum.
    pub min: f64,
    /// Maximum.
    pub max: f64,
    /// Median (nearest rank).
    pub p50: f64,
    /// 95th percentile (nearest rank).
    pub p95: f64,
    /// 99th percentile (nearest rank).
    pub p99: f64,
    /// Samples that produced a value.
    pub success_count: usize,
    /// Samples that failed before producing one.
    pub failure_count: usize,
}

impl MetricStats {
    /// Aggregates a sample vector.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_samples(samples: &[f64], failure_count: usize) -> Self {
        if samples.is_empty() {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
                p50: 0.0,
                p95: 0.0,
                p99: 0.0,
                success_count: 0,
                failure_count,
            };
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = if samples.len() > 1 {
            samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0)
        } else {
            0.0
        };
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
            p50: metrics::percentile(samples, 50.0),
            p95: metrics::percentile(samples, 95.0),
            p99: metrics::percentile(samples, 99.0),
            success_count: samples.len(),
            failure_count,
        }
    }
}

/// Per-sample evaluation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleResult {
    /// Sample index within the dataset (pairing key for A/B tests).
    pub index: usize,
    /// Query text.
    pub query: String,
    /// Generated answer, absent on failure.
    pub answer: Option<String>,
    /// End-to-end latency in milliseconds.
    pub latency_ms: f64,
    /// Total tokens spent.
    pub total_tokens: u32,
    /// Metric name to value.
    pub metrics: BTreeMap<String, f64>,
    /// Failure detail, when the sample errored.
    pub error: Option<String>,
}

/// A completed evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
    /// Run id.
    pub id: Uuid,
    /// Configuration label for reports and comparisons.
    pub config_id: String,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// Completion timestamp.
    pub completed_at: DateTime<Utc>,
    /// Aggregated statistics per metric.
    pub stats: BTreeMap<String, MetricStats>,
    /// Composite benchmark scalar.
    pub composite: f64,
    /// Report notes (e.g. omitted latency penalty).
    #[serde(default)]
    pub notes: Vec<String>,
    /// Per-sample results in dataset order.
    pub samples: Vec<SampleResult>,
}

impl EvaluationRun {
    /// Per-sample values for one metric, in dataset order, with failed
    /// samples contributing 0 so pairing stays index-aligned.
    #[must_use]
    pub fn metric_values(&self, metric: &str) -> Vec<f64> {
        self.samples
            .iter()
            .map(|s| s.metrics.get(metric).copied().unwrap_or(0.0))
            .collect()
    }
}

/// Fixed configuration for one evaluation run.
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    /// Label identifying this variant in reports.
    pub config_id: String,
    /// Ask options driven through the pipeline for every sample.
    pub options: AskOptions,
    /// Samples evaluated concurrently.
    pub concurrency: usize,
    /// k for Precision@k / Recall@k.
    pub k: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            config_id: "default".to_string(),
            options: AskOptions::default(),
            concurrency: 4,
            k: 10,
        }
    }
}

/// Metric names produced per sample.
pub const RETRIEVAL_METRICS: [&str; 3] = ["precision_at_k", "recall_at_k", "mrr"];
/// Generation metric names produced per sample.
pub const GENERATION_METRICS: [&str; 5] =
    ["exact_match", "token_f1", "bleu_4", "rouge_l", "rouge_1"];

/// Drives datasets through the pipeline and aggregates scores.
pub struct BenchmarkRunner {
    pipeline: Arc<QueryPipeline>,
}

impl BenchmarkRunner {
    /// Creates a runner over the pipeline.
    #[must_use]
    pub const fn new(pipeline: Arc<QueryPipeline>) -> Self {
        Self { pipeline }
    }

    /// Runs every dataset sample under the fixed configuration.
    ///
    /// Samples run concurrently up to `config.concurrency`; results keep
    /// dataset order so runs over the same dataset pair by index.
    ///
    /// # Errors
    ///
    /// [`EvalError::EmptyDataset`] for an empty dataset; `Cancelled`
    /// when the token fires. Individual sample failures are recorded,
    /// not propagated.
    pub async fn run(
        &self,
        tenant: &TenantId,
        dataset: &GroundTruthDataset,
        config: &EvaluationConfig,
        cancel: &CancelToken,
    ) -> Result<EvaluationRun> {
        if dataset.entries.is_empty() {
            return Err(EvalError::EmptyDataset.into());
        }
        let started_at = Utc::now();
        let limiter = Arc::new(Semaphore::new(config.concurrency.max(1)));

        let mut handles = Vec::with_capacity(dataset.entries.len());
        for (index, entry) in dataset.entries.iter().cloned().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let limiter = Arc::clone(&limiter);
            let tenant = tenant.clone();
            let options = config.options.clone();
            let cancel = cancel.clone();
            let k = config.k;
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                Self::evaluate_sample(&pipeline, &tenant, index, &entry, &options, k, &cancel)
                    .await
            }));
        }

        let mut samples = Vec::with_capacity(handles.len());
        for handle in handles {
            let sample = handle
                .await
                .map_err(|e| Error::internal(format!("evaluation task failed: {e}")))?;
            samples.push(sample);
        }
        cancel.check()?;
        samples.sort_by_key(|s| s.index);

        let (stats, composite, notes) = Self::aggregate(&samples);
        Ok(EvaluationRun {
            id: Uuid::new_v4(),
            config_id: config.config_id.clone(),
            started_at,
            completed_at: Utc::now(),
            stats,
            composite,
            notes,
            samples,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    async fn evaluate_sample(
        pipeline: &QueryPipeline,
        tenant: &TenantId,
        index: usize,
        entry: &GroundTruthEntry,
        options: &AskOptions,
        k: usize,
        cancel: &CancelToken,
    ) -> SampleResult {
        let started = Instant::now();
        match pipeline
            .ask_traced(tenant, &entry.query, options, cancel)
            .await
        {
            Ok((answer, hits)) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                let retrieved_docs: Vec<Uuid> = hits.iter().map(|h| h.document_id).collect();

                let mut metric_map = BTreeMap::new();
                metric_map.insert(
                    "precision_at_k".to_string(),
                    metrics::precision_at_k(&retrieved_docs, &entry.relevant_docs, k),
                );
                metric_map.insert(
                    "recall_at_k".to_string(),
                    metrics::recall_at_k(&retrieved_docs, &entry.relevant_docs, k),
                );
                metric_map.insert(
                    "mrr".to_string(),
                    metrics::reciprocal_rank(&retrieved_docs, &entry.relevant_docs),
                );
                metric_map.insert(
                    "exact_match".to_string(),
                    f64::from(u8::from(metrics::exact_match(
                        &answer.text,
                        &entry.expected_answer,
                        &entry.answer_aliases,
                    ))),
                );
                metric_map.insert(
                    "token_f1".to_string(),
                    metrics::token_f1(&answer.text, &entry.expected_answer),
                );
                metric_map.insert(
                    "bleu_4".to_string(),
                    metrics::bleu_4(&answer.text, &entry.expected_answer),
                );
                metric_map.insert(
                    "rouge_l".to_string(),
                    metrics::rouge_l(&answer.text, &entry.expected_answer),
                );
                metric_map.insert(
                    "rouge_1".to_string(),
                    metrics::rouge_1(&answer.text, &entry.expected_answer),
                );
                metric_map.insert("latency_ms".to_string(), latency_ms);

                SampleResult {
                    index,
                    query: entry.query.clone(),
                    answer: Some(answer.text),
                    latency_ms,
                    total_tokens: answer.usage.total_tokens,
                    metrics: metric_map,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "evaluation sample failed");
                SampleResult {
                    index,
                    query: entry.query.clone(),
                    answer: None,
                    latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                    total_tokens: 0,
                    metrics: BTreeMap::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn aggregate(
        samples: &[SampleResult],
    ) -> (BTreeMap<String, MetricStats>, f64, Vec<String>) {
        let failure_count = samples.iter().filter(|s| s.error.is_some()).count();
        let mut stats = BTreeMap::new();

        let metric_names: Vec<&str> = RETRIEVAL_METRICS
            .iter()
            .chain(GENERATION_METRICS.iter())
            .copied()
            .chain(std::iter::once("latency_ms"))
            .collect();
        for name in metric_names {
            let values: Vec<f64> = samples
                .iter()
                .filter_map(|s| s.metrics.get(name).copied())
                .collect();
            stats.insert(
                name.to_string(),
                MetricStats::from_samples(&values, failure_count),
            );
        }

        let mut notes = Vec::new();
        let latency_p95 = stats
            .get("latency_ms")
            .filter(|s| s.success_count > 0)
            .map(|s| s.p95);
        let mean = |name: &str| stats.get(name).map_or(0.0, |s| s.mean);
        let (composite, penalty_omitted) = metrics::composite_score(
            mean("precision_at_k"),
            mean("recall_at_k"),
            mean("mrr"),
            mean("token_f1"),
            latency_p95,
        );
        if penalty_omitted {
            notes.push("latency penalty omitted: no p95 latency available".to_string());
        }
        if failure_count > 0 {
            notes.push(format!("{failure_count} samples failed"));
        }

        (stats, composite, notes)
    }
}

/// One pairwise metric comparison between two runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRow {
    /// First variant label.
    pub variant_a: String,
    /// Second variant label.
    pub variant_b: String,
    /// Metric compared.
    pub metric: String,
    /// Mean of A minus mean of B.
    pub mean_delta: f64,
    /// Paired t-test result.
    pub test: stats::TTestResult,
    /// Bonferroni-corrected p-value.
    pub p_adjusted: f64,
    /// Whether `p_adjusted < 0.05`.
    pub significant: bool,
}

/// Compares every pair of runs on every named metric with paired t-tests
/// and Bonferroni correction over `pairs * metrics` comparisons.
///
/// # Errors
///
/// [`EvalError::PairLengthMismatch`] when runs carry different sample
/// counts.
pub fn compare_runs(runs: &[&EvaluationRun], metric_names: &[&str]) -> Result<Vec<ComparisonRow>> {
    let comparisons = stats::variant_pairs(runs.len()) * metric_names.len();
    let mut rows = Vec::new();

    for (i, run_a) in runs.iter().enumerate() {
        for run_b in runs.iter().skip(i + 1) {
            for metric in metric_names {
                let a = run_a.metric_values(metric);
                let b = run_b.metric_values(metric);
                let test = stats::paired_t_test(&a, &b)?;
                let p_adjusted = stats::bonferroni(test.p, comparisons);
                let mean = |values: &[f64]| {
                    if values.is_empty() {
                        0.0
                    } else {
                        #[allow(clippy::cast_precision_loss)]
                        let n = values.len() as f64;
                        values.iter().sum::<f64>() / n
                    }
                };
                rows.push(ComparisonRow {
                    variant_a: run_a.config_id.clone(),
                    variant_b: run_b.config_id.clone(),
                    metric: (*metric).to_string(),
                    mean_delta: mean(&a) - mean(&b),
                    test,
                    p_adjusted,
                    significant: p_adjusted < 0.05,
                });
            }
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(index: usize, values: &[(&str, f64)], error: Option<&str>) -> SampleResult {
        SampleResult {
            index,
            query: format!("query {index}"),
            answer: error.is_none().then(|| "answer".to_string()),
            latency_ms: values
                .iter()
                .find(|(n, _)| *n == "latency_ms")
                .map_or(0.0, |(_, v)| *v),
            total_tokens: 10,
            metrics: values
                .iter()
                .map(|(n, v)| ((*n).to_string(), *v))
                .collect(),
            error: error.map(String::from),
        }
    }

    fn run_with(config_id: &str, token_f1s: &[f64]) -> EvaluationRun {
        let samples: Vec<SampleResult> = token_f1s
            .iter()
            .enumerate()
            .map(|(i, f1)| {
                sample(
                    i,
                    &[
                        ("token_f1", *f1),
                        ("precision_at_k", 0.5),
                        ("recall_at_k", 0.5),
                        ("mrr", 0.5),
                        ("latency_ms", 100.0),
                    ],
                    None,
                )
            })
            .collect();
        let (stats, composite, notes) = BenchmarkRunner::aggregate(&samples);
        EvaluationRun {
            id: Uuid::new_v4(),
            config_id: config_id.to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            stats,
            composite,
            notes,
            samples,
        }
    }

    #[test]
    fn test_metric_stats_from_samples() {
        let stats = MetricStats::from_samples(&[1.0, 2.0, 3.0, 4.0], 1);
        assert!((stats.mean - 2.5).abs() < 1e-12);
        assert!((stats.min - 1.0).abs() < 1e-12);
        assert!((stats.max - 4.0).abs() < 1e-12);
        assert_eq!(stats.success_count, 4);
        assert_eq!(stats.failure_count, 1);
        assert!((stats.p50 - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_metric_stats_empty() {
        let stats = MetricStats::from_samples(&[], 3);
        assert_eq!(stats.success_count, 0);
        assert_eq!(stats.failure_count, 3);
        assert!(stats.mean.abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_composite_and_notes() {
        let run = run_with("a", &[0.8, 0.9]);
        // 0.15*0.5 + 0.15*0.5 + 0.2*0.5 + 0.4*0.85 - 0.1*(100/1000)
        let expected = 0.15 * 0.5 + 0.15 * 0.5 + 0.2 * 0.5 + 0.4 * 0.85 - 0.01;
        assert!((run.composite - expected).abs() < 1e-9);
        assert!(run.notes.is_empty());
    }

    #[test]
    fn test_aggregate_failure_note() {
        let samples = vec![
            sample(0, &[("token_f1", 0.5), ("latency_ms", 10.0)], None),
            sample(1, &[], Some("provider down")),
        ];
        let (_stats, _composite, notes) = BenchmarkRunner::aggregate(&samples);
        assert!(notes.iter().any(|n| n.contains("1 samples failed")));
    }

    #[test]
    fn test_compare_identical_runs() {
        let a = run_with("a", &[0.5, 0.6, 0.7, 0.8]);
        let mut b = run_with("b", &[0.5, 0.6, 0.7, 0.8]);
        b.config_id = "b".to_string();
        let rows = compare_runs(&[&a, &b], &["token_f1"]).unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].test.p - 1.0).abs() < 1e-9);
        assert!(rows[0].test.cohens_d.abs() < 1e-9);
        assert!(!rows[0].significant);
    }

    #[test]
    fn test_compare_dominant_run_significant() {
        let baseline: Vec<f64> = (0..12).map(|i| 0.4 + f64::from(i) * 0.01).collect();
        let better: Vec<f64> = baseline.iter().map(|v| v + 0.2 + v * 0.01).collect();
        let a = run_with("better", &better);
        let b = run_with("baseline", &baseline);
        let rows = compare_runs(&[&a, &b], &["token_f1"]).unwrap();
        assert!(rows[0].significant, "p_adj = {}", rows[0].p_adjusted);
        assert!(rows[0].test.cohens_d > 0.0);
        assert!(rows[0].mean_delta > 0.0);
    }

    #[test]
    fn test_compare_bonferroni_scales_with_comparisons() {
        let a = run_with("a", &[0.5, 0.52, 0.54, 0.56, 0.58, 0.61]);
        let b = run_with("b", &[0.4, 0.43, 0.45, 0.48, 0.5, 0.52]);
        let single = compare_runs(&[&a, &b], &["token_f1"]).unwrap();
        let multi = compare_runs(&[&a, &b], &["token_f1", "mrr", "rouge_l"]).unwrap();
        let single_row = &single[0];
        let multi_row = multi.iter().find(|r| r.metric == "token_f1").unwrap();
        assert!(multi_row.p_adjusted >= single_row.p_adjusted);
    }

    #[test]
    fn test_compare_length_mismatch() {
        let a = run_with("a", &[0.5, 0.6]);
        let b = run_with("b", &[0.5]);
        assert!(compare_runs(&[&a, &b], &["token_f1"]).is_err());
    }

    #[test]
    fn test_dataset_load_json_and_jsonl() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("data.json");
        std::fs::write(
            &json_path,
            r#"[{"query": "q1", "expected_answer": "a1"},
                {"query": "q2", "expected_answer": "a2", "answer_aliases": ["alias"]}]"#,
        )
        .unwrap();
        let dataset = GroundTruthDataset::load(&json_path).unwrap();
        assert_eq!(dataset.entries.len(), 2);
        assert_eq!(dataset.entries[1].answer_aliases, vec!["alias"]);

        let jsonl_path = dir.path().join("data.jsonl");
        std::fs::write(
            &jsonl_path,
            "{\"query\": \"q1\", \"expected_answer\": \"a1\"}\n\n{\"query\": \"q2\", \"expected_answer\": \"a2\"}\n",
        )
        .unwrap();
        let dataset = GroundTruthDataset::load(&jsonl_path).unwrap();
        assert_eq!(dataset.entries.len(), 2);
    }

    #[test]
    fn test_dataset_load_rejects_empty_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "[]").unwrap();
        assert!(GroundTruthDataset::load(&empty).is_err());

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        assert!(GroundTruthDataset::load(&garbage).is_err());
    }

    #[test]
    fn test_metric_values_aligned_with_failures() {
        let samples = vec![
            sample(0, &[("token_f1", 0.5)], None),
            sample(1, &[], Some("boom")),
            sample(2, &[("token_f1", 0.7)], None),
        ];
        let run = EvaluationRun {
            id: Uuid::new_v4(),
            config_id: "x".to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            stats: BTreeMap::new(),
            composite: 0.0,
            notes: vec![],
            samples,
        };
        assert_eq!(run.metric_values("token_f1"), vec![0.5, 0.0, 0.7]);
    }
}
