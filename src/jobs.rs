//! Background job runner.
//!
//! Long-running work (index rebuilds, benchmark runs) is enqueued onto an
//! in-memory channel and drained by a single consumer task. Job records
//! persist through the repository with forward-only status transitions; a
//! process-wide cancellation registry lets an admin cancel signal a
//! running job, and a startup recovery pass fails orphaned `Running` rows
//! and re-queues persisted `Queued` ones.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::{CancelToken, JobKind, JobRecord, JobStatus, TenantId};
use crate::error::{Error, JobError, Result};
use crate::eval::{BenchmarkRunner, EvaluationConfig, GroundTruthDataset};
use crate::ingest::IndexingOrchestrator;
use crate::storage::{DocumentFilter, Repository};

/// Progress reporter handed to executing jobs.
///
/// Updates are checkpoint-grained; readers of the job record must
/// tolerate stale counts.
pub struct JobProgress {
    repository: Arc<dyn Repository>,
    record: JobRecord,
}

impl JobProgress {
    /// Sets the estimated total unit count.
    pub fn set_estimated(&mut self, estimated: u64) {
        self.record.estimated = Some(estimated);
        self.flush();
    }

    /// Sets the processed unit count.
    pub fn set_processed(&mut self, processed: u64) {
        self.record.processed = processed;
        self.flush();
    }

    fn flush(&self) {
        if let Err(e) = self.repository.update_job(&self.record) {
            tracing::warn!(job_id = %self.record.id, error = %e, "progress update failed");
        }
    }
}

/// Executes jobs by kind. One executor serves the whole runner, so the
/// recovery pass can re-run persisted records without payloads.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Runs the job, returning the processed unit count.
    async fn execute(
        &self,
        job: &JobRecord,
        progress: &mut JobProgress,
        cancel: &CancelToken,
    ) -> Result<u64>;
}

/// Durable single-consumer job queue.
pub struct JobRunner {
    repository: Arc<dyn Repository>,
    queue: mpsc::UnboundedSender<JobRecord>,
    cancellations: Arc<DashMap<Uuid, CancelToken>>,
}

impl JobRunner {
    /// Starts the runner: runs the recovery pass, then spawns the
    /// consumer task.
    ///
    /// # Errors
    ///
    /// Propagates repository errors from the recovery pass.
    pub fn start(
        repository: Arc<dyn Repository>,
        executor: Arc<dyn JobExecutor>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancellations: Arc<DashMap<Uuid, CancelToken>> = Arc::new(DashMap::new());

        let runner = Self {
            repository: Arc::clone(&repository),
            queue: tx,
            cancellations: Arc::clone(&cancellations),
        };
        runner.recover()?;

        tokio::spawn(Self::consume(
            repository,
            executor,
            rx,
            cancellations,
        ));
        Ok(runner)
    }

    /// Startup recovery: `Running` rows have no live handle after a crash
    /// and fail as orphaned; persisted `Queued` rows re-enter the queue.
    fn recover(&self) -> Result<()> {
        for mut job in self.repository.jobs_with_status(JobStatus::Running)? {
            tracing::warn!(job_id = %job.id, "orphaned running job found, failing");
            job.error = Some("orphaned".to_string());
            job.transition(JobStatus::Failed)?;
            self.repository.update_job(&job)?;
        }
        for job in self.repository.jobs_with_status(JobStatus::Queued)? {
            tracing::info!(job_id = %job.id, "re-queueing persisted job");
            self.cancellations.insert(job.id, CancelToken::new());
            let _ = self.queue.send(job);
        }
        Ok(())
    }

    /// Submits a job; returns its id.
    ///
    /// # Errors
    ///
    /// [`JobError::QueueClosed`] when the consumer has shut down;
    /// repository errors from persisting the record.
    pub fn submit(
        &self,
        kind: JobKind,
        tenant: TenantId,
        initiator: Option<String>,
    ) -> Result<Uuid> {
        let record = JobRecord::new(kind, tenant, initiator);
        let id = record.id;
        self.repository.insert_job(&record)?;
        self.cancellations.insert(id, CancelToken::new());
        self.queue
            .send(record)
            .map_err(|_| Error::from(JobError::QueueClosed))?;
        tracing::info!(job_id = %id, kind = kind.as_str(), "job queued");
        Ok(id)
    }

    /// Signals cancellation for a queued or running job.
    ///
    /// # Errors
    ///
    /// [`JobError::NotFound`] for unknown or already-finished jobs.
    pub fn cancel(&self, job_id: Uuid) -> Result<()> {
        match self.cancellations.get(&job_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(job_id = %job_id, "cancellation signalled");
                Ok(())
            }
            None => Err(JobError::NotFound { id: job_id }.into()),
        }
    }

    /// Fetches a job's persisted record.
    ///
    /// # Errors
    ///
    /// [`JobError::NotFound`] for unknown ids.
    pub fn status(&self, job_id: Uuid) -> Result<JobRecord> {
        self.repository
            .job(job_id)?
            .ok_or_else(|| JobError::NotFound { id: job_id }.into())
    }

    async fn consume(
        repository: Arc<dyn Repository>,
        executor: Arc<dyn JobExecutor>,
        mut rx: mpsc::UnboundedReceiver<JobRecord>,
        cancellations: Arc<DashMap<Uuid, CancelToken>>,
    ) {
        while let Some(mut job) = rx.recv().await {
            let token = cancellations
                .get(&job.id)
                .map_or_else(CancelToken::new, |t| t.clone());

            if token.is_cancelled() {
                let _ = job.transition(JobStatus::Cancelled);
                let _ = repository.update_job(&job);
                cancellations.remove(&job.id);
                continue;
            }

            if job.transition(JobStatus::Running).is_err() {
                cancellations.remove(&job.id);
                continue;
            }
            let _ = repository.update_job(&job);
            tracing::info!(job_id = %job.id, kind = job.kind.as_str(), "job started");

            let mut progress = JobProgress {
                repository: Arc::clone(&repository),
                record: job.clone(),
            };
            let outcome = tokio::select! {
                () = token.cancelled() => Err(Error::Cancelled),
                outcome = executor.execute(&job, &mut progress, &token) => outcome,
            };

            job.processed = progress.record.processed;
            job.estimated = progress.record.estimated;
            match outcome {
                Ok(processed) => {
                    job.processed = processed;
                    let _ = job.transition(JobStatus::Completed);
                    tracing::info!(job_id = %job.id, processed, "job completed");
                }
                Err(Error::Cancelled) => {
                    let _ = job.transition(JobStatus::Cancelled);
                    tracing::info!(job_id = %job.id, "job cancelled");
                }
                Err(e) => {
                    job.error = Some(e.to_string());
                    let _ = job.transition(JobStatus::Failed);
                    tracing::warn!(job_id = %job.id, error = %e, "job failed");
                }
            }
            let _ = repository.update_job(&job);
            cancellations.remove(&job.id);
        }
    }
}

/// A configured benchmark suite the job runner can execute on demand.
pub struct BenchmarkSuite {
    /// Runner over the live query pipeline.
    pub runner: BenchmarkRunner,
    /// Ground-truth dataset to drive.
    pub dataset: GroundTruthDataset,
    /// Fixed evaluation configuration.
    pub config: EvaluationConfig,
}

/// Executor wiring the built-in job kinds to the orchestrators:
/// `IndexRebuild` re-embeds every document of the job's tenant from the
/// relational store, `Benchmark` runs the configured suite and persists
/// the evaluation run.
pub struct StandardJobExecutor {
    indexer: Arc<IndexingOrchestrator>,
    repository: Arc<dyn Repository>,
    benchmark: Option<BenchmarkSuite>,
}

impl StandardJobExecutor {
    /// Creates an executor that can rebuild indexes; benchmark jobs fail
    /// until a suite is configured.
    #[must_use]
    pub const fn new(
        indexer: Arc<IndexingOrchestrator>,
        repository: Arc<dyn Repository>,
    ) -> Self {
        Self {
            indexer,
            repository,
            benchmark: None,
        }
    }

    /// Attaches the benchmark suite.
    #[must_use]
    pub fn with_benchmark(mut self, suite: BenchmarkSuite) -> Self {
        self.benchmark = Some(suite);
        self
    }

    async fn rebuild(
        &self,
        job: &JobRecord,
        progress: &mut JobProgress,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let documents = self
            .repository
            .list_documents(&job.tenant, &DocumentFilter::default())?;
        progress.set_estimated(u64::try_from(documents.len()).unwrap_or(u64::MAX));

        let mut processed: u64 = 0;
        for document in documents {
            cancel.check()?;
            self.indexer
                .reindex_document(&job.tenant, document.id, cancel)
                .await?;
            processed += 1;
            progress.set_processed(processed);
        }
        Ok(processed)
    }

    async fn benchmark(&self, job: &JobRecord, cancel: &CancelToken) -> Result<u64> {
        let suite = self.benchmark.as_ref().ok_or_else(|| {
            Error::invalid_input("no benchmark suite configured for this runner")
        })?;
        let run = suite
            .runner
            .run(&job.tenant, &suite.dataset, &suite.config, cancel)
            .await?;
        let samples = u64::try_from(run.samples.len()).unwrap_or(u64::MAX);
        self.repository.insert_eval_run(&run)?;
        Ok(samples)
    }
}

#[async_trait]
impl JobExecutor for StandardJobExecutor {
    async fn execute(
        &self,
        job: &JobRecord,
        progress: &mut JobProgress,
        cancel: &CancelToken,
    ) -> Result<u64> {
        match job.kind {
            JobKind::IndexRebuild => self.rebuild(job, progress, cancel).await,
            JobKind::Benchmark => self.benchmark(job, cancel).await,
        }
    }
}
