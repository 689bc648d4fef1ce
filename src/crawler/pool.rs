use crate::config::{CrawlerConfig, Pacing};
use crate::crawler::enricher::{DetailEnricher, EnrichOutcome};
use crate::crawler::rate_limiter::RateLimiter;
use crate::listing::ListingStub;
use crate::output::{DispatchSummary, OutputError, OutputWriter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

/// Bounded set of workers draining one page's listing stubs
///
/// Rate limiters live as long as the pool, so pacing carries over from one page
/// to the next.
pub struct WorkerPool {
    enricher: Arc<DetailEnricher>,
    writer: Arc<OutputWriter>,
    limiters: Vec<Arc<RateLimiter>>,
}

impl WorkerPool {
    pub fn new(
        enricher: Arc<DetailEnricher>,
        writer: Arc<OutputWriter>,
        config: &CrawlerConfig,
    ) -> Self {
        let workers = config.workers.max(1) as usize;
        let interval = Duration::from_millis(config.min_interval_ms);

        let limiters = match config.pacing {
            Pacing::PerWorker => (0..workers)
                .map(|_| Arc::new(RateLimiter::new(interval)))
                .collect(),
            Pacing::Shared => {
                let shared = Arc::new(RateLimiter::new(interval));
                vec![shared; workers]
            }
        };

        Self {
            enricher,
            writer,
            limiters,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.limiters.len()
    }

    /// Enriches and persists every stub, returning once all of them are accounted for
    ///
    /// Per-listing failures are logged and counted. A sink failure is fatal: the
    /// remaining workers stop at their next append and the error is returned after
    /// all of them have finished.
    pub async fn process(&self, stubs: Vec<ListingStub>) -> Result<DispatchSummary, OutputError> {
        let mut summary = DispatchSummary::default();
        if stubs.is_empty() {
            return Ok(summary);
        }

        let workers = self.concurrency().min(stubs.len());
        let (tx, rx) = mpsc::channel(stubs.len());
        for stub in stubs {
            // capacity equals the number of stubs, so this never waits
            if tx.send(stub).await.is_err() {
                break;
            }
        }
        drop(tx);

        let rx = Arc::new(Mutex::new(rx));
        let mut join_set = JoinSet::new();

        for (worker_id, limiter) in self.limiters.iter().take(workers).enumerate() {
            let rx = Arc::clone(&rx);
            let enricher = Arc::clone(&self.enricher);
            let writer = Arc::clone(&self.writer);
            let limiter = Arc::clone(limiter);

            join_set.spawn(async move {
                let mut local = DispatchSummary::default();

                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(stub) = next else { break };

                    match enricher.enrich(stub, &limiter).await {
                        Ok(EnrichOutcome::Complete(record)) => {
                            writer.append(&record).await?;
                            local.written += 1;
                        }
                        Ok(EnrichOutcome::Partial(record)) => {
                            writer.append(&record).await?;
                            local.partial += 1;
                        }
                        Ok(EnrichOutcome::Skipped(_)) => local.skipped += 1,
                        Err(e) => {
                            tracing::error!(worker = worker_id, error = %e, "listing enrichment failed");
                            local.failed += 1;
                        }
                    }
                }

                Ok::<_, OutputError>(local)
            });
        }

        let mut fatal = None;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(local)) => summary += local,
                Ok(Err(e)) => {
                    tracing::error!(path = %self.writer.path().display(), error = %e, "sink write failed");
                    // a write failure wins over later poisoned-sink errors
                    if !matches!(fatal, Some(OutputError::Write { .. })) {
                        fatal = Some(e);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "worker task aborted");
                    summary.failed += 1;
                }
            }
        }

        // stubs left behind by aborted workers
        let mut rx = rx.lock().await;
        while rx.try_recv().is_ok() {
            summary.failed += 1;
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}
