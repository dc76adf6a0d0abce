//! Sync orchestrator
//!
//! One call to [`SyncOrchestrator::run`] is one bounded batch:
//!
//! 1. read the watermark
//! 2. list the accumulated feed, then the bulletin feed
//! 3. fetch, extract and publish every candidate in listing order
//! 4. advance the watermark to the latest suggestion
//!
//! Failures below the run level are isolated: a broken feed counts as an
//! empty one, a broken candidate is skipped, a broken file is reported.

use jradb_common::types::{Category, FeedClass, Watermark};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::config::SyncConfig;
use crate::error::Result;
use crate::fetch::{CandidateWorkspace, FetchOutcome, FetchPipeline, RunDirectory};
use crate::http::ProviderClient;
use crate::listing::{DownloadCandidate, FeedListing, ListingClient};
use crate::publish::{PublishReport, Publisher};
use crate::storage::RemoteStore;
use crate::watermark::{WatermarkStore, WriteOutcome};

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    Published {
        filename: String,
        staged: usize,
        report: PublishReport,
    },
    Unrecognized {
        category: Category,
        filename: String,
    },
    Failed {
        category: Category,
        url: String,
        error: String,
    },
}

impl CandidateOutcome {
    /// Whether this candidate justifies writing the watermark.
    ///
    /// A published candidate counts if it had nothing to publish or at
    /// least one file made it.
    pub fn is_success(&self) -> bool {
        match self {
            CandidateOutcome::Published { staged, report, .. } => {
                *staged == 0 || !report.published.is_empty()
            },
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedReport {
    pub feed: FeedClass,
    pub candidates: usize,
    pub suggested_next: Option<Watermark>,
    /// Set when the listing failed and the feed was treated as empty
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatermarkStatus {
    /// Nothing succeeded and no feed suggested a later watermark
    NotNeeded,
    Written,
    Unchanged,
    /// The stored value was later and was kept
    Kept { stored: Watermark },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub previous: Watermark,
    pub final_watermark: Watermark,
    pub feeds: Vec<FeedReport>,
    pub outcomes: Vec<CandidateOutcome>,
    pub watermark: WatermarkStatus,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CandidateOutcome::Failed { .. }))
            .count()
    }

    pub fn files_published(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                CandidateOutcome::Published { report, .. } => report.published.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn files_failed(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                CandidateOutcome::Published { report, .. } => report.failed.len(),
                _ => 0,
            })
            .sum()
    }
}

/// Verify the storage root, then run one batch.
///
/// A storage failure here is returned before the provider is contacted or
/// anything is written locally or remotely.
pub async fn sync_once(config: &SyncConfig, store: Arc<dyn RemoteStore>) -> Result<SyncReport> {
    store.verify_root().await?;
    info!(backend = store.backend(), "Storage root verified");

    SyncOrchestrator::new(config, store)?.run().await
}

pub struct SyncOrchestrator {
    work_dir: PathBuf,
    watermarks: WatermarkStore,
    listing: ListingClient,
    pipeline: FetchPipeline,
    publisher: Publisher,
}

impl SyncOrchestrator {
    pub fn new(config: &SyncConfig, store: Arc<dyn RemoteStore>) -> Result<Self> {
        let http = ProviderClient::new(&config.provider, &config.http)?;
        Ok(Self {
            work_dir: config.work_dir.clone(),
            watermarks: WatermarkStore::new(store.clone(), config.default_watermark.clone()),
            listing: ListingClient::new(config, http.clone()),
            pipeline: FetchPipeline::new(http),
            publisher: Publisher::new(store),
        })
    }

    /// Run one sync batch.
    ///
    /// Only a failure to set up the local run directory is returned as an
    /// error; everything else ends up in the report.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<SyncReport> {
        let run_dir = RunDirectory::create(&self.work_dir)?;

        let previous = self.watermarks.read().await;
        info!(watermark = %previous, "Starting sync");

        let mut feeds = Vec::new();
        let mut outcomes = Vec::new();
        let mut final_watermark = previous.clone();

        for feed in FeedClass::ALL {
            let (listing, error) = match self.listing.list(feed, &previous).await {
                Ok(listing) => (listing, None),
                Err(e) => {
                    warn!(feed = %feed, error = %e, "Listing failed, treating feed as empty");
                    (FeedListing::empty(feed), Some(e.to_string()))
                },
            };

            if let Some(next) = &listing.suggested_next {
                final_watermark = final_watermark.advance_to(next);
            }
            if listing.candidates.is_empty() {
                info!(feed = %feed, "No files to fetch");
            } else {
                info!(feed = %feed, count = listing.candidates.len(), "Processing files");
            }

            for candidate in &listing.candidates {
                outcomes.push(self.process_candidate(&run_dir, candidate).await);
            }

            feeds.push(FeedReport {
                feed,
                candidates: listing.candidates.len(),
                suggested_next: listing.suggested_next,
                error,
            });
        }

        let any_success = outcomes.iter().any(CandidateOutcome::is_success);
        let watermark = if any_success || final_watermark > previous {
            match self.watermarks.write(&final_watermark).await {
                Ok(WriteOutcome::Written) => WatermarkStatus::Written,
                Ok(WriteOutcome::Unchanged) => WatermarkStatus::Unchanged,
                Ok(WriteOutcome::Kept { stored }) => WatermarkStatus::Kept { stored },
                Err(e) => {
                    error!(error = %e, "Failed to persist watermark");
                    WatermarkStatus::Failed {
                        error: e.to_string(),
                    }
                },
            }
        } else {
            WatermarkStatus::NotNeeded
        };

        if let Err(e) = run_dir.close() {
            warn!(error = %e, "Failed to remove run directory");
        }

        let report = SyncReport {
            previous,
            final_watermark,
            feeds,
            outcomes,
            watermark,
        };

        info!(
            previous = %report.previous,
            next = %report.final_watermark,
            candidates = report.outcomes.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            files_published = report.files_published(),
            files_failed = report.files_failed(),
            watermark = ?report.watermark,
            "Sync complete"
        );
        Ok(report)
    }

    async fn process_candidate(
        &self,
        run_dir: &RunDirectory,
        candidate: &DownloadCandidate,
    ) -> CandidateOutcome {
        let failed = |e: crate::error::SyncError| {
            warn!(category = %candidate.category, url = %candidate.url, error = %e, "Candidate failed");
            CandidateOutcome::Failed {
                category: candidate.category,
                url: candidate.url.clone(),
                error: e.to_string(),
            }
        };

        let mut workspace = match CandidateWorkspace::new(run_dir, candidate) {
            Ok(workspace) => workspace,
            Err(e) => return failed(e),
        };

        let outcome = match self.pipeline.process(candidate, &workspace).await {
            Ok(FetchOutcome::Unrecognized { filename }) => CandidateOutcome::Unrecognized {
                category: candidate.category,
                filename,
            },
            Ok(FetchOutcome::Staged(files)) => {
                match self.publisher.publish(candidate.category, &files).await {
                    Ok(report) => {
                        if !report.is_complete() {
                            warn!(
                                file = %workspace.filename(),
                                failed = report.failed.len(),
                                published = report.published.len(),
                                "Candidate published partially"
                            );
                        }
                        CandidateOutcome::Published {
                            filename: workspace.filename().to_string(),
                            staged: files.len(),
                            report,
                        }
                    },
                    Err(e) => failed(e),
                }
            },
            Err(e) => failed(e),
        };

        if let Err(e) = workspace.cleanup() {
            warn!(file = %workspace.filename(), error = %e, "Failed to clean up candidate files");
        }
        outcome
    }
}
