use futures::future::join_all;
use tracing::{error, info, warn};

use serde::Serialize;

use super::{LifecycleState, ServiceWorker};
use crate::config::GenerationTag;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivationReport {
    /// Stale generations removed.
    pub deleted: Vec<GenerationTag>,
    /// Stale generations whose deletion failed; the next activation retries
    /// them since it re-lists every tag.
    pub retained: Vec<GenerationTag>,
    /// Clients that switched to this generation.
    pub claimed: usize,
}

impl ServiceWorker {
    /// Garbage-collect every other generation, then take control of all
    /// open clients.
    ///
    /// Deletion is whole-bucket and irreversible. Failures are logged and
    /// never abort activation.
    pub async fn activate(&self) -> crate::error::Result<ActivationReport> {
        self.advance(LifecycleState::Installed).await?;

        let current = self.generation().clone();
        let mut report = ActivationReport::default();

        match self.storage.keys().await {
            Ok(tags) => {
                let stale: Vec<GenerationTag> =
                    tags.into_iter().filter(|tag| *tag != current).collect();

                let results = join_all(stale.iter().map(|tag| async move {
                    info!(generation = %tag, "Deleting old cache");
                    (tag.clone(), self.storage.delete(tag).await)
                }))
                .await;

                for (tag, result) in results {
                    match result {
                        Ok(_) => report.deleted.push(tag),
                        Err(e) => {
                            warn!(generation = %tag, error = %e, "Failed to delete old cache");
                            report.retained.push(tag);
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to list caches, skipping cleanup");
            }
        }

        // Serve before claiming so claimed clients never see a pass-through.
        self.advance(LifecycleState::Activating).await?;
        report.claimed = self.clients.claim(&current).await;

        info!(
            generation = %current,
            deleted = report.deleted.len(),
            claimed = report.claimed,
            "Activated"
        );
        Ok(report)
    }
}
