use crate::config::SchedulerConfig;
use crate::directory::PeerDirectory;
use crate::error::{PodSyncError, Result};
use crate::store::RequestStore;
use crate::transport::{DeliveryOutcome, SecureTransport};
use crate::types::{DispatchBatch, PeerId};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::reputation;

/// What one dispatch round did, for logging and tests.
#[derive(Debug, Default)]
pub struct RoundSummary {
    /// Pending requests fetched this round.
    pub requests: usize,
    /// Distinct pods a batch was built for.
    pub pods: usize,
    /// Pods that acknowledged their batch.
    pub good: Vec<PeerId>,
    /// Pods whose delivery failed (retried next round).
    pub bad: Vec<PeerId>,
    /// Fully-delivered requests removed at reconcile time.
    pub requests_completed: usize,
}

/// Per-pod verdict collected from the fan-out tasks. Vacuous covers the
/// pod-no-longer-exists case: destinations pruned, no score effect.
enum PodVerdict {
    Good(PeerId),
    Bad(PeerId),
    Vacuous,
}

/// Run one dispatch round: page the oldest pending requests, batch them
/// per destination pod, fan out with bounded concurrency, then
/// reconcile destination sets and pod scores.
///
/// Only a failure to list pending requests aborts the round; every
/// per-pod failure is absorbed and logged.
pub async fn run_round(
    store: &Arc<RequestStore>,
    directory: &Arc<dyn PeerDirectory>,
    transport: &Arc<dyn SecureTransport>,
    config: &SchedulerConfig,
) -> Result<RoundSummary> {
    let page = store
        .list_oldest(config.requests_limit)
        .map_err(|e| PodSyncError::Store(format!("Cannot list pending requests: {}", e)))?;

    if page.is_empty() {
        tracing::debug!("[scheduler] No requests to make");
        return Ok(RoundSummary::default());
    }

    tracing::info!("[scheduler] Dispatching {} pending requests", page.len());

    // Group by destination pod, preserving oldest-first request order
    // within each batch.
    let mut batches: IndexMap<PeerId, DispatchBatch> = IndexMap::new();
    for request in &page {
        for pod_id in &request.to {
            batches
                .entry(pod_id.clone())
                .or_default()
                .push(request.id, request.payload.clone());
        }
    }

    let mut summary = RoundSummary {
        requests: page.len(),
        pods: batches.len(),
        ..RoundSummary::default()
    };

    let semaphore = Arc::new(Semaphore::new(config.requests_in_parallel));
    let mut join_set = JoinSet::new();

    for (pod_id, batch) in batches {
        let semaphore = Arc::clone(&semaphore);
        let store = Arc::clone(store);
        let directory = Arc::clone(directory);
        let transport = Arc::clone(transport);

        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return PodVerdict::Vacuous, // semaphore never closed
            };

            let pod = match directory.lookup_by_id(&pod_id) {
                Some(pod) => pod,
                None => {
                    // The pod is not our friend anymore: drop its
                    // destination bindings so these requests stop
                    // retrying against it.
                    tracing::info!(
                        "[scheduler] Removing {} requests of unknown pod {}",
                        batch.len(),
                        pod_id
                    );
                    if let Err(e) = store.remove_destination(&batch.ids, &pod_id) {
                        tracing::error!(
                            "[scheduler] Cannot prune requests of unknown pod {}: {}",
                            pod_id,
                            e
                        );
                    }
                    return PodVerdict::Vacuous;
                }
            };

            match transport.send(&pod, &batch).await {
                DeliveryOutcome::Delivered => {
                    tracing::debug!(
                        "[scheduler] Removing requests {:?} for pod {}",
                        batch.ids,
                        pod_id
                    );
                    if let Err(e) = store.remove_destination(&batch.ids, &pod_id) {
                        tracing::error!(
                            "[scheduler] Cannot mark requests delivered to pod {}: {}",
                            pod_id,
                            e
                        );
                    }
                    PodVerdict::Good(pod_id)
                }
                DeliveryOutcome::Failed { reason } => {
                    tracing::error!(
                        "[scheduler] Error sending secure request to pod {}: {}",
                        pod.url,
                        reason
                    );
                    PodVerdict::Bad(pod_id)
                }
            }
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(PodVerdict::Good(pod_id)) => summary.good.push(pod_id),
            Ok(PodVerdict::Bad(pod_id)) => summary.bad.push(pod_id),
            Ok(PodVerdict::Vacuous) => {}
            Err(e) => tracing::error!("[scheduler] Dispatch task panicked: {}", e),
        }
    }

    // Round barrier: every per-pod task has finished. Settle scores,
    // then sweep fully-delivered requests.
    reputation::update_pod_scores(directory.as_ref(), config, &summary.good, &summary.bad);

    match store.remove_empty_destinations() {
        Ok(removed) => summary.requests_completed = removed,
        Err(e) => {
            tracing::error!("[scheduler] Cannot remove fulfilled requests: {}", e);
        }
    }

    Ok(summary)
}
