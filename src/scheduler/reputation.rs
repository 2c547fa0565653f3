use crate::config::SchedulerConfig;
use crate::directory::PeerDirectory;
use crate::types::PeerId;

/// Apply round outcomes to pod scores, then evict pods that have run
/// out of trust.
///
/// Score changes are relative increments applied inside the directory,
/// so two overlapping callers (or concurrent manual administration)
/// cannot lose updates. A failed increment is logged and does not block
/// the other list.
pub fn update_pod_scores(
    directory: &dyn PeerDirectory,
    config: &SchedulerConfig,
    good: &[PeerId],
    bad: &[PeerId],
) {
    tracing::info!(
        "[scheduler] Updating {} good and {} bad pod scores",
        good.len(),
        bad.len()
    );

    if let Err(e) = directory.increment_scores(good, config.score_bonus) {
        tracing::error!("[scheduler] Cannot increment scores of good pods: {}", e);
    }

    if let Err(e) = directory.increment_scores(bad, config.score_malus) {
        tracing::error!("[scheduler] Cannot decrement scores of bad pods: {}", e);
    }

    evict_zero_score_pods(directory);
}

/// Remove pods whose score reached zero or below (too many rounds where
/// they were unreachable). Best-effort per pod: one failed removal does
/// not block the others. Returns how many pods were removed.
pub fn evict_zero_score_pods(directory: &dyn PeerDirectory) -> usize {
    let bad_pods = directory.list_zero_score_peers();

    if bad_pods.is_empty() {
        tracing::debug!("[scheduler] No pods to evict");
        return 0;
    }

    let mut removed = 0;
    for pod in &bad_pods {
        match directory.remove(&pod.id) {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::error!("[scheduler] Cannot evict pod {}: {}", pod.id, e);
            }
        }
    }

    tracing::info!("[scheduler] Evicted {} unreachable pods", removed);
    removed
}
