use async_trait::async_trait;
use dashmap::DashMap;
use podsync::config::SchedulerConfig;
use podsync::directory::{MemoryDirectory, PeerDirectory};
use podsync::scheduler::Scheduler;
use podsync::store::RequestStore;
use podsync::transport::{DeliveryOutcome, SecureTransport};
use podsync::types::{DispatchBatch, Peer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// One recorded send: which pod, which request ids, in which order.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct RecordedSend {
    pub pod_id: String,
    pub request_ids: Vec<u64>,
    pub payloads: Vec<serde_json::Value>,
}

/// In-memory transport scripted per pod: pods listed in `failing` get a
/// Failed outcome, everything else is Delivered. Records every send and
/// tracks the peak number of concurrently in-flight sends.
pub struct ScriptedTransport {
    failing: DashMap<String, ()>,
    sends: DashMap<u64, RecordedSend>,
    send_seq: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::from_millis(0))
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            failing: DashMap::new(),
            sends: DashMap::new(),
            send_seq: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn fail_pod(&self, pod_id: &str) {
        self.failing.insert(pod_id.to_string(), ());
    }

    pub fn heal_pod(&self, pod_id: &str) {
        self.failing.remove(pod_id);
    }

    pub fn sends(&self) -> Vec<RecordedSend> {
        let mut sends: Vec<(u64, RecordedSend)> = self
            .sends
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        sends.sort_by_key(|(seq, _)| *seq);
        sends.into_iter().map(|(_, send)| send).collect()
    }

    pub fn sends_to(&self, pod_id: &str) -> Vec<RecordedSend> {
        self.sends()
            .into_iter()
            .filter(|send| send.pod_id == pod_id)
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecureTransport for ScriptedTransport {
    async fn send(&self, peer: &Peer, batch: &DispatchBatch) -> DeliveryOutcome {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let seq = self.send_seq.fetch_add(1, Ordering::SeqCst) as u64;
        self.sends.insert(
            seq,
            RecordedSend {
                pod_id: peer.id.clone(),
                request_ids: batch.ids.clone(),
                payloads: batch.payloads.clone(),
            },
        );

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains_key(&peer.id) {
            DeliveryOutcome::Failed {
                reason: "Status code not 20x: 500".to_string(),
            }
        } else {
            DeliveryOutcome::Delivered
        }
    }
}

/// Everything a dispatch test needs, wired together on a temp dir.
#[allow(dead_code)]
pub struct Harness {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<RequestStore>,
    pub directory: Arc<MemoryDirectory>,
    pub transport: Arc<ScriptedTransport>,
    pub config: SchedulerConfig,
    // Held so the store's journal dir outlives the test body
    pub tmp: TempDir,
}

#[allow(dead_code)]
pub fn harness_with_pods(config: SchedulerConfig, pods: &[&str]) -> Harness {
    harness_with_transport(config, pods, ScriptedTransport::new())
}

#[allow(dead_code)]
pub fn harness_with_transport(
    config: SchedulerConfig,
    pods: &[&str],
    transport: Arc<ScriptedTransport>,
) -> Harness {
    let tmp = TempDir::new().unwrap();

    let directory = Arc::new(MemoryDirectory::new(config.base_score, config.max_score));
    for pod in pods {
        directory.admit(pod, &format!("http://{}.example.com", pod));
    }

    let store = Arc::new(
        RequestStore::open(
            tmp.path(),
            Arc::clone(&directory) as Arc<dyn PeerDirectory>,
        )
        .unwrap(),
    );

    let scheduler = Scheduler::new(
        config.clone(),
        Arc::clone(&store),
        Arc::clone(&directory) as Arc<dyn PeerDirectory>,
        Arc::clone(&transport) as Arc<dyn SecureTransport>,
    );

    Harness {
        scheduler,
        store,
        directory,
        transport,
        config,
        tmp,
    }
}
