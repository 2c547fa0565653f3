use crate::directory::PeerDirectory;
use crate::error::{PodSyncError, Result};
use crate::types::{PeerId, PendingRequest, RequestId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const JOURNAL_FILE: &str = "requests.jsonl";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalRecord {
    Insert {
        id: RequestId,
        payload: serde_json::Value,
        to: Vec<PeerId>,
    },
    RemoveDest {
        ids: Vec<RequestId>,
        peer: PeerId,
    },
    Remove {
        ids: Vec<RequestId>,
    },
    Clear,
}

/// Durable queue of undelivered change events.
///
/// Mutations are journaled to `requests.jsonl` before the in-memory map
/// is touched; `open` replays the journal and compacts it down to the
/// surviving inserts. All mutation operations are safe to call from
/// concurrent per-pod dispatch tasks within one round.
pub struct RequestStore {
    path: PathBuf,
    requests: DashMap<RequestId, PendingRequest>,
    next_id: AtomicU64,
    journal: Mutex<BufWriter<File>>,
    directory: Arc<dyn PeerDirectory>,
}

impl RequestStore {
    pub fn open(dir: &Path, directory: Arc<dyn PeerDirectory>) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(JOURNAL_FILE);

        let requests = DashMap::new();
        let mut max_id: u64 = 0;

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<JournalRecord>(&line) {
                    Ok(record) => {
                        Self::replay(&requests, &mut max_id, record);
                    }
                    Err(e) => {
                        // A torn tail write is expected after a crash;
                        // anything else is still skippable.
                        tracing::warn!("[store] Skipping corrupt journal line: {}", e);
                    }
                }
            }
        }

        // Compact: rewrite the journal as the surviving inserts only.
        let tmp_path = dir.join(format!("{}.tmp", JOURNAL_FILE));
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            let mut live: Vec<PendingRequest> =
                requests.iter().map(|entry| entry.clone()).collect();
            live.sort_by_key(|r| r.id);
            for request in live {
                let record = JournalRecord::Insert {
                    id: request.id,
                    payload: request.payload,
                    to: request.to,
                };
                serde_json::to_writer(&mut writer, &record)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, &path)?;

        let file = OpenOptions::new().append(true).open(&path)?;

        Ok(RequestStore {
            path,
            requests,
            next_id: AtomicU64::new(max_id),
            journal: Mutex::new(BufWriter::new(file)),
            directory,
        })
    }

    fn replay(requests: &DashMap<RequestId, PendingRequest>, max_id: &mut u64, record: JournalRecord) {
        match record {
            JournalRecord::Insert { id, payload, to } => {
                if id > *max_id {
                    *max_id = id;
                }
                requests.insert(id, PendingRequest { id, payload, to });
            }
            JournalRecord::RemoveDest { ids, peer } => {
                for id in ids {
                    requests.alter(&id, |_, mut request| {
                        request.to.retain(|p| p != &peer);
                        request
                    });
                }
            }
            JournalRecord::Remove { ids } => {
                for id in ids {
                    requests.remove(&id);
                }
            }
            JournalRecord::Clear => {
                requests.clear();
            }
        }
    }

    fn append(&self, record: &JournalRecord) -> Result<()> {
        let mut journal = self
            .journal
            .lock()
            .map_err(|_| PodSyncError::Store("journal lock poisoned".to_string()))?;
        serde_json::to_writer(&mut *journal, record)?;
        journal.write_all(b"\n")?;
        journal.flush()?;
        Ok(())
    }

    /// Queue an event for replication. When `destinations` is omitted
    /// (or empty), the destination set is resolved to all currently
    /// known pods before the record is created, as a single step.
    pub fn insert(
        &self,
        payload: serde_json::Value,
        destinations: Option<Vec<PeerId>>,
    ) -> Result<RequestId> {
        let to = match destinations.filter(|d| !d.is_empty()) {
            Some(to) => to,
            None => self.directory.list_all_ids(),
        };
        if to.is_empty() {
            return Err(PodSyncError::NoPeers);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.append(&JournalRecord::Insert {
            id,
            payload: payload.clone(),
            to: to.clone(),
        })?;
        self.requests.insert(id, PendingRequest { id, payload, to });

        Ok(id)
    }

    /// Up to `limit` pending requests, oldest first.
    pub fn list_oldest(&self, limit: usize) -> Result<Vec<PendingRequest>> {
        let mut page: Vec<PendingRequest> =
            self.requests.iter().map(|entry| entry.clone()).collect();
        page.sort_by_key(|r| r.id);
        page.truncate(limit);
        Ok(page)
    }

    /// Remove `peer_id` from the destination set of every listed
    /// request. Atomic per record; destination sets only ever shrink.
    pub fn remove_destination(&self, ids: &[RequestId], peer_id: &str) -> Result<()> {
        self.append(&JournalRecord::RemoveDest {
            ids: ids.to_vec(),
            peer: peer_id.to_string(),
        })?;
        for id in ids {
            self.requests.alter(id, |_, mut request| {
                request.to.retain(|p| p != peer_id);
                request
            });
        }
        Ok(())
    }

    /// Delete every request owed to no pod. Returns how many were
    /// removed; running it twice in a row removes nothing the second
    /// time.
    pub fn remove_empty_destinations(&self) -> Result<usize> {
        let empty_ids: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|entry| entry.to.is_empty())
            .map(|entry| entry.id)
            .collect();

        if empty_ids.is_empty() {
            return Ok(0);
        }

        self.append(&JournalRecord::Remove {
            ids: empty_ids.clone(),
        })?;
        for id in &empty_ids {
            self.requests.remove(id);
        }
        Ok(empty_ids.len())
    }

    /// Administrative flush of the whole queue.
    pub fn remove_all(&self) -> Result<()> {
        self.append(&JournalRecord::Clear)?;
        self.requests.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn journal_path(&self) -> &Path {
        &self.path
    }
}
