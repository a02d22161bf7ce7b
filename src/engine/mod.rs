mod conflict;
mod error;
mod mutations;
mod queries;
mod resolve;
mod store;
mod txn;

pub use error::{Conflict, EngineError, ErrorKind, ValidationError};
pub use resolve::{normalize_room, ResourceKeys};
pub use store::{Catalog, InMemoryStore};

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock, Semaphore};
use tracing::{error, info};

use crate::limits::MAX_ENTRIES;
use crate::model::*;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

pub type SharedLane = Arc<RwLock<LaneState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL and batches appends for group commit: wait for one append,
/// take whatever else is already queued, write and fsync once, answer everyone.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<Pending>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();
    let result = write_batch(wal, &batch);
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

    if let Err(e) = &result {
        error!(error = %e, batch = batch.len(), "WAL batch failed, discarding it");
        if let Err(e) = wal.rollback_uncommitted() {
            error!(error = %e, "WAL rollback failed");
        }
    }
    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn write_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    for (event, _) in batch {
        wal.append_buffered(event)?;
    }
    wal.flush_sync()
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// Write one event through the group-commit writer. Returns once it is fsynced.
async fn append_to(wal_tx: &mpsc::Sender<WalCommand>, event: Event) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append { event, response: tx })
        .await
        .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::Storage(e.to_string()))
}

// ── Engine ───────────────────────────────────────────────

/// The scheduling engine: catalog, entries and lanes, kept durable by the WAL.
///
/// Adds lock the lanes they touch (teacher, class, room on one day) in
/// sorted order for the whole check + append + apply sequence, and hold a
/// catalog read guard so the association cannot be unlinked underneath them.
/// Append + apply runs on its own task (`persist_then`), so a
/// caller that gives up waiting cannot leave the log ahead of memory.
pub struct Engine {
    pub(super) store: Arc<InMemoryStore>,
    pub(super) catalog: Arc<RwLock<Catalog>>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// One permit per free entry slot. Taken before the WAL append,
    /// forgotten once the entry is applied, returned by the unlink cascade.
    pub(super) entry_capacity: Arc<Semaphore>,
    next_entry_id: AtomicU64,
}

/// Put an entry into the store and into every lane it occupies.
/// Caller holds the write guards of exactly those lanes.
fn place_entry(store: &InMemoryStore, entry: ScheduleEntry, lanes: &mut [OwnedRwLockWriteGuard<LaneState>]) {
    for lane in lanes.iter_mut() {
        lane.insert(Placement {
            entry_id: entry.id,
            slot: entry.slot,
        });
    }
    store.insert_entry(entry);
}

fn unplace_entry(store: &InMemoryStore, id: EntryId, lanes: &mut [OwnedRwLockWriteGuard<LaneState>]) {
    for lane in lanes.iter_mut() {
        lane.remove(id);
    }
    store.remove_entry(id);
}

/// Replay-time lane locking. Nothing else can see the store yet, so every
/// try-lock succeeds.
fn lock_uncontended(store: &InMemoryStore, keys: &[LaneKey]) -> Vec<OwnedRwLockWriteGuard<LaneState>> {
    keys.iter()
        .map(|k| {
            store
                .lane(k)
                .try_write_owned()
                .expect("replay: uncontended write")
        })
        .collect()
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = InMemoryStore::new();
        let mut catalog = Catalog::default();
        let mut next_entry_id: EntryId = 1;

        for event in &events {
            match event {
                Event::EntryAdded {
                    id,
                    class_id,
                    subject_id,
                    slot,
                    room,
                } => {
                    let entry = ScheduleEntry {
                        id: *id,
                        class_id: *class_id,
                        subject_id: *subject_id,
                        slot: *slot,
                        room: room.clone(),
                    };
                    let keys = resolve::keys_of(&catalog, &entry).lane_keys(slot.day);
                    let mut guards = lock_uncontended(&store, &keys);
                    place_entry(&store, entry, &mut guards);
                    next_entry_id = next_entry_id.max(id + 1);
                }
                Event::ClassSubjectUnlinked {
                    class_id,
                    subject_id,
                } => {
                    catalog.apply(event);
                    let link = ClassSubject {
                        class_id: *class_id,
                        subject_id: *subject_id,
                    };
                    for entry in store.entries_where(|e| e.class_subject() == link) {
                        let keys = resolve::keys_of(&catalog, &entry).lane_keys(entry.slot.day);
                        let mut guards = lock_uncontended(&store, &keys);
                        unplace_entry(&store, entry.id, &mut guards);
                    }
                }
                Event::Checkpoint { next_entry_id: n } => {
                    next_entry_id = next_entry_id.max(*n);
                }
                other => catalog.apply(other),
            }
        }

        info!(
            events = events.len(),
            entries = store.entry_count(),
            path = %wal_path.display(),
            "schedule store replayed"
        );
        metrics::gauge!(crate::observability::ENTRIES).set(store.entry_count() as f64);
        let free = MAX_ENTRIES.saturating_sub(store.entry_count());

        Ok(Self {
            store: Arc::new(store),
            catalog: Arc::new(RwLock::new(catalog)),
            wal_tx,
            entry_capacity: Arc::new(Semaphore::new(free)),
            next_entry_id: AtomicU64::new(next_entry_id),
        })
    }

    /// Make `event` durable, then run `apply`, on a task of its own.
    ///
    /// Dropping the returned future does not stop the task: once spawned,
    /// `apply` runs if and only if the fsync succeeded. Guards that `apply`
    /// captures stay held until it has run.
    pub(super) async fn persist_then<T, F>(&self, event: Event, apply: F) -> Result<T, EngineError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let wal_tx = self.wal_tx.clone();
        let task = tokio::spawn(async move {
            append_to(&wal_tx, event).await?;
            Ok(apply.await)
        });
        task.await
            .map_err(|e| EngineError::Storage(format!("commit task failed: {e}")))?
    }

    pub(super) fn allocate_entry_id(&self) -> EntryId {
        self.next_entry_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(super) fn peek_next_entry_id(&self) -> EntryId {
        self.next_entry_id.load(Ordering::Relaxed)
    }

    /// Swap in a writer channel with no receiver, so every append fails.
    #[cfg(test)]
    pub(crate) fn detach_wal(&mut self) {
        let (tx, _rx) = mpsc::channel(1);
        self.wal_tx = tx;
    }

    /// Shrink the entry cap so tests can reach it.
    #[cfg(test)]
    pub(crate) fn limit_entries(&mut self, max: usize) {
        let free = max.saturating_sub(self.store.entry_count());
        self.entry_capacity = Arc::new(Semaphore::new(free));
    }
}
