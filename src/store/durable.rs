use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::info;

use crate::model::*;
use crate::wal::Wal;

use super::{MemoryStore, ReservationStore, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the batch result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            commit_batch(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                if !batch.is_empty() {
                    commit_batch(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
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
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Durable store: in-memory rows, every mutation logged to the WAL first.
pub struct WalStore {
    state: MemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold it shared across append + apply; compaction holds it
    /// exclusively so its snapshot matches what the log has seen.
    gate: RwLock<()>,
    path: PathBuf,
}

impl WalStore {
    /// Replay the log at `wal_path` and start the writer task.
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: &Path) -> io::Result<Self> {
        let events = Wal::recover(wal_path)?;
        let wal = Wal::open(wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let state = MemoryStore::new();
        for event in &events {
            state.apply(event);
        }
        info!(
            "replayed {} events from {}: {} reservations, next id {}",
            events.len(),
            wal_path.display(),
            state.len(),
            state.next_id()
        );

        Ok(Self {
            state,
            wal_tx,
            gate: RwLock::new(()),
            path: wal_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    /// Rewrite the WAL as the minimal event list that recreates current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _exclusive = self.gate.write().await;

        let mut events = vec![Event::SequenceAdvanced {
            next_id: self.state.next_id(),
        }];
        events.extend(
            self.state
                .snapshot()
                .into_iter()
                .map(|reservation| Event::ReservationCreated { reservation }),
        );

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl ReservationStore for WalStore {
    async fn insert(&self, record: NewReservation) -> Result<ReservationId, StoreError> {
        let _shared = self.gate.read().await;
        self.state.ensure_capacity()?;
        // A failed append burns the id, which keeps ids unique.
        let id = self.state.allocate_id();
        let event = Event::ReservationCreated {
            reservation: Reservation::new(id, record),
        };
        self.wal_append(&event).await?;
        self.state.apply(&event);
        Ok(id)
    }

    async fn list_all(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.state.snapshot())
    }

    async fn list_by_table(&self, table_id: &str) -> Result<Vec<Timestamp>, StoreError> {
        Ok(self.state.arrival_times(table_id))
    }

    async fn delete(&self, id: ReservationId) -> Result<bool, StoreError> {
        let _shared = self.gate.read().await;
        if !self.state.contains(id) {
            return Ok(false);
        }
        let event = Event::ReservationDeleted { id };
        self.wal_append(&event).await?;
        self.state.apply(&event);
        Ok(true)
    }
}
