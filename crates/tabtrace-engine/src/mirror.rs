//! Best-effort durable mirror of the in-memory cache.
//!
//! A single blocking worker owns the SQLite writes and applies them in the
//! order they were queued. Fact writes are fire-and-forget; tab deletion,
//! expiry and record saves report back. Reads run on the blocking pool
//! and come back empty while the database is still opening or failed to open.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use tabtrace_core::{Fact, TabId, TimingRecord};
use tabtrace_store::{
    CleanupRepo, Database, FactRepo, StoreError, StoreStats, TabDeletion, TimingRecordRepo,
};

use crate::error::EngineError;

struct Repos {
    facts: FactRepo,
    records: TimingRecordRepo,
    cleanup: CleanupRepo,
}

impl Repos {
    fn new(db: Database) -> Self {
        Self {
            facts: FactRepo::new(db.clone()),
            records: TimingRecordRepo::new(db.clone()),
            cleanup: CleanupRepo::new(db),
        }
    }
}

enum MirrorState {
    Opening,
    Ready(Arc<Repos>),
    Unavailable(String),
}

type Ack<T> = oneshot::Sender<Result<T, EngineError>>;

enum Command {
    PutFact(Fact),
    ClearFacts(TabId),
    PutRecord(TimingRecord, Ack<()>),
    DeleteTab(TabId, Ack<TabDeletion>),
    DeleteExpired(i64, Ack<usize>),
    Flush(oneshot::Sender<()>),
}

pub struct StoreMirror {
    tx: mpsc::UnboundedSender<Command>,
    state: Arc<RwLock<MirrorState>>,
}

impl StoreMirror {
    /// Open (or create) the database at `path` on the worker thread.
    pub fn open(path: PathBuf) -> Self {
        Self::spawn(move || Database::open(&path))
    }

    /// Mirror backed by a private in-memory database.
    pub fn in_memory() -> Self {
        Self::spawn(Database::in_memory)
    }

    /// Mirror with no durable store; every read is empty and every
    /// acknowledged write fails with `StoreUnavailable`.
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self {
            tx,
            state: Arc::new(RwLock::new(MirrorState::Unavailable("disabled".into()))),
        }
    }

    fn spawn<F>(opener: F) -> Self
    where
        F: FnOnce() -> Result<Database, StoreError> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(MirrorState::Opening));
        let worker_state = state.clone();

        tokio::task::spawn_blocking(move || {
            let repos = match opener() {
                Ok(db) => {
                    info!(path = %db.path().display(), "durable mirror ready");
                    let repos = Arc::new(Repos::new(db));
                    *worker_state.write() = MirrorState::Ready(repos.clone());
                    Some(repos)
                }
                Err(e) => {
                    error!(error = %e, "durable mirror unavailable, continuing in memory only");
                    *worker_state.write() = MirrorState::Unavailable(e.to_string());
                    None
                }
            };
            run_worker(rx, repos.as_deref());
        });

        Self { tx, state }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.read(), MirrorState::Ready(_))
    }

    /// Human-readable state for health output.
    pub fn status(&self) -> String {
        match &*self.state.read() {
            MirrorState::Opening => "opening".into(),
            MirrorState::Ready(_) => "ready".into(),
            MirrorState::Unavailable(reason) => format!("unavailable: {reason}"),
        }
    }

    fn repos(&self) -> Option<Arc<Repos>> {
        match &*self.state.read() {
            MirrorState::Ready(repos) => Some(repos.clone()),
            _ => None,
        }
    }

    fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn put_fact(&self, fact: Fact) {
        if !self.send(Command::PutFact(fact)) {
            debug!("mirror closed, fact kept in memory only");
        }
    }

    /// Drop the durable facts of a tab's previous generation.
    pub fn clear_facts(&self, tab_id: TabId) {
        if !self.send(Command::ClearFacts(tab_id)) {
            debug!(%tab_id, "mirror closed, durable facts not cleared");
        }
    }

    pub async fn put_record(&self, record: TimingRecord) -> Result<(), EngineError> {
        self.request(|ack| Command::PutRecord(record, ack)).await
    }

    pub async fn delete_tab(&self, tab_id: TabId) -> Result<TabDeletion, EngineError> {
        self.request(|ack| Command::DeleteTab(tab_id, ack)).await
    }

    pub async fn delete_expired(&self, cutoff_ms: i64) -> Result<usize, EngineError> {
        self.request(|ack| Command::DeleteExpired(cutoff_ms, ack)).await
    }

    /// Wait until every command queued before this call has been applied.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::Flush(tx)) {
            let _ = rx.await;
        }
    }

    async fn request<T>(&self, build: impl FnOnce(Ack<T>) -> Command) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        if !self.send(build(tx)) {
            return Err(EngineError::StoreUnavailable);
        }
        rx.await.map_err(|_| EngineError::StoreUnavailable)?
    }

    /// Durable record for a tab; `None` while the store is not ready.
    pub async fn get_record(&self, tab_id: TabId) -> Result<Option<TimingRecord>, EngineError> {
        self.read(None, move |repos| repos.records.get(tab_id)).await
    }

    /// Durable URL -> IP mapping for a tab; empty while the store is not
    /// ready.
    pub async fn facts_for_tab(&self, tab_id: TabId) -> Result<HashMap<String, String>, EngineError> {
        self.read(HashMap::new(), move |repos| repos.facts.map_for_tab(tab_id))
            .await
    }

    pub async fn stats(&self) -> Result<StoreStats, EngineError> {
        self.read(StoreStats::default(), |repos| repos.cleanup.stats())
            .await
    }

    /// Run a read on the blocking pool; the connection lock may be held by
    /// the worker for the length of a write.
    async fn read<T, F>(&self, empty: T, read: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&Repos) -> Result<T, StoreError> + Send + 'static,
    {
        let Some(repos) = self.repos() else {
            return Ok(empty);
        };
        let result = tokio::task::spawn_blocking(move || read(repos.as_ref()))
            .await
            .map_err(|e| EngineError::Internal(format!("durable read task: {e}")))?;
        Ok(result?)
    }
}

fn run_worker(mut rx: mpsc::UnboundedReceiver<Command>, repos: Option<&Repos>) {
    while let Some(command) = rx.blocking_recv() {
        match repos {
            Some(repos) => apply(repos, command),
            None => reject(command),
        }
    }
    debug!("durable mirror worker stopped");
}

fn apply(repos: &Repos, command: Command) {
    match command {
        Command::PutFact(fact) => {
            if let Err(e) = repos.facts.put(&fact) {
                warn!(tab_id = %fact.tab_id, url = %fact.url, error = %e, "fact mirror write failed");
            }
        }
        Command::ClearFacts(tab_id) => {
            if let Err(e) = repos.facts.delete_for_tab(tab_id) {
                warn!(%tab_id, error = %e, "fact mirror clear failed");
            }
        }
        Command::PutRecord(record, ack) => {
            let _ = ack.send(repos.records.put(&record).map_err(EngineError::from));
        }
        Command::DeleteTab(tab_id, ack) => {
            let _ = ack.send(repos.cleanup.delete_tab(tab_id).map_err(EngineError::from));
        }
        Command::DeleteExpired(cutoff, ack) => {
            let _ = ack.send(repos.cleanup.delete_expired(cutoff).map_err(EngineError::from));
        }
        Command::Flush(ack) => {
            let _ = ack.send(());
        }
    }
}

fn reject(command: Command) {
    match command {
        Command::PutFact(_) | Command::ClearFacts(_) => {}
        Command::PutRecord(_, ack) => {
            let _ = ack.send(Err(EngineError::StoreUnavailable));
        }
        Command::DeleteTab(_, ack) => {
            let _ = ack.send(Err(EngineError::StoreUnavailable));
        }
        Command::DeleteExpired(_, ack) => {
            let _ = ack.send(Err(EngineError::StoreUnavailable));
        }
        Command::Flush(ack) => {
            let _ = ack.send(());
        }
    }
}
