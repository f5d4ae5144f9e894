//! Scripted `NoteStore` double for the screen and pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::{mpsc, Notify};

use crate::error::NoteError;
use crate::model::{Note, NoteId};
use crate::storage::{NoteStore, Subscription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StoreCall {
    ObserveActive(String),
    ObserveOne(NoteId),
    Create { title: String, content: String },
    Update { id: NoteId, title: String, content: String },
    SoftDelete(NoteId),
    UndoDelete(NoteId),
}

/// One opened live subscription. The test decides what and when it emits.
pub(crate) struct ScriptedFeed {
    pub query: String,
    pub sender: mpsc::Sender<Result<Vec<Note>, NoteError>>,
}

impl ScriptedFeed {
    pub async fn emit(&self, notes: Vec<Note>) -> bool {
        self.sender.send(Ok(notes)).await.is_ok()
    }

    pub async fn fail(&self, err: NoteError) -> bool {
        self.sender.send(Err(err)).await.is_ok()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum QueryFault {
    Refuse(NoteError),
    Panic(String),
}

pub(crate) struct ScriptedStore {
    feeds: mpsc::UnboundedSender<ScriptedFeed>,
    calls: Mutex<Vec<StoreCall>>,
    loads: Mutex<HashMap<NoteId, Result<Note, NoteError>>>,
    load_panics: Mutex<HashMap<NoteId, String>>,
    faults: Mutex<HashMap<String, QueryFault>>,
    persist_failure: Mutex<Option<NoteError>>,
    persist_gate: Mutex<Option<Arc<Notify>>>,
    next_id: AtomicU64,
}

impl ScriptedStore {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ScriptedFeed>) {
        let (feeds, rx) = mpsc::unbounded_channel();
        let store = Arc::new(Self {
            feeds,
            calls: Mutex::new(Vec::new()),
            loads: Mutex::new(HashMap::new()),
            load_panics: Mutex::new(HashMap::new()),
            faults: Mutex::new(HashMap::new()),
            persist_failure: Mutex::new(None),
            persist_gate: Mutex::new(None),
            next_id: AtomicU64::new(1),
        });
        (store, rx)
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    pub fn persist_calls(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, StoreCall::Create { .. } | StoreCall::Update { .. }))
            .collect()
    }

    pub fn observed_queries(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::ObserveActive(query) => Some(query),
                _ => None,
            })
            .collect()
    }

    pub fn set_load(&self, id: &str, result: Result<Note, NoteError>) {
        self.loads.lock().insert(NoteId::new(id), result);
    }

    pub fn panic_on_load(&self, id: &str, message: &str) {
        self.load_panics
            .lock()
            .insert(NoteId::new(id), message.to_string());
    }

    pub fn fault_query(&self, query: &str, fault: QueryFault) {
        self.faults.lock().insert(query.to_string(), fault);
    }

    pub fn fail_persist(&self, err: NoteError) {
        *self.persist_failure.lock() = Some(err);
    }

    /// Makes every create/update wait for one `notify_one` on the returned
    /// handle before completing.
    pub fn gate_persist(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.persist_gate.lock() = Some(gate.clone());
        gate
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().push(call);
    }

    async fn persist_checkpoint(&self) -> Result<(), NoteError> {
        let gate = self.persist_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.persist_failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub(crate) fn note(id: &str, title: &str, content: &str) -> Note {
    let now = OffsetDateTime::now_utc();
    Note {
        id: NoteId::new(id),
        title: title.to_string(),
        content: content.to_string(),
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl NoteStore for ScriptedStore {
    fn observe_active(&self, filter: &str) -> Result<Subscription<Vec<Note>>, NoteError> {
        self.record(StoreCall::ObserveActive(filter.to_string()));
        let fault = self.faults.lock().get(filter).cloned();
        match fault {
            Some(QueryFault::Refuse(err)) => return Err(err),
            Some(QueryFault::Panic(message)) => panic!("{message}"),
            None => {}
        }
        let (sender, rx) = mpsc::channel(8);
        let _ = self.feeds.send(ScriptedFeed {
            query: filter.to_string(),
            sender,
        });
        Ok(rx)
    }

    fn observe_one(&self, id: &NoteId) -> Result<Subscription<Note>, NoteError> {
        self.record(StoreCall::ObserveOne(id.clone()));
        let crash = self.load_panics.lock().get(id).cloned();
        if let Some(message) = crash {
            panic!("{message}");
        }
        let result = self
            .loads
            .lock()
            .get(id)
            .cloned()
            .unwrap_or_else(|| Err(NoteError::NotFound(id.to_string())));
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(result);
        Ok(rx)
    }

    async fn create(&self, title: &str, content: &str) -> Result<NoteId, NoteError> {
        self.record(StoreCall::Create {
            title: title.to_string(),
            content: content.to_string(),
        });
        self.persist_checkpoint().await?;
        let next = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(NoteId::new(format!("note-{next}")))
    }

    async fn update(&self, id: &NoteId, title: &str, content: &str) -> Result<(), NoteError> {
        self.record(StoreCall::Update {
            id: id.clone(),
            title: title.to_string(),
            content: content.to_string(),
        });
        self.persist_checkpoint().await
    }

    async fn soft_delete(&self, id: &NoteId) -> Result<(), NoteError> {
        self.record(StoreCall::SoftDelete(id.clone()));
        Ok(())
    }

    async fn undo_delete(&self, id: &NoteId) -> Result<(), NoteError> {
        self.record(StoreCall::UndoDelete(id.clone()));
        Ok(())
    }
}
