use std::time::Duration;

use tokio::sync::mpsc;

use crate::app::actions::ObserveNotes;
use crate::model::Note;
use crate::outcome::Outcome;
use crate::tasks::{panic_message, Debouncer, TaskGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListPartial {
    Loading { query: String },
    Data { query: String, notes: Vec<Note> },
    Error { query: String, message: String },
}

impl ListPartial {
    pub fn query(&self) -> &str {
        match self {
            ListPartial::Loading { query }
            | ListPartial::Data { query, .. }
            | ListPartial::Error { query, .. } => query,
        }
    }
}

#[derive(Debug)]
struct Tagged {
    generation: u64,
    partial: ListPartial,
}

// Partials carry the generation of the subscription that produced them;
// anything queued by an aborted subscription is dropped in `accept`.
pub struct QueryPipeline {
    observe: ObserveNotes,
    debouncer: Debouncer<String>,
    current: Option<String>,
    generation: u64,
    active: Option<TaskGuard>,
    partials_tx: mpsc::UnboundedSender<Tagged>,
    partials_rx: mpsc::UnboundedReceiver<Tagged>,
}

impl QueryPipeline {
    pub fn new(observe: ObserveNotes, quiet: Duration) -> Self {
        let (partials_tx, partials_rx) = mpsc::unbounded_channel();
        Self {
            observe,
            debouncer: Debouncer::new(quiet),
            current: None,
            generation: 0,
            active: None,
            partials_tx,
            partials_rx,
        }
    }

    pub fn push<S: AsRef<str>>(&mut self, raw: S) {
        self.debouncer.push(raw.as_ref().trim().to_string());
    }

    /// Cancel-safe: a pending query or queued partial survives a dropped
    /// call.
    pub async fn next(&mut self) -> ListPartial {
        loop {
            tokio::select! {
                query = self.debouncer.settled() => {
                    if let Some(loading) = self.switch_to(query) {
                        return loading;
                    }
                }
                Some(tagged) = self.partials_rx.recv() => {
                    if let Some(partial) = self.accept(tagged) {
                        return partial;
                    }
                }
            }
        }
    }

    pub fn switch_to(&mut self, query: String) -> Option<ListPartial> {
        if self.current.as_deref() == Some(query.as_str()) {
            tracing::trace!(%query, "query unchanged, keeping subscription");
            return None;
        }
        Some(self.resubscribe(query))
    }

    pub fn retry(&mut self) -> Option<ListPartial> {
        let query = self.current.clone()?;
        Some(self.resubscribe(query))
    }

    pub fn cancel(&mut self) {
        self.debouncer.cancel();
        if let Some(previous) = self.active.take() {
            previous.abort();
        }
    }

    fn resubscribe(&mut self, query: String) -> ListPartial {
        if let Some(previous) = self.active.take() {
            previous.abort();
        }
        self.generation += 1;
        self.current = Some(query.clone());
        tracing::debug!(%query, generation = self.generation, "switching live subscription");
        self.active = Some(spawn_subscription(
            self.observe.clone(),
            query.clone(),
            self.generation,
            self.partials_tx.clone(),
        ));
        ListPartial::Loading { query }
    }

    fn accept(&self, tagged: Tagged) -> Option<ListPartial> {
        if tagged.generation != self.generation {
            tracing::trace!(
                stale = tagged.generation,
                current = self.generation,
                query = tagged.partial.query(),
                "dropping partial from superseded subscription"
            );
            return None;
        }
        Some(tagged.partial)
    }
}

// A panic inside the store surfaces as an `Error` partial.
fn spawn_subscription(
    observe: ObserveNotes,
    query: String,
    generation: u64,
    tx: mpsc::UnboundedSender<Tagged>,
) -> TaskGuard {
    TaskGuard::new(tokio::spawn(async move {
        let forward_query = query.clone();
        let forward_tx = tx.clone();
        let mut forward = TaskGuard::new(tokio::spawn(async move {
            let mut feed = observe.call(&forward_query);
            while let Some(outcome) = feed.next().await {
                let partial = match outcome {
                    Outcome::Success(notes) => ListPartial::Data {
                        query: forward_query.clone(),
                        notes,
                    },
                    Outcome::Error(err) => ListPartial::Error {
                        query: forward_query.clone(),
                        message: err.to_string(),
                    },
                };
                if forward_tx.send(Tagged { generation, partial }).is_err() {
                    break;
                }
            }
        }));

        if let Err(err) = forward.join().await {
            if err.is_panic() {
                let message = panic_message(err);
                tracing::error!(%query, %message, "note subscription panicked");
                let _ = tx.send(Tagged {
                    generation,
                    partial: ListPartial::Error { query, message },
                });
            }
        }
    }))
}
