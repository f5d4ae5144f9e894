use std::future;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::app::actions::UpsertNote;
use crate::model::NoteId;
use crate::outcome::Outcome;
use crate::tasks::Debouncer;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PersistKind {
    Deferred,
    Flush,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistRequest {
    pub note_id: Option<NoteId>,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub kind: PersistKind,
    pub result: Outcome<Option<NoteId>>,
}

#[derive(Debug)]
struct InFlight {
    kind: PersistKind,
    handle: JoinHandle<Outcome<Option<NoteId>>>,
}

// At most one persist runs at a time; a due one waits in `queued` and picks
// up the id a finished create assigned. Dropping the scheduler detaches the
// in-flight persist instead of aborting it.
pub struct AutosaveScheduler {
    upsert: UpsertNote,
    timer: Debouncer<PersistRequest>,
    queued: Option<(PersistKind, PersistRequest)>,
    in_flight: Option<InFlight>,
    assigned: Option<NoteId>,
    held: bool,
}

impl AutosaveScheduler {
    pub fn new(upsert: UpsertNote, delay: Duration, initial_id: Option<NoteId>) -> Self {
        Self {
            upsert,
            timer: Debouncer::new(delay),
            queued: None,
            in_flight: None,
            assigned: initial_id,
            held: false,
        }
    }

    pub fn assigned_id(&self) -> Option<&NoteId> {
        self.assigned.as_ref()
    }

    pub fn schedule_deferred(&mut self, snapshot: PersistRequest) {
        self.timer.push(snapshot);
        if matches!(self.queued, Some((PersistKind::Deferred, _))) {
            self.queued = None;
        }
    }

    /// Returns `false` when a flush is already pending or running.
    pub fn flush(&mut self, snapshot: PersistRequest) -> bool {
        if self.is_flushing() {
            return false;
        }
        self.timer.cancel();
        self.queued = Some((PersistKind::Flush, snapshot));
        self.start_if_idle();
        true
    }

    pub fn cancel_pending(&mut self) {
        self.timer.cancel();
        if matches!(self.queued, Some((PersistKind::Deferred, _))) {
            self.queued = None;
        }
    }

    pub fn is_flushing(&self) -> bool {
        matches!(self.queued, Some((PersistKind::Flush, _)))
            || matches!(
                self.in_flight,
                Some(InFlight {
                    kind: PersistKind::Flush,
                    ..
                })
            )
    }

    pub fn is_idle(&self) -> bool {
        !self.timer.is_pending() && self.queued.is_none() && self.in_flight.is_none()
    }

    pub fn set_held(&mut self, held: bool) {
        self.held = held;
        if !held {
            self.start_if_idle();
        }
    }

    // nothing captured before the release is written
    pub fn release(&mut self, snapshot: PersistRequest) {
        self.timer.refresh(snapshot.clone());
        if let Some((_, request)) = self.queued.as_mut() {
            *request = snapshot;
        }
        self.set_held(false);
    }

    /// Cancel-safe.
    pub async fn next(&mut self) -> PersistReport {
        loop {
            tokio::select! {
                request = self.timer.settled() => {
                    if !matches!(self.queued, Some((PersistKind::Flush, _))) {
                        self.queued = Some((PersistKind::Deferred, request));
                    }
                    self.start_if_idle();
                }
                (kind, result) = in_flight_done(&mut self.in_flight) => {
                    if let Outcome::Success(Some(id)) = &result {
                        if self.assigned.is_none() {
                            self.assigned = Some(id.clone());
                        }
                    }
                    self.start_if_idle();
                    return PersistReport { kind, result };
                }
            }
        }
    }

    fn start_if_idle(&mut self) {
        if self.held || self.in_flight.is_some() {
            return;
        }
        let Some((kind, mut request)) = self.queued.take() else {
            return;
        };
        if request.note_id.is_none() {
            request.note_id = self.assigned.clone();
        }
        tracing::debug!(?kind, note_id = ?request.note_id, "starting persist");
        let upsert = self.upsert.clone();
        let handle = tokio::spawn(async move {
            upsert
                .call(request.note_id.as_ref(), &request.title, &request.content)
                .await
        });
        self.in_flight = Some(InFlight { kind, handle });
    }
}

async fn in_flight_done(slot: &mut Option<InFlight>) -> (PersistKind, Outcome<Option<NoteId>>) {
    let Some(in_flight) = slot.as_mut() else {
        return future::pending().await;
    };
    let joined = (&mut in_flight.handle).await;
    let kind = in_flight.kind;
    *slot = None;
    let result = match joined {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(?kind, error = %err, "persist task failed");
            Outcome::Error(err.into())
        }
    };
    (kind, result)
}
