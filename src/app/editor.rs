use std::future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};

use super::actions::{LoadNote, NoteActions};
use super::state::{EditorEvent, EditorUiState};
use crate::config::AutoSaveConfig;
use crate::error::NoteError;
use crate::journaling::{AutosaveScheduler, PersistKind, PersistReport, PersistRequest};
use crate::model::{Note, NoteId};
use crate::outcome::Outcome;
use crate::storage::NoteStore;
use crate::tasks::TaskGuard;

const EVENT_CAPACITY: usize = 16;

#[derive(Debug)]
enum EditorCommand {
    TitleChanged(String),
    ContentChanged(String),
    CloseRequested,
}

pub struct EditorScreen {
    commands: mpsc::UnboundedSender<EditorCommand>,
    state: watch::Receiver<EditorUiState>,
    events: broadcast::Sender<EditorEvent>,
    _task: TaskGuard,
}

impl EditorScreen {
    pub fn spawn(
        store: Arc<dyn NoteStore>,
        note_id: Option<NoteId>,
        config: &AutoSaveConfig,
    ) -> Self {
        let actions = NoteActions::new(store);
        let loader = note_id
            .clone()
            .map(|id| spawn_load(actions.load.clone(), id));
        let mut autosave =
            AutosaveScheduler::new(actions.upsert.clone(), config.debounce(), note_id.clone());
        // an existing note must not be written before its stored fields arrive
        autosave.set_held(loader.is_some());

        let (state_tx, state) = watch::channel(EditorUiState {
            note_id,
            ..EditorUiState::default()
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (commands, command_rx) = mpsc::unbounded_channel();

        let owner = EditorOwner {
            autosave,
            loader,
            state: state_tx,
            events: events.clone(),
            title_edited: false,
            content_edited: false,
            closed: false,
        };
        let task = TaskGuard::new(tokio::spawn(owner.run(command_rx)));
        Self {
            commands,
            state,
            events,
            _task: task,
        }
    }

    pub fn on_title_changed<S: Into<String>>(&self, title: S) {
        self.send(EditorCommand::TitleChanged(title.into()));
    }

    pub fn on_content_changed<S: Into<String>>(&self, content: S) {
        self.send(EditorCommand::ContentChanged(content.into()));
    }

    pub fn on_close_requested(&self) {
        self.send(EditorCommand::CloseRequested);
    }

    pub fn state(&self) -> watch::Receiver<EditorUiState> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> EditorUiState {
        self.state.borrow().clone()
    }

    /// Events emitted after this call. Earlier events are not replayed.
    pub fn events(&self) -> broadcast::Receiver<EditorEvent> {
        self.events.subscribe()
    }

    /// Tears the editor down. A persist already running is left to finish;
    /// one that has not started is dropped.
    pub fn shutdown(self) {
        tracing::debug!(note_id = ?self.state.borrow().note_id, "editor torn down");
    }

    fn send(&self, command: EditorCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!("editor owner task is gone");
        }
    }
}

struct EditorOwner {
    autosave: AutosaveScheduler,
    loader: Option<TaskGuard<Outcome<Note>>>,
    state: watch::Sender<EditorUiState>,
    events: broadcast::Sender<EditorEvent>,
    title_edited: bool,
    content_edited: bool,
    closed: bool,
}

impl EditorOwner {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<EditorCommand>) {
        while !self.closed {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                loaded = initial_load(&mut self.loader) => self.apply_load(loaded),
                report = self.autosave.next() => self.apply_report(report),
            }
        }
        tracing::debug!(
            closed = self.closed,
            idle = self.autosave.is_idle(),
            note_id = ?self.autosave.assigned_id(),
            "editor owner stopped"
        );
    }

    fn handle(&mut self, command: EditorCommand) {
        match command {
            EditorCommand::TitleChanged(title) => {
                self.title_edited = true;
                self.state.send_modify(|state| {
                    state.title = title;
                    state.error_message = None;
                });
                let request = self.persist_request();
                self.autosave.schedule_deferred(request);
            }
            EditorCommand::ContentChanged(content) => {
                self.content_edited = true;
                self.state.send_modify(|state| {
                    state.content = content;
                    state.error_message = None;
                });
                let request = self.persist_request();
                self.autosave.schedule_deferred(request);
            }
            EditorCommand::CloseRequested => {
                if self.autosave.is_flushing() {
                    tracing::debug!("close already in progress");
                    return;
                }
                self.autosave.cancel_pending();
                self.state.send_modify(|state| state.is_saving = true);
                let request = self.persist_request();
                self.autosave.flush(request);
            }
        }
    }

    fn apply_load(&mut self, loaded: Outcome<Note>) {
        match loaded {
            Outcome::Success(note) => {
                let (keep_title, keep_content) = (self.title_edited, self.content_edited);
                self.state.send_modify(|state| {
                    if !keep_title {
                        state.title = note.title;
                    }
                    if !keep_content {
                        state.content = note.content;
                    }
                });
            }
            Outcome::Error(err) => {
                tracing::warn!(error = %err, "loading note for editor failed");
                self.state
                    .send_modify(|state| state.error_message = Some(err.to_string()));
            }
        }
        let request = self.persist_request();
        self.autosave.release(request);
    }

    fn apply_report(&mut self, report: PersistReport) {
        let flush = report.kind == PersistKind::Flush;
        match report.result {
            Outcome::Success(assigned) => {
                self.state.send_modify(|state| {
                    if state.note_id.is_none() {
                        state.note_id = assigned;
                    }
                    if flush {
                        state.is_saving = false;
                    }
                });
                if flush {
                    self.emit(EditorEvent::Close);
                    self.closed = true;
                }
            }
            Outcome::Error(err) => {
                let message = err.to_string();
                tracing::warn!(kind = ?report.kind, error = %message, "persisting note failed");
                self.state.send_modify(|state| {
                    state.error_message = Some(message.clone());
                    if flush {
                        state.is_saving = false;
                    }
                });
                self.emit(EditorEvent::ShowError(message));
            }
        }
    }

    fn persist_request(&self) -> PersistRequest {
        let state = self.state.borrow();
        PersistRequest {
            note_id: state.note_id.clone(),
            title: state.title.clone(),
            content: state.content.clone(),
        }
    }

    fn emit(&self, event: EditorEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("no editor event listeners");
        }
    }
}

// Store faults while loading surface as an editor error.
fn spawn_load(load: LoadNote, id: NoteId) -> TaskGuard<Outcome<Note>> {
    TaskGuard::new(tokio::spawn(async move {
        let mut feed = load.call(&id);
        feed.next().await.unwrap_or_else(|| {
            Outcome::Error(NoteError::unknown("note load ended without a result"))
        })
    }))
}

async fn initial_load(slot: &mut Option<TaskGuard<Outcome<Note>>>) -> Outcome<Note> {
    let Some(task) = slot.as_mut() else {
        return future::pending().await;
    };
    let loaded = match task.join().await {
        Ok(loaded) => loaded,
        Err(err) => {
            tracing::error!(error = %err, "note load task failed");
            Outcome::Error(NoteError::from(err))
        }
    };
    *slot = None;
    loaded
}
