use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use super::actions::{DeleteNote, NoteActions};
use super::state::{reduce, ListUiState};
use crate::config::SearchOptions;
use crate::model::NoteId;
use crate::outcome::Outcome;
use crate::search::{ListPartial, QueryPipeline};
use crate::storage::NoteStore;
use crate::tasks::TaskGuard;

#[derive(Debug)]
enum ListCommand {
    QueryChanged(String),
    Retry,
    Delete(NoteId),
    UndoDelete(NoteId),
}

/// Dropping the handle aborts the owner together with its subscription and
/// pending mutations.
pub struct ListScreen {
    commands: mpsc::UnboundedSender<ListCommand>,
    state: watch::Receiver<ListUiState>,
    _task: TaskGuard,
}

impl ListScreen {
    pub fn spawn(store: Arc<dyn NoteStore>, options: &SearchOptions) -> Self {
        let actions = NoteActions::new(store);
        let mut pipeline = QueryPipeline::new(actions.observe.clone(), options.debounce());
        pipeline.push(String::new());

        let (state_tx, state) = watch::channel(ListUiState::initial());
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = TaskGuard::new(tokio::spawn(run_list(
            pipeline,
            actions.delete,
            command_rx,
            state_tx,
        )));
        Self {
            commands,
            state,
            _task: task,
        }
    }

    pub fn on_query_changed<S: Into<String>>(&self, query: S) {
        self.send(ListCommand::QueryChanged(query.into()));
    }

    pub fn retry(&self) {
        self.send(ListCommand::Retry);
    }

    pub fn on_delete_clicked(&self, id: NoteId) {
        self.send(ListCommand::Delete(id));
    }

    pub fn on_undo_delete(&self, id: NoteId) {
        self.send(ListCommand::UndoDelete(id));
    }

    pub fn state(&self) -> watch::Receiver<ListUiState> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> ListUiState {
        self.state.borrow().clone()
    }

    pub fn shutdown(self) {
        tracing::debug!("list screen torn down");
    }

    fn send(&self, command: ListCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!("list screen owner task is gone");
        }
    }
}

async fn run_list(
    mut pipeline: QueryPipeline,
    delete: DeleteNote,
    mut commands: mpsc::UnboundedReceiver<ListCommand>,
    state: watch::Sender<ListUiState>,
) {
    let mut mutations = JoinSet::new();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(ListCommand::QueryChanged(query)) => pipeline.push(query),
                Some(ListCommand::Retry) => {
                    if let Some(partial) = pipeline.retry() {
                        apply(&state, partial);
                    }
                }
                Some(ListCommand::Delete(id)) => {
                    let delete = delete.clone();
                    mutations.spawn(async move {
                        let outcome = delete.delete(&id).await;
                        ("delete", id, outcome)
                    });
                }
                Some(ListCommand::UndoDelete(id)) => {
                    let delete = delete.clone();
                    mutations.spawn(async move {
                        let outcome = delete.undo(&id).await;
                        ("undo delete", id, outcome)
                    });
                }
                None => break,
            },
            partial = pipeline.next() => apply(&state, partial),
            Some(joined) = mutations.join_next() => match joined {
                Ok((action, id, Outcome::Error(err))) => {
                    tracing::warn!(%id, action, error = %err, "note mutation failed");
                }
                Ok((action, id, Outcome::Success(()))) => {
                    tracing::debug!(%id, action, "note mutation applied");
                }
                Err(err) => tracing::error!(error = %err, "note mutation task failed"),
            },
        }
    }
    pipeline.cancel();
}

fn apply(state: &watch::Sender<ListUiState>, partial: ListPartial) {
    state.send_modify(|current| *current = reduce(current, partial));
}
