use crate::error::NoteError;
use crate::storage::Subscription;

/// Success/Error envelope returned by every asynchronous data-layer call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Outcome<T> {
    Success(T),
    Error(NoteError),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    pub fn err(&self) -> Option<&NoteError> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Error(err) => Some(err),
        }
    }

    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Error(err) => Outcome::Error(err),
        }
    }

    pub fn into_result(self) -> Result<T, NoteError> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Error(err) => Err(err),
        }
    }
}

impl<T> From<Result<T, NoteError>> for Outcome<T> {
    fn from(result: Result<T, NoteError>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Error(err),
        }
    }
}

/// A store subscription seen through the envelope. A subscription that could
/// not be opened yields its error once and then ends.
#[derive(Debug)]
pub struct Feed<T> {
    state: FeedState<T>,
}

#[derive(Debug)]
enum FeedState<T> {
    Live(Subscription<T>),
    Failed(NoteError),
    Finished,
}

impl<T> Feed<T> {
    pub fn new(opened: Result<Subscription<T>, NoteError>) -> Self {
        let state = match opened {
            Ok(subscription) => FeedState::Live(subscription),
            Err(err) => FeedState::Failed(err),
        };
        Self { state }
    }

    pub async fn next(&mut self) -> Option<Outcome<T>> {
        match &mut self.state {
            FeedState::Live(subscription) => {
                let item = subscription.recv().await;
                if item.is_none() {
                    self.state = FeedState::Finished;
                }
                item.map(Outcome::from)
            }
            FeedState::Failed(_) => match std::mem::replace(&mut self.state, FeedState::Finished) {
                FeedState::Failed(err) => Some(Outcome::Error(err)),
                _ => None,
            },
            FeedState::Finished => None,
        }
    }
}
