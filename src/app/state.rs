use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;

use crate::model::{Note, NoteId};
use crate::search::ListPartial;

/// Visible width of a list preview, ellipsis included.
pub const PREVIEW_GRAPHEMES: usize = 80;
const ELLIPSIS: &str = "…";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSummary {
    pub id: NoteId,
    pub title: String,
    pub preview: String,
    pub updated_at: OffsetDateTime,
}

impl NoteSummary {
    pub fn from_note(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            preview: preview(&note.content),
            updated_at: note.updated_at,
        }
    }
}

/// Single-line preview of a note body, cut on grapheme boundaries.
pub fn preview(content: &str) -> String {
    let flattened = content
        .trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if flattened.graphemes(true).count() <= PREVIEW_GRAPHEMES {
        return flattened;
    }
    let mut cut = flattened
        .graphemes(true)
        .take(PREVIEW_GRAPHEMES - 1)
        .collect::<String>();
    cut.truncate(cut.trim_end().len());
    cut.push_str(ELLIPSIS);
    cut
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListUiState {
    pub query: String,
    pub items: Vec<NoteSummary>,
    pub is_loading: bool,
    pub error_message: Option<String>,
}

impl ListUiState {
    pub fn initial() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    pub fn is_settled(&self) -> bool {
        !self.is_loading
    }
}

/// Folds one pipeline partial into the list state. Items survive `Loading`
/// and `Error` so the list does not flash empty while a query resolves.
pub fn reduce(state: &ListUiState, partial: ListPartial) -> ListUiState {
    match partial {
        ListPartial::Loading { query } => ListUiState {
            query,
            items: state.items.clone(),
            is_loading: true,
            error_message: None,
        },
        ListPartial::Data { query, notes } => ListUiState {
            query,
            items: notes.iter().map(NoteSummary::from_note).collect(),
            is_loading: false,
            error_message: None,
        },
        ListPartial::Error { query, message } => ListUiState {
            query,
            items: state.items.clone(),
            is_loading: false,
            error_message: Some(message),
        },
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorUiState {
    pub note_id: Option<NoteId>,
    pub title: String,
    pub content: String,
    pub is_saving: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    Close,
    ShowError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::note;

    fn loaded() -> ListUiState {
        reduce(
            &ListUiState::initial(),
            ListPartial::Data {
                query: "a".into(),
                notes: vec![note("1", "Alpha", "first"), note("2", "Beta", "second")],
            },
        )
    }

    #[test]
    fn loading_keeps_items_and_clears_error() {
        let errored = ListUiState {
            error_message: Some("boom".into()),
            ..loaded()
        };
        let next = reduce(&errored, ListPartial::Loading { query: "ab".into() });
        assert_eq!(next.query, "ab");
        assert!(next.is_loading);
        assert_eq!(next.error_message, None);
        assert_eq!(next.items, errored.items);
    }

    #[test]
    fn data_replaces_items_in_order() {
        let state = loaded();
        assert!(!state.is_loading);
        assert_eq!(state.error_message, None);
        let titles: Vec<_> = state.items.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["Alpha", "Beta"]);
    }

    #[test]
    fn error_keeps_items_and_stops_loading() {
        let loading = reduce(&loaded(), ListPartial::Loading { query: "b".into() });
        let next = reduce(
            &loading,
            ListPartial::Error {
                query: "b".into(),
                message: "Network Error".into(),
            },
        );
        assert!(!next.is_loading);
        assert_eq!(next.error_message.as_deref(), Some("Network Error"));
        assert_eq!(next.items.len(), 2);
    }

    #[test]
    fn loading_and_error_are_never_both_set() {
        let partials = [
            ListPartial::Loading { query: "x".into() },
            ListPartial::Error {
                query: "x".into(),
                message: "bad".into(),
            },
            ListPartial::Loading { query: "y".into() },
            ListPartial::Data {
                query: "y".into(),
                notes: Vec::new(),
            },
        ];
        let mut state = ListUiState::initial();
        for partial in partials {
            state = reduce(&state, partial);
            assert!(!(state.is_loading && state.error_message.is_some()));
        }
    }

    #[test]
    fn preview_flattens_lines() {
        assert_eq!(preview("  first line\n\n  second\r\nthird  "), "first line second third");
        assert_eq!(preview(""), "");
    }

    #[test]
    fn long_preview_is_cut_with_ellipsis() {
        let body = "é".repeat(200);
        let cut = preview(&body);
        assert_eq!(cut.graphemes(true).count(), PREVIEW_GRAPHEMES);
        assert!(cut.ends_with(ELLIPSIS));

        let exact = "x".repeat(PREVIEW_GRAPHEMES);
        assert_eq!(preview(&exact), exact);
    }
}
