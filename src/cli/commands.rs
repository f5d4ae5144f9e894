use std::fmt::Write as _;
use std::io::{self, IsTerminal, Read};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::app::{
    DeleteNote, EditorEvent, EditorScreen, EditorUiState, ListScreen, ListUiState, LoadNote,
    NoteSummary,
};
use crate::config::AppConfig;
use crate::model::NoteId;
use crate::outcome::Outcome;
use crate::storage::NoteStore;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Substring to match against titles and bodies
    #[arg()]
    pub query: Vec<String>,
    /// Print the list as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    pub fn query(&self) -> String {
        self.query.join(" ")
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct NoteFields {
    /// Note title
    #[arg(long)]
    pub title: Option<String>,
    /// Note body. If omitted and stdin is piped, the body is read from stdin.
    #[arg(long)]
    pub body: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    #[command(flatten)]
    pub fields: NoteFields,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Note identifier
    pub id: String,
    #[command(flatten)]
    pub fields: NoteFields,
}

#[derive(Args, Debug, Clone)]
pub struct IdArgs {
    /// Note identifier
    pub id: String,
}

#[derive(Debug, Serialize)]
struct NoteRow<'a> {
    id: &'a str,
    title: &'a str,
    preview: &'a str,
    updated_at: String,
}

impl<'a> From<&'a NoteSummary> for NoteRow<'a> {
    fn from(summary: &'a NoteSummary) -> Self {
        Self {
            id: summary.id.as_str(),
            title: &summary.title,
            preview: &summary.preview,
            updated_at: format_timestamp(summary.updated_at),
        }
    }
}

pub async fn list_notes(
    config: Arc<AppConfig>,
    store: Arc<dyn NoteStore>,
    args: ListArgs,
) -> Result<()> {
    let query = args.query().trim().to_string();
    let screen = ListScreen::spawn(store, &config.search);
    screen.on_query_changed(query.clone());
    let state = settle_list(&screen, &query).await?;
    screen.shutdown();

    if let Some(message) = state.error_message {
        bail!("listing notes failed: {message}");
    }
    if args.json {
        let rows = state.items.iter().map(NoteRow::from).collect::<Vec<_>>();
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("serializing note list")?
        );
    } else {
        print!("{}", format_list(&state.items));
    }
    Ok(())
}

pub async fn new_note(
    config: Arc<AppConfig>,
    store: Arc<dyn NoteStore>,
    args: NewArgs,
) -> Result<()> {
    let body = match args.fields.body {
        Some(body) => Some(body),
        None => read_stdin()?,
    };
    let editor = EditorScreen::spawn(store, None, &config.auto_save);
    let state = drive_editor(&editor, args.fields.title, body).await?;
    editor.shutdown();
    match state.note_id {
        Some(id) => println!("Created note {id}"),
        None => println!("Nothing saved: the note body is empty"),
    }
    Ok(())
}

pub async fn edit_note(
    config: Arc<AppConfig>,
    store: Arc<dyn NoteStore>,
    args: EditArgs,
) -> Result<()> {
    let body = match args.fields.body {
        Some(body) => Some(body),
        None => read_stdin()?,
    };
    let id = NoteId::new(args.id);
    let editor = EditorScreen::spawn(store, Some(id.clone()), &config.auto_save);
    drive_editor(&editor, args.fields.title, body).await?;
    editor.shutdown();
    println!("Saved note {id}");
    Ok(())
}

pub async fn show_note(store: Arc<dyn NoteStore>, args: IdArgs) -> Result<()> {
    let id = NoteId::new(args.id);
    let mut feed = LoadNote::new(store).call(&id);
    let note = match feed.next().await {
        Some(Outcome::Success(note)) => note,
        Some(Outcome::Error(err)) => return Err(err).context("loading note"),
        None => bail!("note {id} could not be loaded"),
    };
    println!("#{}  {}", note.id, note.title);
    println!("    created {}", format_timestamp(note.created_at));
    println!("    updated {}", format_timestamp(note.updated_at));
    println!();
    println!("{}", note.content);
    Ok(())
}

pub async fn delete_note(store: Arc<dyn NoteStore>, args: IdArgs) -> Result<()> {
    let id = NoteId::new(args.id);
    DeleteNote::new(store)
        .delete(&id)
        .await
        .into_result()
        .with_context(|| format!("deleting note {id}"))?;
    println!("Deleted note {id} (restore with `notes-sync restore {id}`)");
    Ok(())
}

pub async fn restore_note(store: Arc<dyn NoteStore>, args: IdArgs) -> Result<()> {
    let id = NoteId::new(args.id);
    DeleteNote::new(store)
        .undo(&id)
        .await
        .into_result()
        .with_context(|| format!("restoring note {id}"))?;
    println!("Restored note {id}");
    Ok(())
}

/// Waits for the first settled state for `query`.
async fn settle_list(screen: &ListScreen, query: &str) -> Result<ListUiState> {
    let mut rx = screen.state();
    let state = tokio::time::timeout(
        SETTLE_TIMEOUT,
        rx.wait_for(|state| state.query == query && state.is_settled()),
    )
    .await
    .context("timed out waiting for the note list")?
    .context("list screen stopped")?;
    Ok(state.clone())
}

/// Applies the given fields, then closes the editor and waits for the
/// outcome of the closing flush.
async fn drive_editor(
    editor: &EditorScreen,
    title: Option<String>,
    body: Option<String>,
) -> Result<EditorUiState> {
    let mut events = editor.events();
    if let Some(title) = title {
        editor.on_title_changed(title);
    }
    if let Some(body) = body {
        editor.on_content_changed(body);
    }
    editor.on_close_requested();

    let event = tokio::time::timeout(SETTLE_TIMEOUT, events.recv())
        .await
        .context("timed out waiting for the editor to save")?
        .context("editor stopped before saving")?;
    match event {
        EditorEvent::Close => Ok(editor.snapshot()),
        EditorEvent::ShowError(message) => bail!("saving note failed: {message}"),
    }
}

fn format_list(items: &[NoteSummary]) -> String {
    if items.is_empty() {
        return "No notes found.\n".to_string();
    }
    let mut out = String::new();
    for item in items {
        let title = if item.title.is_empty() {
            "(untitled)"
        } else {
            item.title.as_str()
        };
        let _ = writeln!(&mut out, "#{}  {}", item.id, title);
        let _ = writeln!(&mut out, "    updated {}", format_timestamp(item.updated_at));
        if !item.preview.is_empty() {
            let _ = writeln!(&mut out, "    {}", item.preview);
        }
        out.push('\n');
    }
    out
}

fn read_stdin() -> Result<Option<String>> {
    if io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading note body from stdin")?;
    Ok(Some(buf).filter(|body| !body.is_empty()))
}

fn format_timestamp(stamp: OffsetDateTime) -> String {
    stamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| stamp.unix_timestamp().to_string())
}
