//! Session - one run from unlocked profile to disclosed record
//!
//! The session moves forward only:
//!
//! ```text
//! Unlocked -> ItemsLoaded -> Selecting -> Selected -> Disclosing -> [ClipboardCopied] -> Done
//! ```
//!
//! Any error while selecting or disclosing ends the session in `Failed`.

use anyhow::{Context, Result};
use std::fmt;
use std::io::Write;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::RecordCatalog;
use crate::disclose::Discloser;
use crate::filter::SelectionFilter;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unlocked,
    ItemsLoaded,
    Selecting,
    Selected,
    Disclosing,
    ClipboardCopied,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unlocked => "unlocked",
            Self::ItemsLoaded => "items-loaded",
            Self::Selecting => "selecting",
            Self::Selected => "selected",
            Self::Disclosing => "disclosing",
            Self::ClipboardCopied => "clipboard-copied",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` directly follows this stage
    pub fn can_advance_to(&self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (*self, next),
            (Unlocked, ItemsLoaded)
                | (ItemsLoaded, Selecting)
                | (Selecting, Selected)
                // nothing picked
                | (Selecting, Done)
                | (Selected, Disclosing)
                | (Disclosing, ClipboardCopied)
                | (Disclosing, Done)
                | (ClipboardCopied, Done)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },
}

/// Disclosure switches for one run
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Print secret values instead of the mask
    pub reveal: bool,
    /// Never touch the clipboard
    pub no_copy: bool,
}

/// State of one run
#[derive(Debug)]
pub struct Session {
    pub options: SessionOptions,
    stage: Stage,
    clipboard_used: bool,
}

impl Session {
    /// A session for a freshly unlocked profile
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            stage: Stage::Unlocked,
            clipboard_used: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn clipboard_used(&self) -> bool {
        self.clipboard_used
    }

    /// Whether a secret may still go to the clipboard this run
    pub fn may_copy(&self) -> bool {
        !self.options.no_copy && !self.clipboard_used
    }

    pub fn advance(&mut self, next: Stage) -> Result<(), SessionError> {
        if !self.stage.can_advance_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        debug!(from = %self.stage, to = %next, "session");
        self.stage = next;
        Ok(())
    }

    /// Record the one clipboard copy of this run
    pub fn mark_copied(&mut self) -> Result<(), SessionError> {
        self.advance(Stage::ClipboardCopied)?;
        self.clipboard_used = true;
        Ok(())
    }

    pub fn fail(&mut self) {
        if !self.stage.is_terminal() {
            debug!(from = %self.stage, "session failed");
            self.stage = Stage::Failed;
        }
    }
}

/// Let the user pick a record and disclose it to `out`.
///
/// Returns the selected title, or `None` when nothing was picked.
pub async fn run_session<W: Write>(
    session: &mut Session,
    catalog: &RecordCatalog,
    filter: &SelectionFilter,
    discloser: &Discloser,
    query: Option<&str>,
    out: &mut W,
) -> Result<Option<String>> {
    let result = select_and_disclose(session, catalog, filter, discloser, query, out).await;
    if result.is_err() {
        session.fail();
    }
    result
}

async fn select_and_disclose<W: Write>(
    session: &mut Session,
    catalog: &RecordCatalog,
    filter: &SelectionFilter,
    discloser: &Discloser,
    query: Option<&str>,
    out: &mut W,
) -> Result<Option<String>> {
    session.advance(Stage::ItemsLoaded)?;
    info!(records = catalog.len(), "items loaded");

    session.advance(Stage::Selecting)?;
    let selected = filter
        .select(catalog.titles(), query)
        .await
        .context("Selection failed")?;

    let Some(title) = selected else {
        info!("nothing selected");
        session.advance(Stage::Done)?;
        return Ok(None);
    };

    session.advance(Stage::Selected)?;
    let Some(record) = catalog.find(&title) else {
        warn!(title = %title, "selection matches no record");
        session.advance(Stage::Disclosing)?;
        session.advance(Stage::Done)?;
        return Ok(Some(title));
    };

    session.advance(Stage::Disclosing)?;
    discloser.disclose(record, session, out).await?;
    session.advance(Stage::Done)?;

    Ok(Some(title))
}
