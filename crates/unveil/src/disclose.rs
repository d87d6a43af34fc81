//! Discloser - renders a record with its secrets masked
//!
//! Output format (tabs are literal):
//!
//! ```text
//! Gmail
//!     Category:Login
//!     Tags:email, personal
//!     username (text) = me@example.com
//!     password (password) = ******** [copied]
//!     extra / Extra
//!         pin / PIN (concealed) = ********
//! ```
//!
//! The first secret met in field order, then section order, goes to the
//! clipboard, unless copying is off or already happened this session.

use anyhow::{Context, Result};
use std::io::Write;
use tracing::{debug, info};

use crate::clipboard::ClipboardRelay;
use crate::session::Session;
use crate::vault::{Field, Record};

/// Shown instead of a secret. Same length for every secret.
pub const MASK: &str = "********";

/// Appended to the line whose value went to the clipboard
pub const COPIED_MARKER: &str = " [copied]";

/// Renders records and relays the first secret to the clipboard
#[derive(Debug, Clone)]
pub struct Discloser {
    relay: ClipboardRelay,
}

impl Discloser {
    pub fn new(relay: ClipboardRelay) -> Self {
        Self { relay }
    }

    /// Fetch the record's detail and write it to `out`
    pub async fn disclose<W: Write>(
        &self,
        record: &Record,
        session: &mut Session,
        out: &mut W,
    ) -> Result<()> {
        let detail = record
            .detail()
            .with_context(|| format!("Failed to read detail for {}", record.title))?;
        debug!(
            fields = detail.fields.len(),
            sections = detail.sections.len(),
            secrets = detail.sensitive_count(),
            "detail loaded"
        );

        // Nothing reaches `out` until every relay has succeeded
        let mut buf = Vec::new();
        writeln!(buf, "{}", record.title)?;
        writeln!(buf, "\tCategory:{}", record.category)?;
        writeln!(buf, "\tTags:{}", record.tags.join(", "))?;

        for field in &detail.fields {
            let value = self.display_value(field, session).await?;
            writeln!(buf, "\t{} ({}) = {}", field.name, field.kind, value)?;
        }

        for section in &detail.sections {
            writeln!(buf, "\t{} / {}", section.name, section.title)?;
            for field in &section.fields {
                let value = self.display_value(field, session).await?;
                writeln!(
                    buf,
                    "\t\t{} / {} ({}) = {}",
                    field.name,
                    field.title.as_deref().unwrap_or_default(),
                    field.kind,
                    value
                )?;
            }
        }

        out.write_all(&buf)?;
        out.flush()?;
        Ok(())
    }

    /// The text shown for `field`, relaying it to the clipboard if it is the
    /// first secret of the session
    async fn display_value(&self, field: &Field, session: &mut Session) -> Result<String> {
        if !field.sensitive {
            return Ok(field.value.clone());
        }

        let mut shown = if session.options.reveal {
            field.value.clone()
        } else {
            MASK.to_string()
        };

        if session.may_copy() {
            self.relay
                .relay(&field.value)
                .await
                .with_context(|| format!("Failed to copy {} to clipboard", field.name))?;
            session.mark_copied()?;
            info!(field = %field.name, program = self.relay.program(), "copied to clipboard");
            shown.push_str(COPIED_MARKER);
        }

        Ok(shown)
    }
}
