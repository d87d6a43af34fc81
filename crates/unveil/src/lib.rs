//! unveil - Interactive credential disclosure for Daedalos
//!
//! "Find it, show it, copy it. Never print it."
//!
//! Unlock a vault profile, pick one record with an interactive filter
//! (fzf by default), and print its fields with every secret masked. The
//! first secret goes straight to the clipboard so it never has to appear
//! on screen.

pub mod catalog;
pub mod clipboard;
pub mod config;
pub mod disclose;
pub mod filter;
pub mod session;
pub mod vault;

pub use catalog::RecordCatalog;
pub use clipboard::{ClipboardRelay, RelayError};
pub use config::UnveilConfig;
pub use disclose::Discloser;
pub use filter::{FilterError, SelectionFilter};
pub use session::{run_session, Session, SessionOptions, Stage};
pub use vault::{Detail, Field, Profile, Record, Section, Vault, VaultError};
