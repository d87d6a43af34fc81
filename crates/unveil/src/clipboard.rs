//! Clipboard relay - hands one value to an external clipboard tool
//!
//! The tool reads its stdin until EOF and owns the clipboard from then on.
//! The relay never deduplicates; callers decide how often to use it.

use std::io;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::ClipboardConfig;

/// Relay-specific errors
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to start {program}: {error}")]
    Spawn { program: String, error: io::Error },

    #[error("Clipboard input stream unavailable")]
    Stdin,

    #[error("Failed to write to clipboard tool: {0}")]
    Write(io::Error),

    #[error("Failed waiting for clipboard tool: {0}")]
    Wait(io::Error),

    #[error("Clipboard tool exited with {0}")]
    Exit(ExitStatus),

    #[error("Clipboard task ended without reporting")]
    Task,
}

/// A configured clipboard-set command
#[derive(Debug, Clone)]
pub struct ClipboardRelay {
    program: String,
    args: Vec<String>,
}

impl ClipboardRelay {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
        }
    }

    /// Build from config, detecting a clipboard tool if none is configured
    pub fn from_config(config: &ClipboardConfig) -> Self {
        match &config.command {
            Some(command) => Self::new(command, &config.args),
            None => Self::detect(),
        }
    }

    /// Pick the first clipboard tool found on PATH.
    ///
    /// Falls back to xclip so a missing tool surfaces as a spawn error.
    pub fn detect() -> Self {
        let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
        if wayland && which::which("wl-copy").is_ok() {
            return Self::new("wl-copy", &[]);
        }
        if which::which("xclip").is_ok() {
            return Self::xclip();
        }
        if which::which("pbcopy").is_ok() {
            return Self::new("pbcopy", &[]);
        }
        Self::xclip()
    }

    fn xclip() -> Self {
        Self::new("xclip", &["-selection".to_string(), "clipboard".to_string()])
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Put `value` on the clipboard, waiting for the tool to finish
    pub async fn relay(&self, value: &str) -> Result<(), RelayError> {
        debug!(program = %self.program, "starting clipboard tool");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|error| RelayError::Spawn {
                program: self.program.clone(),
                error,
            })?;

        let mut stdin = child.stdin.take().ok_or(RelayError::Stdin)?;

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = done_tx.send(child.wait().await);
        });

        stdin
            .write_all(value.as_bytes())
            .await
            .map_err(RelayError::Write)?;
        stdin.shutdown().await.map_err(RelayError::Write)?;
        drop(stdin);

        let status = done_rx
            .await
            .map_err(|_| RelayError::Task)?
            .map_err(RelayError::Wait)?;

        if !status.success() {
            return Err(RelayError::Exit(status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(script: &str, extra: &[&str]) -> ClipboardRelay {
        let mut args = vec!["-c".to_string(), script.to_string(), "stub".to_string()];
        args.extend(extra.iter().map(|s| s.to_string()));
        ClipboardRelay::new("sh", &args)
    }

    #[tokio::test]
    async fn test_value_delivered_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip");
        let relay = stub(r#"cat > "$1""#, &[clip.to_str().unwrap()]);

        relay.relay("hunter2").await.unwrap();
        assert_eq!(std::fs::read(&clip).unwrap(), b"hunter2");

        relay.relay("with\nnewline ").await.unwrap();
        assert_eq!(std::fs::read(&clip).unwrap(), b"with\nnewline ");
    }

    #[tokio::test]
    async fn test_failure_exit() {
        let relay = stub("cat > /dev/null; exit 3", &[]);
        let err = relay.relay("x").await.unwrap_err();
        assert!(matches!(err, RelayError::Exit(status) if status.code() == Some(3)));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let relay = ClipboardRelay::new("/nonexistent/unveil-clip", &[]);
        let err = relay.relay("x").await.unwrap_err();
        assert!(matches!(err, RelayError::Spawn { .. }));
    }

    #[test]
    fn test_from_config() {
        let config = ClipboardConfig {
            command: Some("wl-copy".to_string()),
            args: vec!["--trim-newline".to_string()],
        };
        let relay = ClipboardRelay::from_config(&config);
        assert_eq!(relay.program(), "wl-copy");
        assert_eq!(relay.args, vec!["--trim-newline".to_string()]);

        let detected = ClipboardRelay::from_config(&ClipboardConfig::default());
        assert!(["wl-copy", "xclip", "pbcopy"].contains(&detected.program()));
    }
}
