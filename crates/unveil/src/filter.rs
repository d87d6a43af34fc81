//! Selection filter - runs an interactive filter (fzf by default) over titles
//!
//! Three things happen at once: a task owns the filter process and reports
//! its exit through a oneshot channel, a second task streams the titles into
//! the filter's stdin and closes it, and the caller drains stdout. Draining
//! while writing keeps both pipes moving no matter how many titles there are.

use std::borrow::Cow;
use std::io;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::process::{ChildStdin, Command};
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::FilterConfig;

/// Filter-specific errors
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Failed to start {program}: {error}")]
    Spawn { program: String, error: io::Error },

    #[error("Filter input stream unavailable")]
    Stdin,

    #[error("Filter output stream unavailable")]
    Stdout,

    #[error("Failed to write titles: {0}")]
    Write(io::Error),

    #[error("Failed to read selection: {0}")]
    Read(io::Error),

    #[error("Failed waiting for filter: {0}")]
    Wait(io::Error),

    #[error("Filter exited with {0}")]
    Exit(ExitStatus),

    #[error("Filter task ended without reporting")]
    Task,
}

/// A configured external selection filter
#[derive(Debug, Clone)]
pub struct SelectionFilter {
    program: String,
    args: Vec<String>,
    select_one: bool,
    abort_codes: Vec<i32>,
}

impl SelectionFilter {
    pub fn new(config: &FilterConfig) -> Self {
        let mut args = config.args.clone();
        if let Some(height) = &config.height {
            args.push(format!("--height={}", height));
        }
        if let Some(min_height) = config.min_height {
            args.push(format!("--min-height={}", min_height));
        }
        if let Some(header) = &config.header {
            args.push(format!("--header={}", header));
        }

        Self {
            program: config.command.clone(),
            args,
            select_one: config.select_one,
            abort_codes: config.abort_codes.clone(),
        }
    }

    /// Arguments for one run, with the initial query appended when present
    pub fn command_args(&self, query: Option<&str>) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            if self.select_one {
                args.push("-1".to_string());
            }
            args.push(format!("--query={}", query));
        }
        args
    }

    /// Let the user pick one of `titles`.
    ///
    /// Returns `None` when the filter printed nothing or exited with one of
    /// the configured abort codes.
    pub async fn select<'a, I>(
        &self,
        titles: I,
        query: Option<&str>,
    ) -> Result<Option<String>, FilterError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let lines: Vec<String> = titles
            .into_iter()
            .map(|title| single_line(title).into_owned())
            .collect();

        debug!(program = %self.program, titles = lines.len(), "starting filter");
        let mut child = Command::new(&self.program)
            .args(self.command_args(query))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|error| FilterError::Spawn {
                program: self.program.clone(),
                error,
            })?;

        let stdin = child.stdin.take().ok_or(FilterError::Stdin)?;
        let mut stdout = child.stdout.take().ok_or(FilterError::Stdout)?;

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = done_tx.send(child.wait().await);
        });

        let writer = tokio::spawn(write_lines(stdin, lines));

        let mut output = Vec::new();
        let read = stdout.read_to_end(&mut output).await;

        let status = done_rx
            .await
            .map_err(|_| FilterError::Task)?
            .map_err(FilterError::Wait)?;
        let aborted = status
            .code()
            .is_some_and(|code| self.abort_codes.contains(&code));

        // A filter that accepts or aborts may close its input before every
        // title is written. Only then is a broken pipe expected.
        match writer.await.map_err(|_| FilterError::Task)? {
            Ok(written) => debug!(written, "titles delivered"),
            Err(e)
                if e.kind() == io::ErrorKind::BrokenPipe && (status.success() || aborted) =>
            {
                debug!("filter closed its input early");
            }
            Err(e) => return Err(FilterError::Write(e)),
        }
        read.map_err(FilterError::Read)?;

        if aborted {
            debug!(code = status.code(), "selection aborted");
            return Ok(None);
        }
        if !status.success() {
            return Err(FilterError::Exit(status));
        }

        Ok(parse_selection(&output))
    }
}

/// Write one title per line, then close the filter's input
async fn write_lines(stdin: ChildStdin, lines: Vec<String>) -> io::Result<usize> {
    let mut writer = BufWriter::new(stdin);
    for line in &lines {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.shutdown().await?;
    Ok(lines.len())
}

/// A title as it is shown to the filter: one line, with any embedded line
/// breaks turned into spaces
pub fn single_line(title: &str) -> Cow<'_, str> {
    if title.contains(['\n', '\r']) {
        Cow::Owned(title.replace(['\n', '\r'], " "))
    } else {
        Cow::Borrowed(title)
    }
}

fn parse_selection(output: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(output);
    text.lines()
        .next()
        .map(|line| line.trim_end_matches('\r').to_string())
        .filter(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(script: &str, extra: &[&str]) -> SelectionFilter {
        let mut args = vec!["-c".to_string(), script.to_string(), "stub".to_string()];
        args.extend(extra.iter().map(|s| s.to_string()));
        SelectionFilter::new(&FilterConfig {
            command: "sh".to_string(),
            args,
            height: None,
            min_height: None,
            header: None,
            select_one: true,
            abort_codes: vec![1, 130],
        })
    }

    #[test]
    fn test_default_args() {
        let filter = SelectionFilter::new(&FilterConfig::default());

        assert_eq!(
            filter.command_args(None),
            vec!["--height=20%", "--min-height=15", "--header=search items"]
        );
        assert_eq!(
            filter.command_args(Some("mail work")),
            vec![
                "--height=20%",
                "--min-height=15",
                "--header=search items",
                "-1",
                "--query=mail work"
            ]
        );
        assert_eq!(filter.command_args(Some("")).len(), 3);
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection(b"Gmail\n"), Some("Gmail".to_string()));
        assert_eq!(parse_selection(b"Gmail\r\n"), Some("Gmail".to_string()));
        assert_eq!(parse_selection(b"a b\nc\n"), Some("a b".to_string()));
        assert_eq!(parse_selection(b""), None);
        assert_eq!(parse_selection(b"\n"), None);
    }

    #[tokio::test]
    async fn test_titles_arrive_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let seen = dir.path().join("seen");
        let filter = stub(r#"cat > "$1" && sed -n 2p "$1""#, &[seen.to_str().unwrap()]);

        let titles = ["Gmail", "Bank of Somewhere", "Router"];
        let selected = filter.select(titles, None).await.unwrap();

        assert_eq!(selected.as_deref(), Some("Bank of Somewhere"));
        assert_eq!(
            std::fs::read_to_string(&seen).unwrap(),
            "Gmail\nBank of Somewhere\nRouter\n"
        );
    }

    #[tokio::test]
    async fn test_large_input_does_not_stall() {
        // Echoes everything back, so both pipes fill past their buffers
        let filter = stub("cat", &[]);
        let titles: Vec<String> = (0..50_000).map(|i| format!("record number {:06}", i)).collect();

        let selected = filter
            .select(titles.iter().map(String::as_str), None)
            .await
            .unwrap();

        assert_eq!(selected.as_deref(), Some("record number 000000"));
    }

    #[tokio::test]
    async fn test_abort_before_input_drained() {
        let filter = stub("head -c 10 > /dev/null; exit 130", &[]);
        let titles: Vec<String> = (0..200_000).map(|i| format!("record number {:06}", i)).collect();

        let selected = filter
            .select(titles.iter().map(String::as_str), None)
            .await
            .unwrap();

        assert_eq!(selected, None);
    }

    #[tokio::test]
    async fn test_accept_before_input_drained() {
        let filter = stub("head -n 1", &[]);
        let titles: Vec<String> = (0..200_000).map(|i| format!("record number {:06}", i)).collect();

        let selected = filter
            .select(titles.iter().map(String::as_str), None)
            .await
            .unwrap();

        assert_eq!(selected.as_deref(), Some("record number 000000"));
    }

    #[tokio::test]
    async fn test_closed_input_with_failure_exit() {
        let filter = stub("exec 0<&-; exit 2", &[]);
        let titles: Vec<String> = (0..200_000).map(|i| format!("record number {:06}", i)).collect();

        let err = filter
            .select(titles.iter().map(String::as_str), None)
            .await
            .unwrap_err();

        assert!(matches!(&err, FilterError::Write(e) if e.kind() == io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn test_single_line() {
        assert!(matches!(single_line("Gmail"), Cow::Borrowed("Gmail")));
        assert_eq!(single_line("Home\nRouter"), "Home Router");
        assert_eq!(single_line("a\r\nb"), "a  b");
    }

    #[tokio::test]
    async fn test_multiline_title_stays_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let seen = dir.path().join("seen");
        let filter = stub(r#"cat > "$1" && sed -n 2p "$1""#, &[seen.to_str().unwrap()]);

        let selected = filter
            .select(["Gmail", "Home\nRouter", "Bank"], None)
            .await
            .unwrap();

        assert_eq!(selected.as_deref(), Some("Home Router"));
        assert_eq!(std::fs::read_to_string(&seen).unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn test_empty_titles() {
        let filter = stub("wc -l | tr -d ' '", &[]);
        let selected = filter.select(Vec::<&str>::new(), None).await.unwrap();
        assert_eq!(selected.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_query_is_passed() {
        let filter = stub(r#"cat > /dev/null; echo "$1 $2""#, &[]);
        let selected = filter.select(["a"], Some("gm ail")).await.unwrap();
        assert_eq!(selected.as_deref(), Some("-1 --query=gm ail"));
    }

    #[tokio::test]
    async fn test_abort_codes_mean_no_selection() {
        for code in [1, 130] {
            let filter = stub(&format!("cat > /dev/null; exit {}", code), &[]);
            assert_eq!(filter.select(["a", "b"], None).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_empty_output_means_no_selection() {
        let filter = stub("cat > /dev/null", &[]);
        assert_eq!(filter.select(["a"], None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failure_exit() {
        let filter = stub("cat > /dev/null; exit 2", &[]);
        let err = filter.select(["a"], None).await.unwrap_err();
        assert!(matches!(err, FilterError::Exit(status) if status.code() == Some(2)));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let mut config = FilterConfig::default();
        config.command = "/nonexistent/unveil-filter".to_string();
        let filter = SelectionFilter::new(&config);

        let err = filter.select(["a"], None).await.unwrap_err();
        assert!(matches!(err, FilterError::Spawn { .. }));
    }
}
