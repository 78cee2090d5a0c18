use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::CollectorError;

const STDERR_TAIL_LINES: usize = 20;

/// Receives a command's output one line at a time.
pub trait OutputSink: Send {
    fn write_line(&mut self, line: &str) -> std::io::Result<()>;
}

/// Buffered sink writing each line to a file.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Creates the file (and its parent directories), truncating any previous content.
    pub fn create(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }

    pub fn finish(mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl OutputSink for FileSink {
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct VecSink(pub Vec<String>);

impl OutputSink for VecSink {
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.0.push(line.to_string());
        Ok(())
    }
}

/// Runs external programs. `args[0]` is the program.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and return stdout followed by stderr.
    async fn execute(&self, mask: bool, args: &[String]) -> Result<String, CollectorError>;

    /// Run to completion, handing each output line to `sink` as it arrives.
    async fn execute_and_stream(
        &self,
        mask: bool,
        sink: &mut dyn OutputSink,
        args: &[String],
    ) -> Result<(), CollectorError>;
}

/// Printable form of a command line. Masked commands only show the program.
pub fn describe(mask: bool, args: &[String]) -> String {
    match args.split_first() {
        None => String::new(),
        Some((program, rest)) if mask => format!("{} <{} masked arguments>", program, rest.len()),
        Some(_) => args.join(" "),
    }
}

/// `CommandRunner` backed by `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(args: &[String]) -> Result<Command, CollectorError> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| CollectorError::Transport("empty command line".into()))?;
        let mut cmd = Command::new(program);
        cmd.args(rest).stdin(Stdio::null()).kill_on_drop(true);
        Ok(cmd)
    }
}

#[async_trait::async_trait]
impl CommandRunner for SystemRunner {
    async fn execute(&self, mask: bool, args: &[String]) -> Result<String, CollectorError> {
        let shown = describe(mask, args);
        debug!("Running: {}", shown);

        let output = Self::command(args)?
            .output()
            .await
            .map_err(|e| CollectorError::Transport(format!("failed to run {}: {}", shown, e)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(CollectorError::Transport(format!(
                "{} failed with {}: {}",
                shown,
                output.status,
                combined.trim()
            )));
        }

        Ok(combined)
    }

    async fn execute_and_stream(
        &self,
        mask: bool,
        sink: &mut dyn OutputSink,
        args: &[String],
    ) -> Result<(), CollectorError> {
        let shown = describe(mask, args);
        debug!("Streaming: {}", shown);

        let mut child = Self::command(args)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CollectorError::Transport(format!("failed to run {}: {}", shown, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CollectorError::Transport(format!("{}: stdout not captured", shown)))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CollectorError::Transport(format!("{}: stderr not captured", shown)))?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_done = false;
        let mut err_done = false;
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        while !(out_done && err_done) {
            tokio::select! {
                line = out_lines.next_line(), if !out_done => match line? {
                    Some(l) => sink.write_line(&l)?,
                    None => out_done = true,
                },
                line = err_lines.next_line(), if !err_done => match line? {
                    Some(l) => {
                        sink.write_line(&l)?;
                        if stderr_tail.len() == STDERR_TAIL_LINES {
                            stderr_tail.pop_front();
                        }
                        stderr_tail.push_back(l);
                    }
                    None => err_done = true,
                },
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            let tail: Vec<String> = stderr_tail.into_iter().collect();
            return Err(CollectorError::Transport(format!(
                "{} failed with {}: {}",
                shown,
                status,
                tail.join("\n")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn masked_commands_hide_arguments() {
        let args = argv(&["curl", "-H", "Authorization: Bearer secret"]);
        assert_eq!(describe(true, &args), "curl <2 masked arguments>");
        assert_eq!(describe(false, &args), "curl -H Authorization: Bearer secret");
    }

    #[tokio::test]
    async fn execute_returns_output() {
        let out = SystemRunner::new()
            .execute(false, &argv(&["sh", "-c", "echo hello"]))
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn execute_surfaces_non_zero_exit() {
        let err = SystemRunner::new()
            .execute(false, &argv(&["sh", "-c", "echo boom >&2; exit 3"]))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("boom"), "{}", msg);
    }

    #[tokio::test]
    async fn stream_delivers_every_line() {
        let mut sink = VecSink::default();
        SystemRunner::new()
            .execute_and_stream(false, &mut sink, &argv(&["sh", "-c", "printf 'a\\nb\\nc\\n'"]))
            .await
            .unwrap();
        assert_eq!(sink.0, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        assert!(SystemRunner::new().execute(false, &[]).await.is_err());
    }
}
