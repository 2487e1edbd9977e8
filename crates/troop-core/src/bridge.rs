//! Pipes to a long-running interactive process.
//!
//! The bridge owns the child's stdin and one dedicated drain worker per
//! output stream. Each worker performs blocking reads for the lifetime of the
//! process and publishes every chunk it reads on a shared channel, so output
//! is never read twice or lost between writes.

use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::io::{ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const READ_BUFFER_SIZE: usize = 4096;

/// Decode as much of `pending` as forms complete UTF-8.
///
/// A multi-byte character split across two reads stays in `pending` until
/// the rest arrives. Invalid sequences are replaced.
fn decode_chunk(pending: &mut Vec<u8>) -> String {
    let mut text = String::new();
    loop {
        match std::str::from_utf8(pending) {
            Ok(valid) => {
                text.push_str(valid);
                pending.clear();
                return text;
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&pending[..valid_up_to]));
                match e.error_len() {
                    Some(bad) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid_up_to + bad);
                    }
                    None => {
                        pending.drain(..valid_up_to);
                        return text;
                    }
                }
            }
        }
    }
}

fn spawn_drain<R>(label: String, mut reader: R, tx: Sender<String>) -> Result<()>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("{}-drain", label))
        .spawn(move || {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            let mut pending = Vec::new();
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        pending.extend_from_slice(&buf[..n]);
                        let text = decode_chunk(&mut pending);
                        if !text.is_empty() && tx.send(text).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::debug!("[{}] read error: {}", label, e);
                        break;
                    }
                }
            }
            if !pending.is_empty() {
                let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
            }
            log::debug!("[{}] output stream closed", label);
        })?;
    Ok(())
}

/// A spawned child process with piped stdin, stdout and stderr.
///
/// When dropped, the process is shut down.
pub struct ProcessBridge {
    label: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    output: Receiver<String>,
}

impl ProcessBridge {
    /// Spawn `program` with `args` and start draining its output.
    ///
    /// Stdout and stderr are published on the same channel by separate
    /// workers. Chunks keep their order within a stream, but a line on stderr
    /// may arrive before stdout text the process wrote earlier.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        log::info!("Starting {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Transport(format!("Failed to start '{}': {}", program, e)))?;

        let label = program.rsplit('/').next().unwrap_or(program).to_string();
        let (tx, rx) = unbounded();

        let stdin = child.stdin.take();
        if let Some(stdout) = child.stdout.take() {
            spawn_drain(label.clone(), stdout, tx.clone())?;
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_drain(label.clone(), stderr, tx)?;
        }

        Ok(Self {
            label,
            child: Some(child),
            stdin,
            output: rx,
        })
    }

    /// Short name of the program, used in log lines.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Write `text` to the process and flush it.
    pub fn write_all(&mut self, text: &str) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Transport(format!("{} input is closed", self.label)))?;
        stdin
            .write_all(text.as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(|e| Error::Transport(format!("Write to {} failed: {}", self.label, e)))
    }

    /// Write `line` followed by a newline.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.write_all(&format!("{}\n", line))
    }

    /// Receiver for output chunks, in the order they were read.
    ///
    /// Disconnects once every output stream has reached end of file.
    pub fn output(&self) -> Receiver<String> {
        self.output.clone()
    }

    /// Block until an output chunk arrives or `timeout` passes.
    ///
    /// Returns `Ok(None)` on timeout and an error if the process closed its
    /// output without producing anything.
    pub fn wait_for_output(&self, timeout: Duration) -> Result<Option<String>> {
        match self.output.recv_timeout(timeout) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Transport(format!(
                "{} closed its output",
                self.label
            ))),
        }
    }

    /// Every chunk currently queued, without blocking.
    pub fn try_drain(&self) -> Vec<String> {
        self.output.try_iter().collect()
    }

    /// Close the process's stdin so it can exit on its own.
    pub fn close_stdin(&mut self) {
        if self.stdin.take().is_some() {
            log::debug!("[{}] input closed", self.label);
        }
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Close stdin, give the process `grace` to exit, then kill it.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self, grace: Duration) {
        self.close_stdin();

        let Some(mut child) = self.child.take() else {
            return;
        };

        let deadline = Instant::now() + grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    log::info!("{} exited with {}", self.label, status);
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(10));
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Error checking {} process: {}", self.label, e);
                    break;
                }
            }
        }

        log::info!("Stopping {}...", self.label);
        let _ = child.kill();
        let _ = child.wait();
        log::info!("{} stopped", self.label);
    }
}

impl Drop for ProcessBridge {
    fn drop(&mut self) {
        self.shutdown(Duration::from_millis(500));
    }
}

impl std::fmt::Debug for ProcessBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessBridge")
            .field("label", &self.label)
            .field("stdin_open", &self.stdin.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_complete_utf8() {
        let mut pending = "héllo".as_bytes().to_vec();
        assert_eq!(decode_chunk(&mut pending), "héllo");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_decode_keeps_split_character() {
        let bytes = "aé".as_bytes();
        let mut pending = bytes[..2].to_vec();
        assert_eq!(decode_chunk(&mut pending), "a");
        assert_eq!(pending.len(), 1);

        pending.extend_from_slice(&bytes[2..]);
        assert_eq!(decode_chunk(&mut pending), "é");
    }

    #[test]
    fn test_decode_replaces_invalid_bytes() {
        let mut pending = vec![b'a', 0xff, b'b'];
        assert_eq!(decode_chunk(&mut pending), "a\u{FFFD}b");
    }

    #[test]
    fn test_spawn_missing_program_fails() {
        let err = ProcessBridge::spawn("definitely-not-a-real-program-xyz", &[]).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_and_drain_roundtrip() {
        let mut bridge = ProcessBridge::spawn("cat", &[]).unwrap();
        bridge.write_line("hello").unwrap();

        let mut seen = String::new();
        while !seen.contains("hello\n") {
            match bridge.wait_for_output(Duration::from_secs(5)).unwrap() {
                Some(chunk) => seen.push_str(&chunk),
                None => panic!("no output from cat"),
            }
        }
        assert!(bridge.is_running());

        bridge.shutdown(Duration::from_secs(2));
        assert!(!bridge.is_running());
        assert!(bridge.write_line("late").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_stderr_is_drained() {
        let args = vec!["-c".to_string(), "echo oops >&2".to_string()];
        let bridge = ProcessBridge::spawn("sh", &args).unwrap();
        let chunk = bridge.wait_for_output(Duration::from_secs(5)).unwrap();
        assert_eq!(chunk.as_deref(), Some("oops\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_both_streams_share_one_channel() {
        let script = "echo one; echo two; echo oops >&2".to_string();
        let mut bridge = ProcessBridge::spawn("sh", &["-c".to_string(), script]).unwrap();
        let output = bridge.output();
        bridge.shutdown(Duration::from_secs(2));
        drop(bridge);

        let mut stdout = String::new();
        let mut stderr = String::new();
        for chunk in output.iter() {
            for line in chunk.split_inclusive('\n') {
                if line.starts_with("oops") {
                    stderr.push_str(line);
                } else {
                    stdout.push_str(line);
                }
            }
        }
        assert_eq!(stdout, "one\ntwo\n");
        assert_eq!(stderr, "oops\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_shutdown_kills_stubborn_process() {
        let args = vec!["30".to_string()];
        let mut bridge = ProcessBridge::spawn("sleep", &args).unwrap();
        let started = Instant::now();
        bridge.shutdown(Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(10));
        bridge.shutdown(Duration::from_millis(100));
    }
}
