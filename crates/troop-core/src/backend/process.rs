//! Backend that drives an interactive REPL over pipes.
//!
//! The default target is `ghci` with Tidal loaded. On start the backend
//! writes a fixed bootstrap sequence (imports, the `d1..dN` channel setters
//! and a `hush` binding) and waits for the REPL's first output before it
//! accepts code. Each block is then wrapped in `:{` / `:}` so multi-line
//! definitions reach the REPL as one unit.
//!
//! # Lifecycle
//!
//! ```text
//! Created -> Bootstrapping -> Ready <-> Evaluating
//!                               \-> Terminated
//! ```

use super::echo_block;
use crate::bridge::ProcessBridge;
use crate::clock::{InertClock, SharedClock};
use crate::config::ProcessSettings;
use crate::console::Console;
use crate::echo::CodeBlock;
use crate::error::{Error, Result};
use crate::pattern::KeywordMatcher;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Code bound during bootstrap that silences every channel.
pub const STOP_SOUND: &str = "hush";

/// Operators highlighted in addition to the channel names.
const OPERATOR_KEYWORDS: &[&str] = &["$", "#", "hush"];

/// Lifecycle state of a [`ProcessBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplState {
    Created,
    Bootstrapping,
    Ready,
    Evaluating,
    Terminated,
}

impl fmt::Display for ReplState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplState::Created => "created",
            ReplState::Bootstrapping => "bootstrapping",
            ReplState::Ready => "ready",
            ReplState::Evaluating => "evaluating",
            ReplState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Channel identifiers `d1..dN`.
pub fn channel_names(channels: u8) -> Vec<String> {
    (1..=channels).map(|n| format!("d{}", n)).collect()
}

/// Lines written to a fresh REPL, in order.
pub fn bootstrap_sequence(channels: u8) -> Vec<String> {
    let mut lines = vec![
        "import Sound.Tidal.Context".to_string(),
        ":set -XOverloadedStrings".to_string(),
        "(cps, getNow) <- bpsUtils".to_string(),
    ];
    for n in 1..=channels {
        lines.push(format!("(d{n}, t{n}) <- superDirtSetters getNow"));
    }
    lines.push(format!(
        "let hush = mapM_ ($ silence) [{}]",
        channel_names(channels).join(",")
    ));
    lines
}

/// Wrap a block in the REPL's multi-line delimiters.
pub fn frame_block(text: &str) -> String {
    format!(":{{\n{}\n:}}\n", text)
}

/// Runs blocks in an external REPL process.
pub struct ProcessBackend {
    settings: ProcessSettings,
    state: ReplState,
    bridge: Option<ProcessBridge>,
    /// Output observed during bootstrap, handed out by the first drain.
    pending: VecDeque<String>,
    matcher: KeywordMatcher,
    clock: SharedClock,
}

impl ProcessBackend {
    /// Prepare a backend without starting the process.
    pub fn new(settings: &ProcessSettings) -> Result<Self> {
        if settings.channels == 0 {
            return Err(Error::Config(
                "process backend needs at least one channel".to_string(),
            ));
        }
        if settings.program.trim().is_empty() {
            return Err(Error::Config("process program is empty".to_string()));
        }

        let keywords = channel_names(settings.channels)
            .into_iter()
            .chain(OPERATOR_KEYWORDS.iter().map(|s| s.to_string()));

        Ok(Self {
            settings: settings.clone(),
            state: ReplState::Created,
            bridge: None,
            pending: VecDeque::new(),
            matcher: KeywordMatcher::compile(keywords)?,
            clock: SharedClock::new(InertClock::new()),
        })
    }

    /// Prepare and start a backend, returning once it is ready.
    pub fn spawn(settings: &ProcessSettings) -> Result<Self> {
        let mut backend = Self::new(settings)?;
        backend.start()?;
        Ok(backend)
    }

    /// Spawn the REPL, write the bootstrap sequence and wait for output.
    ///
    /// On failure the process is shut down and the backend is terminated.
    pub fn start(&mut self) -> Result<()> {
        if self.state != ReplState::Created {
            return Err(Error::NotReady(self.state));
        }

        let result = self.bootstrap();
        if result.is_err() {
            self.terminate();
        }
        result
    }

    fn bootstrap(&mut self) -> Result<()> {
        let bridge = self
            .bridge
            .insert(ProcessBridge::spawn(&self.settings.program, &self.settings.args)?);
        self.state = ReplState::Bootstrapping;

        for line in bootstrap_sequence(self.settings.channels) {
            log::debug!("[{}] > {}", bridge.label(), line);
            bridge.write_line(&line)?;
        }

        let started = Instant::now();
        let timeout = self.settings.startup_timeout();
        log::info!("Waiting for {} to become ready...", bridge.label());

        let first = bridge.wait_for_output(timeout)?.ok_or_else(|| {
            Error::Transport(format!(
                "No output from {} within {:.1}s",
                bridge.label(),
                timeout.as_secs_f32()
            ))
        })?;
        self.pending.push_back(first);

        log::info!(
            "{} is ready ({:.1}s)",
            bridge.label(),
            started.elapsed().as_secs_f32()
        );
        self.state = ReplState::Ready;
        Ok(())
    }

    pub fn state(&self) -> ReplState {
        self.state
    }

    /// Echo a block and write it to the REPL.
    ///
    /// The echo happens whatever the state; only a ready REPL gets the code.
    pub fn evaluate(&mut self, block: &CodeBlock, console: &Console) -> Result<()> {
        if !echo_block(block, &self.matcher, console) {
            return Ok(());
        }

        match self.state {
            ReplState::Ready => {}
            ReplState::Terminated => return Err(Error::Terminated),
            state => return Err(Error::NotReady(state)),
        }
        let Some(bridge) = self.bridge.as_mut() else {
            return Err(Error::Terminated);
        };

        self.state = ReplState::Evaluating;
        let result = bridge.write_all(&frame_block(&block.text));

        if result.is_err() && !bridge.is_running() {
            log::warn!("{} is no longer running", bridge.label());
            self.terminate();
        } else {
            self.state = ReplState::Ready;
        }
        result
    }

    pub fn stop_sound(&self) -> &str {
        STOP_SOUND
    }

    /// Close the REPL's input, then kill it if it does not exit in time.
    ///
    /// Output still in flight is kept for the next [`drain_output`].
    ///
    /// [`drain_output`]: ProcessBackend::drain_output
    pub fn terminate(&mut self) {
        if self.state == ReplState::Terminated {
            return;
        }
        if let Some(mut bridge) = self.bridge.take() {
            let output = bridge.output();
            let grace = self.settings.shutdown_grace();
            bridge.shutdown(grace);
            drop(bridge);
            self.collect_remaining(&output, grace);
        }
        self.state = ReplState::Terminated;
    }

    /// Queue chunks until the drain workers hit end of file or `limit` passes.
    fn collect_remaining(&mut self, output: &Receiver<String>, limit: Duration) {
        let deadline = Instant::now() + limit;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match output.recv_timeout(remaining) {
                Ok(chunk) => self.pending.push_back(chunk),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    log::debug!("Output still open after shutdown, leaving the rest");
                    break;
                }
            }
        }
    }

    /// Receiver for REPL output, while the process is attached.
    pub fn output(&self) -> Option<Receiver<String>> {
        self.bridge.as_ref().map(ProcessBridge::output)
    }

    /// Output queued so far, without blocking.
    ///
    /// After [`terminate`](ProcessBackend::terminate) this still returns
    /// what the REPL printed before it exited.
    pub fn drain_output(&mut self) -> Vec<String> {
        let mut chunks: Vec<String> = self.pending.drain(..).collect();
        if let Some(bridge) = self.bridge.as_ref() {
            chunks.extend(bridge.try_drain());
        }
        chunks
    }

    /// Block for up to `timeout` waiting for REPL output.
    pub fn wait_for_output(&mut self, timeout: Duration) -> Result<Option<String>> {
        if let Some(chunk) = self.pending.pop_front() {
            return Ok(Some(chunk));
        }
        match self.bridge.as_ref() {
            Some(bridge) => bridge.wait_for_output(timeout),
            None => Err(Error::Terminated),
        }
    }

    pub fn matcher(&self) -> &KeywordMatcher {
        &self.matcher
    }

    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }
}

impl Drop for ProcessBackend {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl fmt::Debug for ProcessBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessBackend")
            .field("program", &self.settings.program)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
