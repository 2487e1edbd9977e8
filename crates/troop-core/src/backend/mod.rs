//! Backends that execute code blocks.
//!
//! A backend is a transport plus an execution target. Three are available:
//!
//! - [`EmbeddedBackend`] - In-process Rhai engine with its own tempo clock
//! - [`NetworkBackend`] - OSC messages to SuperCollider's Troop quark
//! - [`ProcessBackend`] - An interactive REPL (ghci running Tidal) over pipes
//!
//! [`Backend`] wraps whichever one the session was configured with and
//! exposes the common capability set.

pub mod embedded;
pub mod network;
pub mod process;

pub use embedded::EmbeddedBackend;
pub use network::NetworkBackend;
pub use process::{ProcessBackend, ReplState};

use crate::clock::{ClockSnapshot, SharedClock};
use crate::console::Console;
use crate::echo::{format_echo, CodeBlock};
use crate::error::{Error, Result};
use crate::pattern::KeywordMatcher;
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Identifier of a backend variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process scripting engine
    #[default]
    #[serde(alias = "foxdot")]
    Embedded,
    /// OSC over UDP
    #[serde(alias = "supercollider", alias = "sc")]
    Network,
    /// External REPL process
    #[serde(alias = "tidal")]
    Process,
}

impl BackendKind {
    /// Every backend, in registry order.
    pub const ALL: [BackendKind; 3] = [
        BackendKind::Embedded,
        BackendKind::Network,
        BackendKind::Process,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Embedded => "embedded",
            BackendKind::Network => "network",
            BackendKind::Process => "process",
        }
    }

    /// One-line description for listings.
    pub fn description(self) -> &'static str {
        match self {
            BackendKind::Embedded => "in-process Rhai engine with its own tempo clock",
            BackendKind::Network => "OSC messages to SuperCollider's Troop quark",
            BackendKind::Process => "interactive REPL (ghci + Tidal) over pipes",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embedded" | "foxdot" => Ok(BackendKind::Embedded),
            "network" | "supercollider" | "sc" => Ok(BackendKind::Network),
            "process" | "tidal" => Ok(BackendKind::Process),
            _ => Err(Error::UnknownBackend(s.to_string())),
        }
    }
}

/// Echo `block` to the console.
///
/// Returns false when the block is blank, in which case nothing is echoed
/// and nothing should be sent.
pub(crate) fn echo_block(block: &CodeBlock, matcher: &KeywordMatcher, console: &Console) -> bool {
    let lines = format_echo(block, matcher);
    if lines.is_empty() {
        return false;
    }
    for line in lines {
        console.echo(line);
    }
    true
}

/// The active backend of a session.
#[derive(Debug)]
pub enum Backend {
    Embedded(EmbeddedBackend),
    Network(NetworkBackend),
    Process(ProcessBackend),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Embedded(_) => BackendKind::Embedded,
            Backend::Network(_) => BackendKind::Network,
            Backend::Process(_) => BackendKind::Process,
        }
    }

    /// Echo a block and send it through the transport.
    pub fn evaluate(&mut self, block: &CodeBlock, console: &Console) -> Result<()> {
        match self {
            Backend::Embedded(b) => b.evaluate(block, console),
            Backend::Network(b) => b.evaluate(block, console),
            Backend::Process(b) => b.evaluate(block, console),
        }
    }

    /// Code that silences everything on this backend.
    pub fn stop_sound(&self) -> &str {
        match self {
            Backend::Embedded(b) => b.stop_sound(),
            Backend::Network(b) => b.stop_sound(),
            Backend::Process(b) => b.stop_sound(),
        }
    }

    /// Release the transport. Safe to call more than once.
    pub fn terminate(&mut self) {
        match self {
            Backend::Embedded(b) => b.terminate(),
            Backend::Network(b) => b.terminate(),
            Backend::Process(b) => b.terminate(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        match self {
            Backend::Embedded(b) => b.is_terminated(),
            Backend::Network(b) => b.is_terminated(),
            Backend::Process(b) => b.state() == ReplState::Terminated,
        }
    }

    /// Keyword matcher used to highlight echoed code.
    pub fn matcher(&self) -> &KeywordMatcher {
        match self {
            Backend::Embedded(b) => b.matcher(),
            Backend::Network(b) => b.matcher(),
            Backend::Process(b) => b.matcher(),
        }
    }

    /// Handle to the backend's clock, for the sync path.
    pub fn clock(&self) -> SharedClock {
        match self {
            Backend::Embedded(b) => b.clock(),
            Backend::Network(b) => b.clock(),
            Backend::Process(b) => b.clock(),
        }
    }

    pub fn time(&self) -> f64 {
        self.clock().time()
    }

    pub fn set_time(&self, value: f64, received_at: Instant) {
        self.clock().set_time(value, received_at);
    }

    pub fn tempo(&self) -> f64 {
        self.clock().tempo()
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        self.clock().snapshot()
    }

    /// Receiver for engine output produced asynchronously (process backend).
    pub fn output(&self) -> Option<Receiver<String>> {
        match self {
            Backend::Process(b) => b.output(),
            _ => None,
        }
    }

    /// Queued asynchronous output, without blocking.
    pub fn drain_output(&mut self) -> Vec<String> {
        match self {
            Backend::Process(b) => b.drain_output(),
            _ => Vec::new(),
        }
    }
}
