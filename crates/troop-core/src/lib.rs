//! Troop Core - Backend dispatch and shared clock for collaborative live coding.
//!
//! This crate takes code blocks written by session participants and runs
//! them on one of several interchangeable audio engines:
//!
//! - **Embedded** - An in-process Rhai engine with its own tempo clock
//! - **Network** - OSC messages to SuperCollider's Troop quark
//! - **Process** - An interactive REPL (ghci running Tidal) over pipes
//!
//! # Architecture
//!
//! The front end resolves a [`Backend`] once at startup through the
//! [`registry`] and hands it to a [`Session`]. Each submitted [`CodeBlock`]
//! is echoed to the [`Console`] and then sent through the backend's
//! transport. Failures become console diagnostics; only configuration errors
//! abort startup. Clock values are read and written through a
//! [`SharedClock`] so a sync path on another thread can keep collaborators
//! on the same beat.

pub mod backend;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod console;
pub mod echo;
pub mod engine;
pub mod error;
pub mod osc;
pub mod pattern;
pub mod registry;
pub mod session;

// Re-export main types for convenience
pub use backend::{Backend, BackendKind, EmbeddedBackend, NetworkBackend, ProcessBackend, ReplState};
pub use bridge::ProcessBridge;
pub use clock::{Clock, ClockSnapshot, InertClock, SharedClock, TransportClock};
pub use config::{Config, EmbeddedSettings, NetworkSettings, ProcessSettings, SessionSettings};
pub use console::{Console, ConsoleEvent};
pub use echo::{colour_format, format_echo, CodeBlock, EchoLine};
pub use engine::{ExecutionOutcome, ScriptEngine};
pub use error::{Error, Result};
pub use osc::OscClient;
pub use pattern::{KeywordMatch, KeywordMatcher};
pub use session::{Participant, Session};
