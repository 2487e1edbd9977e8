//! Console channel carrying every piece of user-visible text.
//!
//! Echoed code, engine output and diagnostics all flow through one
//! crossbeam channel to whatever front end renders them.

use crate::echo::EchoLine;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Text produced by the dispatch core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// A line of a submitted block, echoed before dispatch.
    Echo(EchoLine),
    /// Output produced by an engine.
    Output(String),
    /// A reportable, non-fatal failure.
    Diagnostic(String),
}

/// Sending half of the console channel.
#[derive(Clone, Debug)]
pub struct Console {
    tx: Sender<ConsoleEvent>,
}

impl Console {
    /// Create a console and the receiver that renders its events.
    pub fn channel() -> (Self, Receiver<ConsoleEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    pub fn echo(&self, line: EchoLine) {
        self.send(ConsoleEvent::Echo(line));
    }

    pub fn output(&self, text: impl Into<String>) {
        self.send(ConsoleEvent::Output(text.into()));
    }

    pub fn diagnostic(&self, text: impl Into<String>) {
        self.send(ConsoleEvent::Diagnostic(text.into()));
    }

    fn send(&self, event: ConsoleEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Console receiver dropped, discarding event");
        }
    }
}
