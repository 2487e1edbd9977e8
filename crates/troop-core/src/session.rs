//! The dispatch path of a session.
//!
//! A [`Session`] owns the active backend and the console. Every submitted
//! block goes through [`Session::submit`], which turns any per-call failure
//! into a console diagnostic so one bad block never ends the session.

use crate::backend::Backend;
use crate::clock::{ClockSnapshot, SharedClock};
use crate::console::Console;
use crate::echo::CodeBlock;
use std::time::Instant;

/// The local participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub name: String,
    pub colour: String,
}

impl Participant {
    pub fn new(name: impl Into<String>, colour: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            colour: colour.into(),
        }
    }
}

/// A live session bound to one backend.
#[derive(Debug)]
pub struct Session {
    backend: Backend,
    console: Console,
    local: Participant,
}

impl Session {
    pub fn new(backend: Backend, console: Console, local: Participant) -> Self {
        Self {
            backend,
            console,
            local,
        }
    }

    /// Dispatch a block. Returns false if it was reported as a failure.
    pub fn submit(&mut self, block: &CodeBlock) -> bool {
        match self.backend.evaluate(block, &self.console) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Block from {} failed: {}", block.sender, e);
                self.console.diagnostic(e.to_string());
                false
            }
        }
    }

    /// Dispatch text written by the local participant.
    pub fn submit_local(&mut self, text: &str) -> bool {
        let block = CodeBlock::new(text, &self.local.name, &self.local.colour);
        self.submit(&block)
    }

    /// Evaluate the backend's "silence everything" code.
    pub fn stop(&mut self) -> bool {
        let text = self.backend.stop_sound().to_string();
        self.submit_local(&text)
    }

    /// Time and tempo to hand to a newly joined collaborator.
    pub fn clock_snapshot(&self) -> ClockSnapshot {
        self.backend.snapshot()
    }

    /// Adopt time received from an authoritative peer.
    pub fn sync_clock(&self, snapshot: ClockSnapshot, received_at: Instant) {
        log::info!(
            "Syncing clock to beat {:.3} (remote tempo {:.1})",
            snapshot.time,
            snapshot.tempo
        );
        self.backend.set_time(snapshot.time, received_at);
    }

    /// Shared handle to the backend clock, for a sync path on another thread.
    pub fn clock(&self) -> SharedClock {
        self.backend.clock()
    }

    /// Forward queued engine output to the console.
    ///
    /// Returns the number of chunks forwarded.
    pub fn drain_output(&mut self) -> usize {
        let chunks = self.backend.drain_output();
        let count = chunks.len();
        for chunk in chunks {
            self.console.output(chunk);
        }
        count
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn local(&self) -> &Participant {
        &self.local
    }

    /// Shut the backend down and forward whatever output it left behind.
    pub fn terminate(&mut self) {
        self.backend.terminate();
        self.drain_output();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.backend.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EmbeddedBackend;
    use crate::config::EmbeddedSettings;
    use crate::console::ConsoleEvent;

    fn session() -> (Session, crossbeam_channel::Receiver<ConsoleEvent>) {
        let backend = Backend::Embedded(EmbeddedBackend::new(&EmbeddedSettings::default()).unwrap());
        let (console, rx) = Console::channel();
        (Session::new(backend, console, Participant::new("Ann", "White")), rx)
    }

    #[test]
    fn test_failure_becomes_diagnostic() {
        let (mut session, rx) = session();
        assert!(!session.submit_local("nonexistent_function();"));

        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events.last(), Some(ConsoleEvent::Diagnostic(msg)) if msg.contains("nonexistent_function")));

        // The session keeps working afterwards
        assert!(session.submit_local("let y = 2;"));
    }

    #[test]
    fn test_stop_evaluates_stop_token() {
        let (mut session, rx) = session();
        assert!(session.stop());
        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(&events[0], ConsoleEvent::Echo(line) if line.code == "clock.clear()"));
    }

    #[test]
    fn test_sync_clock() {
        let (session, _rx) = session();
        session.sync_clock(
            ClockSnapshot {
                time: 32.0,
                tempo: 120.0,
            },
            Instant::now(),
        );
        let snapshot = session.clock_snapshot();
        assert!(snapshot.time >= 32.0);
        assert_eq!(snapshot.tempo, 120.0);
    }

    #[test]
    fn test_terminated_backend_reports_diagnostic() {
        let (mut session, rx) = session();
        session.terminate();
        session.terminate();
        assert!(!session.submit_local("1"));
        assert!(matches!(rx.try_recv(), Ok(ConsoleEvent::Echo(line)) if line.code == "1"));
        assert!(matches!(rx.try_recv(), Ok(ConsoleEvent::Diagnostic(_))));
    }
}
