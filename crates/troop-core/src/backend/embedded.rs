//! Backend that runs code in the in-process scripting engine.

use super::echo_block;
use crate::clock::SharedClock;
use crate::config::EmbeddedSettings;
use crate::console::Console;
use crate::echo::CodeBlock;
use crate::engine::{ExecutionOutcome, ScriptEngine, ENGINE_KEYWORDS};
use crate::error::{Error, Result};
use crate::pattern::KeywordMatcher;

/// Code that stops every player.
pub const STOP_SOUND: &str = "clock.clear()";

/// Runs blocks directly in a [`ScriptEngine`].
///
/// The engine's own clock is the backend clock, so tempo changes made by
/// scripts are visible to the sync path and vice versa.
pub struct EmbeddedBackend {
    engine: ScriptEngine,
    matcher: KeywordMatcher,
    clock: SharedClock,
    terminated: bool,
}

impl EmbeddedBackend {
    pub fn new(settings: &EmbeddedSettings) -> Result<Self> {
        let engine = ScriptEngine::new(settings.bpm, settings.max_operations);
        let clock = SharedClock::from_arc(engine.clock());
        let matcher = KeywordMatcher::compile(ENGINE_KEYWORDS.iter().copied())?;

        log::info!("Embedded engine ready at {} BPM", clock.tempo());

        Ok(Self {
            engine,
            matcher,
            clock,
            terminated: false,
        })
    }

    pub fn evaluate(&mut self, block: &CodeBlock, console: &Console) -> Result<()> {
        if !echo_block(block, &self.matcher, console) {
            return Ok(());
        }
        if self.terminated {
            return Err(Error::Terminated);
        }

        let outcome = self.engine.execute(&block.text, false);
        for line in outcome.output() {
            console.output(line.clone());
        }

        match outcome {
            ExecutionOutcome::Success { .. } => Ok(()),
            ExecutionOutcome::Failure { message, .. } => Err(Error::Execution(message)),
        }
    }

    pub fn stop_sound(&self) -> &str {
        STOP_SOUND
    }

    /// Stop every player and refuse further blocks.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        if let ExecutionOutcome::Failure { message, .. } = self.engine.execute(STOP_SOUND, false) {
            log::warn!("Failed to clear players on shutdown: {}", message);
        }
        self.terminated = true;
        log::info!("Embedded engine stopped");
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn matcher(&self) -> &KeywordMatcher {
        &self.matcher
    }

    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    /// The underlying engine, for inspection.
    pub fn engine(&self) -> &ScriptEngine {
        &self.engine
    }
}

impl std::fmt::Debug for EmbeddedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedBackend")
            .field("clock", &self.clock)
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ConsoleEvent;
    use std::time::{Duration, Instant};

    fn backend() -> EmbeddedBackend {
        EmbeddedBackend::new(&EmbeddedSettings::default()).unwrap()
    }

    #[test]
    fn test_echo_then_execute() {
        let mut backend = backend();
        let (console, rx) = Console::channel();
        let block = CodeBlock::new("let x = 1;\nprint(x + 1);", "Ann", "White");

        backend.evaluate(&block, &console).unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], ConsoleEvent::Echo(l) if l.prefix == "Ann"));
        assert!(matches!(&events[1], ConsoleEvent::Echo(l) if l.prefix == "..."));
        assert_eq!(events[2], ConsoleEvent::Output("2".into()));
    }

    #[test]
    fn test_failure_is_an_execution_error() {
        let mut backend = backend();
        let (console, _rx) = Console::channel();
        let block = CodeBlock::new("this is not valid", "Ann", "White");

        let err = backend.evaluate(&block, &console).unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[test]
    fn test_blank_block_is_ignored() {
        let mut backend = backend();
        let (console, rx) = Console::channel();
        backend
            .evaluate(&CodeBlock::new("   \n", "Ann", "White"), &console)
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_clock_delegates_to_engine() {
        let mut backend = backend();
        let (console, _rx) = Console::channel();
        backend
            .evaluate(&CodeBlock::new("clock.bpm = 60;", "Ann", "White"), &console)
            .unwrap();
        assert_eq!(backend.clock().tempo(), 60.0);

        let received = Instant::now() - Duration::from_secs(1);
        backend.clock().set_time(16.0, received);
        let time = backend.clock().time();
        assert!(time >= 17.0 - 0.01, "time {} should include elapsed beats", time);
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let mut backend = backend();
        let (console, _rx) = Console::channel();
        backend
            .evaluate(&CodeBlock::new("play(\"p1\", \"x\");", "Ann", "White"), &console)
            .unwrap();

        backend.terminate();
        backend.terminate();
        assert!(backend.engine().players().is_empty());

        let (console, rx) = Console::channel();
        assert!(matches!(
            backend.evaluate(&CodeBlock::new("1", "Ann", "White"), &console),
            Err(Error::Terminated)
        ));
        assert!(matches!(rx.try_recv(), Ok(ConsoleEvent::Echo(line)) if line.code == "1"));
        assert!(rx.try_recv().is_err());
    }
}
