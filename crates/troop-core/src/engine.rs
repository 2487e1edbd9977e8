//! In-process Rhai engine used by the embedded backend.
//!
//! Scripts run against a persistent scope, so variables defined by one block
//! are visible to the next. The engine owns a [`TransportClock`] that scripts
//! drive through the `clock` object and the tempo functions.
//!
//! # Script API
//!
//! - `clock.bpm` / `clock.bpm = 140` - Read or change the tempo
//! - `clock.now()` - Current beat
//! - `clock.clear()` - Stop every player
//! - `play(name, pattern)` / `stop(name)` / `players()` - Player registry
//! - `set_tempo(bpm)` / `get_tempo()` - Tempo shortcuts

use crate::clock::{Clock, TransportClock};
use rhai::{Array, Dynamic, Engine, Scope};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Names the engine registers, used as the embedded backend's keywords.
pub const ENGINE_KEYWORDS: &[&str] = &[
    "clock",
    "play",
    "stop",
    "players",
    "set_tempo",
    "get_tempo",
    "print",
];

/// Default cap on script operations per block.
pub const DEFAULT_MAX_OPERATIONS: u64 = 50_000_000;

/// Result of running one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The block ran to completion.
    Success { output: Vec<String> },
    /// The block raised an error. Output printed before the error is kept.
    Failure { message: String, output: Vec<String> },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    /// Lines printed by the script, whatever the outcome.
    pub fn output(&self) -> &[String] {
        match self {
            ExecutionOutcome::Success { output } | ExecutionOutcome::Failure { output, .. } => {
                output
            }
        }
    }
}

type Players = Arc<Mutex<BTreeMap<String, String>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The `clock` object visible to scripts.
#[derive(Clone)]
struct ScriptClock {
    clock: Arc<Mutex<TransportClock>>,
    players: Players,
}

impl ScriptClock {
    fn bpm(&mut self) -> f64 {
        lock(&self.clock).bpm()
    }

    fn set_bpm(&mut self, bpm: f64) {
        lock(&self.clock).set_bpm(bpm, Instant::now());
    }

    fn now(&mut self) -> f64 {
        lock(&self.clock).time()
    }

    fn clear(&mut self) {
        let mut players = lock(&self.players);
        if !players.is_empty() {
            log::info!("[engine] Clearing {} players", players.len());
        }
        players.clear();
    }
}

/// Embedded scripting engine with its own clock.
pub struct ScriptEngine {
    engine: Engine,
    scope: Scope<'static>,
    clock: Arc<Mutex<TransportClock>>,
    players: Players,
    printed: Arc<Mutex<Vec<String>>>,
}

impl ScriptEngine {
    /// Create an engine whose clock starts at beat 0 with the given tempo.
    pub fn new(bpm: f64, max_operations: u64) -> Self {
        let clock = Arc::new(Mutex::new(TransportClock::new(bpm)));
        let players: Players = Arc::new(Mutex::new(BTreeMap::new()));
        let printed = Arc::new(Mutex::new(Vec::new()));

        let mut engine = Engine::new();
        engine.set_max_expr_depths(4096, 4096);
        engine.set_max_call_levels(4096);
        engine.set_max_operations(max_operations);

        // Capture print() so the backend can forward it to the console
        let sink = printed.clone();
        engine.on_print(move |text| {
            lock(&sink).push(text.to_string());
        });
        engine.on_debug(|text, source, pos| {
            log::debug!("[engine] {} ({:?} @ {})", text, source, pos);
        });

        engine
            .register_type_with_name::<ScriptClock>("Clock")
            .register_get_set("bpm", ScriptClock::bpm, ScriptClock::set_bpm)
            .register_set("bpm", |c: &mut ScriptClock, bpm: i64| c.set_bpm(bpm as f64))
            .register_fn("now", ScriptClock::now)
            .register_fn("clear", ScriptClock::clear);

        register_tempo(&mut engine, &clock);
        register_players(&mut engine, &players);

        let mut scope = Scope::new();
        scope.push(
            "clock",
            ScriptClock {
                clock: clock.clone(),
                players: players.clone(),
            },
        );

        Self {
            engine,
            scope,
            clock,
            players,
            printed,
        }
    }

    /// Run a block of script.
    ///
    /// In verbose mode the value of the final expression is appended to the
    /// output unless it is `()`.
    pub fn execute(&mut self, text: &str, verbose: bool) -> ExecutionOutcome {
        lock(&self.printed).clear();

        let result = self
            .engine
            .eval_with_scope::<Dynamic>(&mut self.scope, text);

        let mut output = std::mem::take(&mut *lock(&self.printed));
        match result {
            Ok(value) => {
                if verbose && !value.is_unit() {
                    output.push(value.to_string());
                }
                ExecutionOutcome::Success { output }
            }
            Err(e) => ExecutionOutcome::Failure {
                message: e.to_string(),
                output,
            },
        }
    }

    /// The engine's clock, shared with the backend.
    pub fn clock(&self) -> Arc<Mutex<TransportClock>> {
        self.clock.clone()
    }

    /// Names and patterns of the players currently running.
    pub fn players(&self) -> Vec<(String, String)> {
        lock(&self.players)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn register_tempo(engine: &mut Engine, clock: &Arc<Mutex<TransportClock>>) {
    let c = clock.clone();
    engine.register_fn("set_tempo", move |bpm: f64| {
        lock(&c).set_bpm(bpm, Instant::now());
    });
    let c = clock.clone();
    engine.register_fn("set_tempo", move |bpm: i64| {
        lock(&c).set_bpm(bpm as f64, Instant::now());
    });
    let c = clock.clone();
    engine.register_fn("get_tempo", move || lock(&c).bpm());
}

fn register_players(engine: &mut Engine, players: &Players) {
    let p = players.clone();
    engine.register_fn("play", move |name: &str, pattern: &str| {
        log::info!("[engine] play {} -> {}", name, pattern);
        lock(&p).insert(name.to_string(), pattern.to_string());
    });
    let p = players.clone();
    engine.register_fn("stop", move |name: &str| -> bool {
        lock(&p).remove(name).is_some()
    });
    let p = players.clone();
    engine.register_fn("players", move || -> Array {
        lock(&p).keys().map(|k| Dynamic::from(k.clone())).collect()
    });
}
