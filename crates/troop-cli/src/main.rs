//! Troop CLI - The `troop` command.
//!
//! Runs a collaborative live coding session against one backend. Code is
//! read from a script file and then from stdin; every block is echoed with
//! the sender's name before it is sent to the engine.
//!
//! # Architecture
//!
//! - **troop-core**: Backends, registry, shared clock and the session
//! - **input**: Block accumulation and `:` commands
//! - **render**: Console events to terminal colours

mod input;
mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{select, Receiver};
use input::{BlockReader, Command, Input};
use render::Renderer;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Instant;
use troop_core::{registry, ClockSnapshot, Config, Console, ConsoleEvent, Participant, Session};

/// Troop - Collaborative Live Coding
#[derive(Parser, Debug)]
#[command(name = "troop")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dispatch live code to SuperCollider, Tidal or an embedded engine", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a session, evaluating FILE first if given
    Run(RunArgs),

    /// List the available backends
    Backends,

    /// Show version information
    Version,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Script to evaluate before reading stdin
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Backend identifier (embedded, network, process or an alias)
    #[arg(short, long)]
    backend: Option<String>,

    /// Config file to use instead of the default location
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Name shown next to your code
    #[arg(short, long)]
    name: Option<String>,

    /// Colour of your name
    #[arg(long)]
    colour: Option<String>,

    /// Password expected by the SuperCollider Troop quark
    #[arg(long, env = "TROOP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Host of the OSC listener
    #[arg(long)]
    host: Option<String>,

    /// Port of the OSC listener
    #[arg(long)]
    port: Option<u16>,

    /// REPL program for the process backend
    #[arg(long)]
    program: Option<String>,

    /// Evaluate FILE as a single block instead of splitting on blank lines
    #[arg(long)]
    whole: bool,

    /// Exit after evaluating FILE instead of reading stdin
    #[arg(long)]
    exit: bool,

    /// Print colour markup as text instead of terminal colours
    #[arg(long)]
    plain: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    match args.command {
        Commands::Run(run_args) => run_session(run_args),
        Commands::Backends => {
            for (kind, description) in registry::available() {
                println!("{:<10} {}", kind, description);
            }
            Ok(())
        }
        Commands::Version => {
            println!("troop {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Backends:");
            for (kind, description) in registry::available() {
                println!("  - {}: {}", kind, description);
            }
            match Config::config_path() {
                Ok(path) => println!("\nConfig: {}", path.display()),
                Err(e) => println!("\nConfig: unavailable ({})", e),
            }
            Ok(())
        }
    }
}

/// Load the config file and apply command-line overrides.
fn load_config(args: &RunArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => Config::load_or_default().context("Failed to load the default config file")?,
    };

    if let Some(name) = &args.name {
        config.session.name = name.clone();
    }
    if let Some(colour) = &args.colour {
        config.session.colour = colour.clone();
    }
    if let Some(password) = &args.password {
        config.network.credential = Some(password.clone());
    }
    if let Some(host) = &args.host {
        config.network.host = host.clone();
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(program) = &args.program {
        config.process.program = program.clone();
    }
    Ok(config)
}

fn run_session(args: RunArgs) -> Result<()> {
    let config = load_config(&args)?;
    let identifier = args
        .backend
        .clone()
        .unwrap_or_else(|| config.backend.to_string());

    let backend = registry::resolve(&identifier, &config)
        .with_context(|| format!("Could not start backend '{}'", identifier))?;

    let (console, events) = Console::channel();
    let local = Participant::new(&config.session.name, &config.session.colour);
    let mut session = Session::new(backend, console, local);

    let renderer = Renderer::new(args.plain);
    let mut stdout = io::stdout();

    session.drain_output();
    flush_console(&renderer, &events, &mut stdout)?;

    if let Some(file) = &args.file {
        let script = fs::read_to_string(file)
            .with_context(|| format!("Failed to read file: {}", file.display()))?;
        let blocks = input::split_blocks(&script, args.whole);
        log::info!("Evaluating {} block(s) from {}", blocks.len(), file.display());

        for block in blocks {
            session.submit_local(&block);
            flush_console(&renderer, &events, &mut stdout)?;
        }
    }

    if !args.exit {
        interact(&mut session, &renderer, &events, &mut stdout)?;
    }

    session.terminate();
    flush_console(&renderer, &events, &mut stdout)
}

/// Multiplex typed input, engine output and signals until the session ends.
fn interact<W: Write>(
    session: &mut Session,
    renderer: &Renderer,
    events: &Receiver<ConsoleEvent>,
    out: &mut W,
) -> Result<()> {
    let lines = spawn_stdin_reader()?;
    let signals = spawn_signal_listener()?;
    let mut output = session
        .backend()
        .output()
        .unwrap_or_else(crossbeam_channel::never);
    let mut reader = BlockReader::new();

    log::info!(
        "Session ready on the {} backend as {} (type :help for commands)",
        session.backend().kind(),
        session.local().name
    );

    loop {
        select! {
            recv(lines) -> line => match line {
                Ok(line) => match reader.push_line(&line) {
                    Ok(Some(Input::Block(text))) => {
                        session.submit_local(&text);
                    }
                    Ok(Some(Input::Command(command))) => {
                        if !run_command(session, command) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => session.console().diagnostic(format!("{:#}", e)),
                },
                Err(_) => {
                    if let Some(text) = reader.finish() {
                        session.submit_local(&text);
                    }
                    log::debug!("Input closed");
                    break;
                }
            },
            recv(output) -> chunk => match chunk {
                Ok(chunk) => session.console().output(chunk),
                Err(_) => {
                    log::warn!("The {} backend stopped producing output", session.backend().kind());
                    output = crossbeam_channel::never();
                }
            },
            recv(signals) -> signal => {
                log::info!("Interrupted (signal {}), leaving session", signal.unwrap_or_default());
                break;
            }
        }
        flush_console(renderer, events, out)?;
    }
    Ok(())
}

/// Returns false when the session should end.
fn run_command(session: &mut Session, command: Command) -> bool {
    match command {
        Command::Stop => {
            session.stop();
        }
        Command::Time => {
            let snapshot = session.clock_snapshot();
            session.console().output(format!(
                "time {:.3} beats, tempo {:.1} bpm",
                snapshot.time, snapshot.tempo
            ));
        }
        Command::Sync { time, tempo } => {
            let tempo = tempo.unwrap_or_else(|| session.clock_snapshot().tempo);
            session.sync_clock(ClockSnapshot { time, tempo }, Instant::now());
        }
        Command::Help => session.console().output(input::HELP),
        Command::Quit => return false,
    }
    true
}

fn flush_console<W: Write>(
    renderer: &Renderer,
    events: &Receiver<ConsoleEvent>,
    out: &mut W,
) -> Result<()> {
    for event in events.try_iter() {
        renderer
            .render(out, &event)
            .context("Failed to write to terminal")?;
    }
    Ok(())
}

fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("Failed to read input: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn input thread")?;
    Ok(rx)
}

#[cfg(unix)]
fn spawn_signal_listener() -> Result<Receiver<i32>> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                if tx.send(signal).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn signal thread")?;
    Ok(rx)
}

#[cfg(not(unix))]
fn spawn_signal_listener() -> Result<Receiver<i32>> {
    Ok(crossbeam_channel::never())
}
