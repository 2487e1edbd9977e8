//! Turning typed lines and script files into code blocks and commands.
//!
//! Lines accumulate into a block until an empty line submits it. A line
//! starting with `:` that names one of the commands below is handled by the
//! CLI itself, but only between blocks, so REPL syntax inside a block is
//! passed through untouched.

use anyhow::{bail, Context, Result};

/// Commands understood by the interactive prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Evaluate the backend's stop code
    Stop,
    /// Print the clock's time and tempo
    Time,
    /// Adopt a time (and optionally a tempo) from a collaborator
    Sync { time: f64, tempo: Option<f64> },
    /// Show the command list
    Help,
    /// Leave the session
    Quit,
}

pub const HELP: &str = "\
Type code and finish the block with an empty line.

Commands:
  :stop                 silence everything
  :time                 show clock time and tempo
  :sync <time> [tempo]  adopt a collaborator's clock time
  :help                 show this help
  :quit                 leave the session";

/// Parse a command line.
///
/// Returns `Ok(None)` when `line` is not a command and should be treated
/// as code.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let Some(rest) = line.trim().strip_prefix(':') else {
        return Ok(None);
    };
    let mut words = rest.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };

    let command = match name {
        "stop" => Command::Stop,
        "time" => Command::Time,
        "help" | "h" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        "sync" => {
            let time = match words.next() {
                Some(word) => parse_beat(word)?,
                None => bail!("Usage: :sync <time> [tempo]"),
            };
            let tempo = words.next().map(parse_beat).transpose()?;
            if words.next().is_some() {
                bail!("Usage: :sync <time> [tempo]");
            }
            Command::Sync { time, tempo }
        }
        _ => return Ok(None),
    };
    Ok(Some(command))
}

fn parse_beat(word: &str) -> Result<f64> {
    let value: f64 = word
        .parse()
        .with_context(|| format!("Not a number: {}", word))?;
    if !value.is_finite() {
        bail!("Not a finite number: {}", word);
    }
    Ok(value)
}

/// What a typed line produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Block(String),
    Command(Command),
}

/// Collects typed lines into blocks.
#[derive(Debug, Default)]
pub struct BlockReader {
    lines: Vec<String>,
}

impl BlockReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its newline).
    pub fn push_line(&mut self, line: &str) -> Result<Option<Input>> {
        if line.trim().is_empty() {
            return Ok(self.take_block().map(Input::Block));
        }
        if self.lines.is_empty() {
            if let Some(command) = parse_command(line)? {
                return Ok(Some(Input::Command(command)));
            }
        }
        self.lines.push(line.to_string());
        Ok(None)
    }

    /// Flush whatever is buffered, e.g. when input ends.
    pub fn finish(&mut self) -> Option<String> {
        self.take_block()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn take_block(&mut self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        let block = self.lines.join("\n");
        self.lines.clear();
        Some(block)
    }
}

/// Split a script into blocks separated by blank lines.
///
/// With `whole` the entire text is one block.
pub fn split_blocks(text: &str, whole: bool) -> Vec<String> {
    if whole {
        return if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    }

    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command(":stop").unwrap(), Some(Command::Stop));
        assert_eq!(parse_command("  :time ").unwrap(), Some(Command::Time));
        assert_eq!(parse_command(":q").unwrap(), Some(Command::Quit));
        assert_eq!(
            parse_command(":sync 32.5").unwrap(),
            Some(Command::Sync {
                time: 32.5,
                tempo: None
            })
        );
        assert_eq!(
            parse_command(":sync 8 140").unwrap(),
            Some(Command::Sync {
                time: 8.0,
                tempo: Some(140.0)
            })
        );
    }

    #[test]
    fn test_non_commands_are_code() {
        assert_eq!(parse_command("d1 $ s \"bd\"").unwrap(), None);
        assert_eq!(parse_command(":t d1").unwrap(), None);
        assert_eq!(parse_command(":").unwrap(), None);
    }

    #[test]
    fn test_bad_sync_arguments() {
        assert!(parse_command(":sync").is_err());
        assert!(parse_command(":sync soon").is_err());
        assert!(parse_command(":sync inf").is_err());
        assert!(parse_command(":sync 1 2 3").is_err());
    }

    #[test]
    fn test_block_reader_submits_on_empty_line() {
        let mut reader = BlockReader::new();
        assert_eq!(reader.push_line("x = 1").unwrap(), None);
        assert_eq!(reader.push_line("y = 2").unwrap(), None);
        assert_eq!(
            reader.push_line("").unwrap(),
            Some(Input::Block("x = 1\ny = 2".into()))
        );
        assert!(reader.is_empty());
        assert_eq!(reader.push_line("   ").unwrap(), None);
    }

    #[test]
    fn test_commands_only_between_blocks() {
        let mut reader = BlockReader::new();
        assert_eq!(
            reader.push_line(":stop").unwrap(),
            Some(Input::Command(Command::Stop))
        );

        reader.push_line("do").unwrap();
        assert_eq!(reader.push_line(":stop").unwrap(), None);
        assert_eq!(reader.finish(), Some("do\n:stop".into()));
        assert_eq!(reader.finish(), None);
    }

    #[test]
    fn test_split_blocks() {
        let text = "x = 1\ny = 2\n\n\n  \nz = 3\n";
        assert_eq!(split_blocks(text, false), vec!["x = 1\ny = 2", "z = 3"]);
        assert_eq!(split_blocks(text, true), vec![text.to_string()]);
        assert!(split_blocks("\n \n", false).is_empty());
        assert!(split_blocks("\n \n", true).is_empty());
    }
}
