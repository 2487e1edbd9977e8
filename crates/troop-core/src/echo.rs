//! Console echo of submitted code blocks.
//!
//! Every block is echoed before it is dispatched: the sender's name in their
//! colour, then the first line of code; every later line is aligned under it
//! with a run of dots as long as the name.
//!
//! ```text
//! <colour="White">Ann</colour> : x = 1
//! <colour="White">...</colour> : y = 2
//! ```

use crate::pattern::KeywordMatcher;
use std::fmt;
use std::ops::Range;

/// Separator between the coloured prefix and the code line.
pub const SEPARATOR: &str = " : ";

/// Colour used when a sender has none configured.
pub const DEFAULT_COLOUR: &str = "White";

/// A block of code submitted by a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub text: String,
    pub sender: String,
    pub colour: String,
}

impl CodeBlock {
    pub fn new(
        text: impl Into<String>,
        sender: impl Into<String>,
        colour: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            sender: sender.into(),
            colour: colour.into(),
        }
    }

    /// Trimmed, non-empty lines of the block.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n').map(str::trim).filter(|l| !l.is_empty())
    }

    /// Whether the block has nothing but blank lines.
    pub fn is_blank(&self) -> bool {
        self.lines().next().is_none()
    }
}

/// Wrap `text` in a colour tag.
pub fn colour_format(text: &str, colour: &str) -> String {
    format!("<colour=\"{}\">{}</colour>", colour, text)
}

/// One echoed line of a code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoLine {
    /// Sender name on the first line, dots on the rest.
    pub prefix: String,
    pub colour: String,
    /// The trimmed code line.
    pub code: String,
    /// Byte ranges in `code` that hold backend keywords.
    pub highlights: Vec<Range<usize>>,
}

impl EchoLine {
    /// Render the line with the inline colour markup.
    pub fn to_markup(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EchoLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            colour_format(&self.prefix, &self.colour),
            SEPARATOR,
            self.code
        )
    }
}

/// Format a block for echoing.
///
/// Blank lines are dropped; an all-blank block yields no lines.
pub fn format_echo(block: &CodeBlock, matcher: &KeywordMatcher) -> Vec<EchoLine> {
    let dots = ".".repeat(block.sender.chars().count());

    block
        .lines()
        .enumerate()
        .map(|(i, line)| EchoLine {
            prefix: if i == 0 {
                block.sender.clone()
            } else {
                dots.clone()
            },
            colour: block.colour.clone(),
            code: line.to_string(),
            highlights: matcher
                .find_all(line)
                .into_iter()
                .map(|m| m.range)
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_line_block() {
        let block = CodeBlock::new("x = 1\ny = 2", "Ann", "White");
        let lines = format_echo(&block, &KeywordMatcher::empty());

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].to_markup(), "<colour=\"White\">Ann</colour> : x = 1");
        assert_eq!(lines[1].to_markup(), "<colour=\"White\">...</colour> : y = 2");
    }

    #[test]
    fn test_blank_lines_are_dropped() {
        let block = CodeBlock::new("\n  a  \n\n\t\n b\n", "Bob", "Red");
        let lines = format_echo(&block, &KeywordMatcher::empty());

        let codes: Vec<_> = lines.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["a", "b"]);
        assert_eq!(lines[0].prefix, "Bob");
        assert_eq!(lines[1].prefix, "...");
    }

    #[test]
    fn test_blank_block_yields_nothing() {
        let block = CodeBlock::new(" \n\n   \n", "Ann", "White");
        assert!(block.is_blank());
        assert!(format_echo(&block, &KeywordMatcher::empty()).is_empty());
    }

    #[test]
    fn test_dots_match_name_length() {
        let block = CodeBlock::new("a\nb\nc", "Zoë", "Blue");
        let lines = format_echo(&block, &KeywordMatcher::empty());
        for line in &lines[1..] {
            assert_eq!(line.prefix, "...");
            assert_eq!(line.colour, "Blue");
        }
    }

    #[test]
    fn test_highlights_come_from_matcher() {
        let matcher = KeywordMatcher::compile(["d1", "$"]).unwrap();
        let block = CodeBlock::new("d1 $ sound \"bd\"", "Ann", "White");
        let lines = format_echo(&block, &matcher);
        assert_eq!(lines[0].highlights, vec![0..2, 3..4]);
    }

    #[test]
    fn test_colour_format() {
        assert_eq!(colour_format("x", "Green"), "<colour=\"Green\">x</colour>");
    }
}
