//! Keyword matching for echo highlighting.
//!
//! Each backend compiles its vocabulary (engine functions, channel names,
//! operators) once at construction. The matcher only decides which parts of
//! an echoed line get emphasis; it never influences what is executed.

use crate::error::Result;
use regex::Regex;
use std::ops::Range;

/// A keyword occurrence inside a line of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch {
    /// Byte range of the keyword in the searched text.
    pub range: Range<usize>,
    /// Index of the keyword in the vocabulary.
    pub keyword: usize,
}

/// Whole-token matcher over an ordered keyword vocabulary.
///
/// A keyword matches when it is not preceded by an ASCII letter or `.` and
/// not followed by an ASCII letter. Matching is case-sensitive.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
    /// Finds candidate start positions; `None` for an empty vocabulary.
    candidates: Option<Regex>,
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::empty()
    }
}

impl KeywordMatcher {
    /// Build a matcher from a keyword vocabulary.
    ///
    /// Keywords are literal tokens. Duplicates and empty strings are dropped,
    /// keeping the first occurrence so vocabulary order is preserved.
    pub fn compile<I, S>(keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for kw in keywords {
            let kw = kw.into();
            if !kw.is_empty() && !unique.contains(&kw) {
                unique.push(kw);
            }
        }

        if unique.is_empty() {
            return Ok(Self::empty());
        }

        let alternation = unique
            .iter()
            .map(|kw| regex::escape(kw))
            .collect::<Vec<_>>()
            .join("|");
        let candidates = Regex::new(&alternation)?;

        log::debug!("Compiled keyword matcher with {} keywords", unique.len());

        Ok(Self {
            keywords: unique,
            candidates: Some(candidates),
        })
    }

    /// A matcher that never matches anything.
    pub fn empty() -> Self {
        Self {
            keywords: Vec::new(),
            candidates: None,
        }
    }

    /// The compiled vocabulary, in order.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Whether any keyword occurs as a whole token in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.find_at(text, 0).is_some()
    }

    /// All non-overlapping keyword occurrences, left to right.
    pub fn find_all(&self, text: &str) -> Vec<KeywordMatch> {
        let mut found = Vec::new();
        let mut pos = 0;
        while let Some(m) = self.find_at(text, pos) {
            pos = m.range.end;
            found.push(m);
        }
        found
    }

    /// First whole-token match starting at or after `start`.
    fn find_at(&self, text: &str, start: usize) -> Option<KeywordMatch> {
        let candidates = self.candidates.as_ref()?;
        let mut pos = start;

        while pos <= text.len() {
            let candidate = candidates.find_at(text, pos)?;
            let at = candidate.start();

            // Several keywords may begin here; the first in vocabulary order
            // whose boundaries hold wins.
            let hit = self.keywords.iter().enumerate().find(|(_, kw)| {
                text[at..].starts_with(kw.as_str()) && is_boundary(text, at, at + kw.len())
            });
            if let Some((index, kw)) = hit {
                return Some(KeywordMatch {
                    range: at..at + kw.len(),
                    keyword: index,
                });
            }

            pos = at + text[at..].chars().next().map_or(1, char::len_utf8);
        }
        None
    }
}

fn is_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !matches!(before, Some(c) if c.is_ascii_alphabetic() || c == '.')
        && !matches!(after, Some(c) if c.is_ascii_alphabetic())
}
