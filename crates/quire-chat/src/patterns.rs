//! Regular expressions that recognise plan-shaped text
//!
//! Three groups feed the detector: heading markers that introduce a plan,
//! conversational intros that announce one, and layout signatures of a
//! structured document. The built-in table is compiled once and shared; a
//! [`PatternSet`] never changes after construction.

use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};

use crate::error::{Error, Result};

/// Heading lines that open a plan. Group 1 captures the heading text.
const MARKER_PATTERNS: &[&str] = &[
    r"(?im)^[ \t]*#{1,6}[ \t]+((?:implementation|feature|project)[ \t]+plan\b.*)$",
    r"(?im)^[ \t]*#{1,6}[ \t]+(plan\b.*)$",
    r"(?im)^[ \t]*#{1,6}[ \t]+((?:overview|summary|approach)\b.*)$",
    r"(?im)^[ \t]*#{1,6}[ \t]+((?:phase|step|task)[ \t]+\d+\b.*)$",
    r"(?im)^[ \t]*#{1,6}[ \t]+((?:implementation|architecture|design)\b.*)$",
];

/// Lead-ins announcing that a plan follows
const INTRO_PATTERNS: &[&str] = &[
    r"(?i)\bhere(?:'s|’s|[ \t]+is)[ \t]+(?:the|a|my|our)[ \t]+(?:\w+[ \t]+){0,2}plan\b",
    r"(?i)\bI(?:'ll|’ll|[ \t]+will)[ \t]+(?:outline|create|draft|write|prepare|propose|put[ \t]+together)[ \t]+(?:a|an|the)[ \t]+(?:\w+[ \t]+){0,2}plan\b",
    r"(?i)\blet[ \t]+me[ \t]+(?:outline|create|draft|write|prepare|propose|put[ \t]+together)[ \t]+(?:a|an|the)[ \t]+(?:\w+[ \t]+){0,2}plan\b",
    r"(?i)\bthe[ \t]+following[ \t]+(?:\w+[ \t]+){0,2}plan\b",
    r"(?i)\bproposed[ \t]+(?:\w+[ \t]+){0,2}plan\b",
];

/// Layout signatures of a structured document
const STRUCTURE_PATTERNS: &[&str] = &[
    // level-2 heading followed later by a level-3 heading
    r"(?ms)^[ \t]*##[ \t]+\S.*?^[ \t]*###[ \t]+\S",
    r"(?im)^[ \t]*##[ \t]+(?:phase|task|step)[ \t]+\d+",
    // checkbox items
    r"(?m)^[ \t]*[-*+][ \t]+\[[ xX]\]",
];

const HEADING_LINE: &str = r"(?m)^[ \t]*#{1,6}[ \t]+(\S.*?)[ \t#]*$";
const BULLET_LINE: &str = r"(?m)^[ \t]*[-*+][ \t]+\S";
const NUMBERED_LINE: &str = r"(?m)^[ \t]*\d+[.)][ \t]+\S";

static BUILTIN: LazyLock<Arc<PatternSet>> = LazyLock::new(|| Arc::new(PatternSet::builtin()));

/// An immutable, ordered table of detection patterns
#[derive(Debug, Clone)]
pub struct PatternSet {
    markers: Vec<Regex>,
    intros: Vec<Regex>,
    structures: Vec<Regex>,
    heading: Regex,
    bullet: Regex,
    numbered: Regex,
}

impl PatternSet {
    /// The shared built-in table
    pub fn shared() -> Arc<PatternSet> {
        Arc::clone(&BUILTIN)
    }

    /// Compile the built-in table
    pub fn builtin() -> Self {
        Self {
            markers: compile_valid(MARKER_PATTERNS.iter().copied()),
            intros: compile_valid(INTRO_PATTERNS.iter().copied()),
            structures: compile_valid(STRUCTURE_PATTERNS.iter().copied()),
            heading: fixed(HEADING_LINE),
            bullet: fixed(BULLET_LINE),
            numbered: fixed(NUMBERED_LINE),
        }
    }

    /// The built-in table extended with user patterns.
    ///
    /// Extra markers and intros are tried after the built-in ones. Patterns
    /// that fail to compile are logged and skipped.
    pub fn with_extra(extra_markers: &[String], extra_intros: &[String]) -> Self {
        let mut set = Self::builtin();
        set.markers
            .extend(compile_valid(extra_markers.iter().map(String::as_str)));
        set.intros
            .extend(compile_valid(extra_intros.iter().map(String::as_str)));
        set
    }

    /// Compile one pattern
    pub fn compile(pattern: &str) -> Result<Regex> {
        Regex::new(pattern).map_err(|e| Error::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
    }

    /// Marker patterns in declared order
    pub fn markers(&self) -> &[Regex] {
        &self.markers
    }

    /// Intro patterns in declared order
    pub fn intros(&self) -> &[Regex] {
        &self.intros
    }

    /// Structure patterns in declared order
    pub fn structures(&self) -> &[Regex] {
        &self.structures
    }

    /// Number of Markdown heading lines
    pub fn heading_count(&self, text: &str) -> usize {
        self.heading.find_iter(text).count()
    }

    /// Number of bullet-list lines (checkbox items included)
    pub fn bullet_count(&self, text: &str) -> usize {
        self.bullet.find_iter(text).count()
    }

    /// Number of numbered-list lines
    pub fn numbered_count(&self, text: &str) -> usize {
        self.numbered.find_iter(text).count()
    }

    /// Text of the first Markdown heading
    pub fn first_heading(&self, text: &str) -> Option<String> {
        self.heading
            .captures(text)
            .and_then(|caps| heading_text(&caps))
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Heading text from a marker match: group 1 when present, else the whole
/// match, with `#` and surrounding whitespace removed.
pub fn heading_text(caps: &Captures<'_>) -> Option<String> {
    let raw = caps.get(1).or_else(|| caps.get(0))?.as_str();
    let text = raw
        .trim()
        .trim_start_matches('#')
        .trim_end_matches('#')
        .trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn compile_valid<'a>(patterns: impl Iterator<Item = &'a str>) -> Vec<Regex> {
    patterns
        .filter_map(|p| match PatternSet::compile(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Skipping detection pattern: {}", e);
                None
            }
        })
        .collect()
}

fn fixed(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in line pattern compiles")
}
