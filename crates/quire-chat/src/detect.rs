//! Plan-content detection
//!
//! Scores text against the [`PatternSet`] and decides whether it reads like a
//! plan document. Every function here is pure: the same input always yields
//! the same [`DetectionResult`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::patterns::{PatternSet, heading_text};

/// Below this many characters (trimmed) text is never classified as a plan
pub const MIN_CLASSIFY_LENGTH: usize = 50;

/// Streams shorter than this are not checked at all
pub const MIN_DETECTION_LENGTH: usize = 100;

/// The early indicator needs at least this many characters
pub const EARLY_INDICATOR_MIN_LENGTH: usize = 20;

/// The early indicator only looks at this many leading characters
pub const EARLY_INDICATOR_WINDOW: usize = 500;

/// Confidence at which `classify` reports plan content
pub const PLAN_CONFIDENCE_THRESHOLD: f64 = 0.35;

// Weights in hundredths so that thresholds compare exactly.
const MARKER_POINTS: u32 = 30;
const INTRO_POINTS: u32 = 20;
const STRUCTURE_POINTS: u32 = 15;
const HEADING_POINTS: u32 = 10;
const LIST_POINTS: u32 = 5;
const THRESHOLD_POINTS: u32 = 35;
const MAX_POINTS: u32 = 100;

const MAX_FALLBACK_TITLE_CHARS: usize = 100;

/// Outcome of classifying a piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub is_plan_content: bool,
    pub plan_title: Option<String>,
    /// Heuristic score in `[0, 1]`
    pub confidence: f64,
    /// Character offset where the plan starts, `-1` when not a plan
    pub plan_start_index: i64,
}

impl DetectionResult {
    /// The result for text that is not a plan
    pub fn negative() -> Self {
        Self {
            is_plan_content: false,
            plan_title: None,
            confidence: 0.0,
            plan_start_index: -1,
        }
    }
}

/// Classifies text against an immutable pattern table
#[derive(Debug, Clone)]
pub struct Detector {
    patterns: Arc<PatternSet>,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(PatternSet::shared())
    }
}

impl Detector {
    /// Create a detector over a pattern table
    pub fn new(patterns: Arc<PatternSet>) -> Self {
        Self { patterns }
    }

    /// The pattern table in use
    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Score `content` and decide whether it is plan content.
    pub fn classify(&self, content: &str) -> DetectionResult {
        if content.trim().chars().count() < MIN_CLASSIFY_LENGTH {
            return DetectionResult::negative();
        }

        let patterns = &self.patterns;
        let mut points = 0u32;
        let mut title: Option<String> = None;
        let mut start: Option<usize> = None;

        for marker in patterns.markers() {
            if let Some(caps) = marker.captures(content) {
                points += MARKER_POINTS;
                if let Some(m) = caps.get(0) {
                    start = earliest(start, m.start());
                }
                if title.is_none() {
                    title = heading_text(&caps);
                }
            }
        }

        let first_intro = patterns
            .intros()
            .iter()
            .filter_map(|re| re.find(content))
            .map(|m| m.start())
            .min();
        if let Some(offset) = first_intro {
            points += INTRO_POINTS;
            start = earliest(start, offset);
        }

        let structures = patterns
            .structures()
            .iter()
            .filter(|re| re.is_match(content))
            .count() as u32;
        points += structures * STRUCTURE_POINTS;

        let headings = patterns.heading_count(content);
        if headings >= 3 {
            points += HEADING_POINTS;
        }
        if headings >= 5 {
            points += HEADING_POINTS;
        }
        if patterns.bullet_count(content) >= 3 {
            points += LIST_POINTS;
        }
        if patterns.numbered_count(content) >= 3 {
            points += LIST_POINTS;
        }

        let points = points.min(MAX_POINTS);
        let confidence = f64::from(points) / 100.0;
        let is_plan_content = points >= THRESHOLD_POINTS;

        if !is_plan_content {
            return DetectionResult {
                is_plan_content,
                plan_title: None,
                confidence,
                plan_start_index: -1,
            };
        }

        if title.is_none() {
            title = patterns.first_heading(content);
        }
        let plan_start_index = start
            .map(|byte| char_offset(content, byte) as i64)
            .unwrap_or(0);

        DetectionResult {
            is_plan_content,
            plan_title: title,
            confidence,
            plan_start_index,
        }
    }

    /// Cheap pre-check: an intro or marker within the first
    /// [`EARLY_INDICATOR_WINDOW`] characters. Never scores.
    pub fn has_early_indicator(&self, content: &str) -> bool {
        if content.chars().count() < EARLY_INDICATOR_MIN_LENGTH {
            return false;
        }
        let window = char_prefix(content, EARLY_INDICATOR_WINDOW);
        self.patterns.intros().iter().any(|re| re.is_match(window))
            || self.patterns.markers().iter().any(|re| re.is_match(window))
    }

    /// Best-effort title: first marker heading, else first heading, else a
    /// short first line.
    pub fn extract_title(&self, content: &str) -> Option<String> {
        for marker in self.patterns.markers() {
            if let Some(title) = marker.captures(content).and_then(|caps| heading_text(&caps)) {
                return Some(title);
            }
        }

        if let Some(heading) = self.patterns.first_heading(content) {
            return Some(heading);
        }

        let line = content.lines().map(str::trim).find(|l| !l.is_empty())?;
        let line = line.trim_start_matches(['#', '*']).trim();
        if line.is_empty() || line.chars().count() > MAX_FALLBACK_TITLE_CHARS {
            None
        } else {
            Some(line.to_string())
        }
    }
}

/// Length below which callers skip detection
pub fn minimum_detection_length() -> usize {
    MIN_DETECTION_LENGTH
}

/// [`Detector::classify`] with the built-in patterns
pub fn classify(content: &str) -> DetectionResult {
    Detector::default().classify(content)
}

/// [`Detector::has_early_indicator`] with the built-in patterns
pub fn has_early_indicator(content: &str) -> bool {
    Detector::default().has_early_indicator(content)
}

/// [`Detector::extract_title`] with the built-in patterns
pub fn extract_title(content: &str) -> Option<String> {
    Detector::default().extract_title(content)
}

fn earliest(current: Option<usize>, candidate: usize) -> Option<usize> {
    Some(current.map_or(candidate, |c| c.min(candidate)))
}

fn char_offset(text: &str, byte: usize) -> usize {
    text.get(..byte).map_or(0, |prefix| prefix.chars().count())
}

fn char_prefix(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}
