//! Reassembles wrapped physical lines into one logical line per entry.
//!
//! The merger is a single pass over the block's lines with a buffer of
//! segments for the entry being built. A set of post-passes then repairs
//! what the single pass cannot see: DOIs broken by wrapping and several
//! entries glued onto one line. The post-passes run until nothing changes.

use once_cell::sync::Lazy;
use regex::Regex;

use citelink_core::authors::{is_cjk, is_surname_particle};

use crate::config::ParsingConfig;
use crate::identifiers::collapse_doi_breaks;
use crate::normalize::normalize_reference_text;

/// `12. `, `3) `, `7<TAB>` or `[4]` at the start of a line.
static ENUMERATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\[\d{1,3}\]\s*|\d{1,3}[.)\t]\s+)").unwrap());

static PAGE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

/// Tail of a DOI wrapped onto its own line, e.g. `2009.4703.04.02`.
static DOI_FRAGMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+\.\d+$").unwrap());

/// A line that is only a DOI or DOI prefix. A `doi` prefix must carry the
/// DOI itself or end the line, so the surname `Doi` never matches.
static DOI_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:https?://\s*\S*doi\.org/|10\.\d{4,9}/\S+|doi[:：]?\s*(?:10\.\d{4,9}/|$))")
        .unwrap()
});

/// Something followed by a parenthesized year: the entry-boundary signal.
static AUTHOR_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.+\(([12]\d{3})[a-z]?\)").unwrap());

/// `Journal of Things, 12` and similar venue-plus-volume fragments.
static JOURNAL_VOLUME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z &\-]+,?\s*\d").unwrap());

/// `319(5870)` volume/issue fragments.
static VOLUME_ISSUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\([\d–-]+\)").unwrap());

/// `Science,` / `Nature` on a line by itself.
static BARE_JOURNAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z &\-]+,?$").unwrap());

static YEAR_PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([12]\d{3}[a-z]?\)").unwrap());

static URL_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+|10\.\d{4,9}/\S+").unwrap());

/// Longest author run (in characters) looked at before a year.
const MAX_PHRASE_CHARS: usize = 800;
/// Longest distance from the start of a tail to its year for it to open an entry.
const MAX_OPENER_CHARS: usize = 300;
/// Same distance for the sentence-boundary split, which is stricter.
const MAX_NEAR_OPENER_CHARS: usize = 40;
const MAX_AUTHOR_TOKENS: usize = 60;

static SENTENCE_GAP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\s+").unwrap());

/// Counters for lines the merger discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub page_numbers: usize,
    pub section_labels: usize,
    pub orphan_doi_lines: usize,
}

/// Logical lines plus what was dropped on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub lines: Vec<String>,
    pub stats: MergeStats,
}

fn starts_with_capital_or_cjk(line: &str) -> bool {
    line.chars()
        .next()
        .is_some_and(|c| c.is_ascii_uppercase() || is_cjk(c))
}

/// Remove a leading enumeration marker. DOIs (`10.1234/...`) never match.
pub fn strip_enumeration(line: &str) -> &str {
    match ENUMERATION_RE.find(line) {
        Some(m) => line[m.end()..].trim_start(),
        None => line,
    }
}

pub fn is_author_year_opener(line: &str) -> bool {
    AUTHOR_YEAR_RE.is_match(line)
}

/// Line-merging state machine for one reference block.
pub struct LineMerger {
    section_labels: Vec<String>,
    continuation_markers: Vec<String>,
    max_passes: usize,
}

/// The entry being assembled.
#[derive(Default)]
struct EntryBuffer {
    segments: Vec<String>,
}

impl EntryBuffer {
    fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn append(&mut self, line: &str) {
        match self.segments.last_mut() {
            Some(last) => {
                last.push(' ');
                last.push_str(line);
            }
            None => self.segments.push(line.to_string()),
        }
    }

    fn push(&mut self, line: &str) {
        self.segments.push(line.to_string());
    }

    fn last_has_author_year(&self) -> bool {
        self.segments.last().is_some_and(|s| is_author_year_opener(s))
    }

    fn flush_into(&mut self, out: &mut Vec<String>) {
        if !self.segments.is_empty() {
            out.push(self.segments.join(" "));
            self.segments.clear();
        }
    }
}

impl LineMerger {
    pub fn new(config: &ParsingConfig) -> Self {
        Self {
            section_labels: config.section_labels(),
            continuation_markers: config.continuation_markers(),
            max_passes: config.max_merge_passes(),
        }
    }

    fn is_section_label(&self, line: &str) -> bool {
        let bare = line.trim_end_matches([':', '：']).trim();
        self.section_labels.iter().any(|l| l == bare)
    }

    /// Whether `line` continues the current entry even though it does not
    /// open a new one.
    fn is_continuation(&self, line: &str, buffer: &EntryBuffer) -> bool {
        JOURNAL_VOLUME_RE.is_match(line)
            || VOLUME_ISSUE_RE.is_match(line)
            || self.continuation_markers.iter().any(|m| line.contains(m.as_str()))
            || (buffer.last_has_author_year() && !starts_with_capital_or_cjk(line))
            || BARE_JOURNAL_RE.is_match(line)
            || !line.ends_with('.')
    }

    /// Merge the physical lines of a block into logical lines, then run the
    /// post-passes to a fixpoint.
    pub fn merge(&self, block: &str) -> MergeOutcome {
        let mut stats = MergeStats::default();
        let mut merged = Vec::new();
        let mut buffer = EntryBuffer::default();

        for raw in block.lines() {
            let normalized = normalize_reference_text(raw.trim());
            let line = strip_enumeration(normalized.trim());
            if line.is_empty() {
                continue;
            }
            if PAGE_NUMBER_RE.is_match(line) {
                stats.page_numbers += 1;
                continue;
            }
            if self.is_section_label(line) {
                stats.section_labels += 1;
                continue;
            }

            if DOI_FRAGMENT_RE.is_match(line) || DOI_LINE_RE.is_match(line) {
                if buffer.is_empty() {
                    tracing::debug!(line, "dropping DOI line with no entry to attach to");
                    stats.orphan_doi_lines += 1;
                } else {
                    buffer.append(line);
                }
                continue;
            }

            // Every author-year line lands here, so the buffer's own year never
            // forces a flush on its own.
            if is_author_year_opener(line) && !buffer.is_empty() {
                if starts_with_capital_or_cjk(line) {
                    buffer.flush_into(&mut merged);
                    buffer.push(line);
                } else {
                    buffer.append(line);
                }
                continue;
            }

            if !buffer.is_empty() && self.is_continuation(line, &buffer) {
                buffer.append(line);
                continue;
            }

            buffer.push(line);
        }
        buffer.flush_into(&mut merged);

        MergeOutcome {
            lines: self.post_process(merged),
            stats,
        }
    }

    /// Apply every post-pass repeatedly until the lines stop changing or the
    /// pass limit is reached.
    pub fn post_process(&self, mut lines: Vec<String>) -> Vec<String> {
        for pass in 0..self.max_passes {
            let next = run_post_passes(&lines);
            if next == lines {
                tracing::debug!(passes = pass + 1, "merge post-passes reached a fixpoint");
                return next;
            }
            lines = next;
        }
        tracing::warn!(
            max_passes = self.max_passes,
            "merge post-passes did not settle, keeping last result"
        );
        lines
    }
}

fn run_post_passes(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|l| collapse_doi_breaks(l))
        .flat_map(|l| split_author_year_phrases(&l))
        .flat_map(|l| split_after_identifier(&l))
        .flat_map(|l| split_at_sentence_opener(&l))
        .filter(|l| !l.is_empty())
        .collect()
}

fn is_connective(word: &str) -> bool {
    matches!(
        word.to_lowercase().as_str(),
        "and" | "et" | "al" | "eds" | "ed"
    ) || is_surname_particle(word)
}

/// Whether `text` reads like an author list: capitalized or CJK name
/// tokens, initials, connectives and surname particles only.
fn is_author_like(text: &str) -> bool {
    let mut tokens = 0;
    let mut first_seen = false;
    for word in text.split_whitespace() {
        tokens += 1;
        if tokens > MAX_AUTHOR_TOKENS {
            return false;
        }
        let core = word.trim_matches(|c: char| !c.is_alphanumeric());
        let Some(first) = core.chars().next() else {
            continue;
        };
        let ok = first.is_uppercase() || is_cjk(first) || is_connective(core);
        if !ok || (!first_seen && core.eq_ignore_ascii_case("and")) {
            return false;
        }
        first_seen = true;
    }
    first_seen
}

/// Byte offset just past the last sentence-ending period in `region`.
///
/// A period after a capital letter is an initial, and periods in ellipses
/// or after `al`, `Eds`, `pp` and similar abbreviations do not end a sentence.
fn last_sentence_break(region: &str) -> Option<usize> {
    let chars: Vec<(usize, char)> = region.char_indices().collect();
    let mut found = None;
    for (k, &(i, c)) in chars.iter().enumerate() {
        if c != '.' {
            continue;
        }
        let prev = k.checked_sub(1).map(|j| chars[j].1);
        let next = chars.get(k + 1).map(|&(_, n)| n);
        if prev.is_some_and(|p| p.is_ascii_uppercase() || p == '.') || next == Some('.') {
            continue;
        }
        if !next.is_some_and(|n| n.is_whitespace() || is_cjk(n)) {
            continue;
        }
        let word = region[..i]
            .rsplit(|ch: char| ch.is_whitespace())
            .next()
            .unwrap_or_default()
            .to_lowercase();
        if matches!(word.as_str(), "al" | "eds" | "ed" | "pp" | "vol" | "no") {
            continue;
        }
        found = Some(i + c.len_utf8());
    }
    found
}

/// Start of the author phrase that owns the year parenthesis at `paren`.
///
/// The phrase may not cross another parenthesis, a URL or DOI, or a
/// sentence break, and must read like an author list.
fn phrase_start(line: &str, paren: usize) -> Option<usize> {
    let head = &line[..paren];
    let floor = head.rfind(['(', ')']).map_or(0, |i| i + 1);
    let mut start = URL_TOKEN_RE
        .find_iter(&head[floor..])
        .last()
        .map_or(floor, |m| floor + m.end());
    if let Some(b) = last_sentence_break(&head[start..]) {
        start += b;
    }
    let candidate = &head[start..];
    start += candidate.len() - candidate.trim_start().len();

    let phrase = &line[start..paren];
    (phrase.chars().count() <= MAX_PHRASE_CHARS && is_author_like(phrase)).then_some(start)
}

/// Whether `text` begins with an author-year opener whose year sits within
/// `max_chars` of the start.
fn opens_entry(text: &str, max_chars: usize) -> bool {
    YEAR_PAREN_RE.find(text).is_some_and(|m| {
        text[..m.start()].chars().count() <= max_chars
            && phrase_start(text, m.start()) == Some(0)
    })
}

/// Whether `piece` stops right after its `(Year)`, leaving no title.
fn ends_at_year(piece: &str) -> bool {
    let piece = piece.trim_end_matches(['.', ' ']);
    YEAR_PAREN_RE
        .find_iter(piece)
        .last()
        .is_some_and(|m| m.end() == piece.len())
}

/// Split a line holding two or more author-year phrases at each later phrase.
///
/// A cut that would leave the earlier part without a title is skipped: the
/// later phrase is a name in that title (`Revisiting Jones (2019) model`).
fn split_author_year_phrases(line: &str) -> Vec<String> {
    let mut starts: Vec<usize> = YEAR_PAREN_RE
        .find_iter(line)
        .filter_map(|m| phrase_start(line, m.start()))
        .collect();
    starts.dedup();
    if starts.len() < 2 {
        return vec![line.to_string()];
    }

    let mut parts = Vec::with_capacity(starts.len());
    let mut from = 0;
    for &cut in &starts[1..] {
        if cut <= from || ends_at_year(&line[from..cut]) {
            continue;
        }
        parts.push(line[from..cut].trim().to_string());
        from = cut;
    }
    parts.push(line[from..].trim().to_string());
    parts
}

/// Split after a URL or DOI when the text that follows opens a new entry.
fn split_after_identifier(line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = line;
    'outer: loop {
        for m in URL_TOKEN_RE.find_iter(rest) {
            let tail = rest[m.end()..].trim_start();
            let separated = tail.len() < rest.len() - m.end();
            if !tail.is_empty() && separated && opens_entry(tail, MAX_OPENER_CHARS) {
                parts.push(rest[..m.end()].trim().to_string());
                rest = tail;
                continue 'outer;
            }
        }
        parts.push(rest.trim().to_string());
        return parts;
    }
}

/// Split at `". "` when a new author-year opener follows closely and the
/// period does not end an initial (`J. Smith`).
fn split_at_sentence_opener(line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut from = 0;
    for gap in SENTENCE_GAP_RE.find_iter(line) {
        let before = line[..gap.start()].chars().next_back();
        if before.is_none_or(|c| c.is_ascii_uppercase() || is_cjk(c)) {
            continue;
        }
        if ends_at_year(&line[from..gap.start()]) {
            continue;
        }
        if opens_entry(&line[gap.end()..], MAX_NEAR_OPENER_CHARS) {
            parts.push(line[from..gap.start() + 1].trim().to_string());
            from = gap.end();
        }
    }
    parts.push(line[from..].trim().to_string());
    parts
}

/// Render logical lines as `NNN<TAB>line` rows for inspection.
pub fn dump_lines(lines: &[String]) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, l)| format!("{:03}\t{}\n", i + 1, l))
        .collect()
}
