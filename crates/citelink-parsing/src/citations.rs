//! In-text citation markers: `Smith et al. (2019)`, `王等人（2020）`,
//! `(Smith, 2019; Doe, 2020a)`.
//!
//! Three scans run over the body in order. Western author-year runs claim
//! their spans first, then CJK runs, and a span overlapping an earlier claim
//! is skipped. A final scan splits unclaimed parenthetical groups. The
//! candidates are then cleaned, deduplicated and sorted.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use citelink_core::InlineCitation;
use citelink_core::authors::is_surname_particle;

use crate::config::ParsingConfig;

static WESTERN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(?P<author>[A-Za-zÀ-ž\d&'.,\-\s與和以及]{1,79}?)",
        r"(?:\s*(?:et\s+al\.|等[\s\x{3000}]*人?)\s*)?",
        r"\s*[（(]\s*(?P<year>\b\d{4}[a-z]?\b).*?[)）]",
    ))
    .unwrap()
});

static CJK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(?P<author>[\x{4E00}-\x{9FA5}]+(?:\s*等\s*人?)?)",
        r"\s*[（(]\s*(?P<year>\b\d{4}[a-z]?\b).*?[)）]",
    ))
    .unwrap()
});

static PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^()]+?)\)").unwrap());

static GROUP_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[;；]").unwrap());

/// One `Author, Year[, extra]` segment of a parenthetical group.
static GROUP_PART_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<author>.+?),\s*(?P<year>\b\d{4}[a-z]?\b)(?:\s*[,;，；].+)?$").unwrap()
});

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").unwrap());

static TRAILING_ET_AL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(?:et\s+al\.|等(?:人)?)$").unwrap());

static LEADING_CONNECTIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:以及|和|與|及)\s*").unwrap());

static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

static LONE_INITIAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]\.?$").unwrap());

static BARE_ET_AL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:al\.?|等人?)$").unwrap());

/// Words joining names inside a Western author run.
const CONNECTIVES: &[&str] = &["and", "&", "與", "和", "以及", "et", "al.", "al"];

/// Strip zero-width characters and control characters from body text and
/// normalize apostrophes. Line breaks and tabs become spaces.
pub fn preprocess_body(text: &str) -> String {
    text.nfc()
        .filter_map(|c| match c {
            '\u{2019}' => Some('\''),
            '\n' | '\r' | '\t' => Some(' '),
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// Claimed `[start, end)` byte ranges, kept disjoint and keyed by start.
#[derive(Debug, Default)]
pub struct ClaimSet {
    ranges: BTreeMap<usize, usize>,
}

impl ClaimSet {
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.ranges
            .range(..end)
            .next_back()
            .is_some_and(|(_, &claimed_end)| claimed_end > start)
    }

    /// Claim a range. Returns `false` and leaves the set unchanged when the
    /// range overlaps an existing claim.
    pub fn claim(&mut self, start: usize, end: usize) -> bool {
        if start >= end || self.overlaps(start, end) {
            return false;
        }
        self.ranges.insert(start, end);
        true
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// A raw match before cleaning.
#[derive(Debug, Clone)]
struct Candidate {
    raw_text: String,
    author: String,
    year: String,
}

/// Extracts in-text citations from document body text.
pub struct CitationExtractor {
    lead_words: HashSet<String>,
    max_author_words: usize,
}

impl Default for CitationExtractor {
    fn default() -> Self {
        Self::new(&ParsingConfig::default())
    }
}

impl CitationExtractor {
    pub fn new(config: &ParsingConfig) -> Self {
        Self {
            lead_words: config.citation_lead_words().into_iter().collect(),
            max_author_words: config.max_author_words(),
        }
    }

    /// Run all scans over `body` and return deduplicated citations sorted by
    /// `(author.lower(), year)`.
    pub fn extract(&self, body: &str) -> Vec<InlineCitation> {
        let text = preprocess_body(body);
        let mut claims = ClaimSet::default();

        let mut candidates = self.scan_western(&text, &mut claims);
        candidates.extend(scan_cjk(&text, &mut claims));
        candidates.extend(scan_parenthetical_groups(&text, &claims));

        tracing::debug!(
            candidates = candidates.len(),
            claimed = claims.len(),
            "scanned body for citations"
        );
        finalize(candidates)
    }

    fn is_lead_word(&self, token: &str) -> bool {
        let word = token.trim_end_matches([',', ';', ':', '.']);
        self.lead_words.contains(word)
    }

    /// Cut sentence context off the front of a Western author run.
    ///
    /// Keeps the trailing run of name-like tokens, then drops lead words and
    /// connectives from its front. Returns the byte offset of the kept run
    /// within `author`, or `None` when nothing name-like is left.
    fn trim_leading_context(&self, author: &str) -> Option<usize> {
        let tokens: Vec<(usize, &str)> = TOKEN_RE
            .find_iter(author)
            .map(|m| (m.start(), m.as_str()))
            .collect();

        let mut first = tokens.len();
        while first > 0 && is_name_like(tokens[first - 1].1) {
            first -= 1;
        }
        while first < tokens.len() {
            let token = tokens[first].1;
            let word = token.trim_end_matches([',', ';']);
            let skip = self.is_lead_word(token)
                || CONNECTIVES.contains(&word)
                || !token.chars().any(|c| c.is_alphabetic());
            if !skip {
                break;
            }
            first += 1;
        }
        tokens.get(first).map(|&(offset, _)| offset)
    }

    fn scan_western(&self, text: &str, claims: &mut ClaimSet) -> Vec<Candidate> {
        let mut out = Vec::new();
        let mut pos = 0;

        while pos < text.len() {
            let Some(caps) = WESTERN_RE.captures_at(text, pos) else {
                break;
            };
            let (Some(whole), Some(author), Some(year)) =
                (caps.get(0), caps.name("author"), caps.name("year"))
            else {
                break;
            };

            // An author run never starts right after a Latin letter.
            let after_letter = text[..whole.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphabetic());
            if after_letter {
                pos = next_char_boundary(text, whole.start());
                continue;
            }
            pos = whole.end().max(next_char_boundary(text, whole.start()));

            if claims.overlaps(whole.start(), whole.end()) {
                continue;
            }
            let Some(offset) = self.trim_leading_context(author.as_str()) else {
                continue;
            };
            let kept = &author.as_str()[offset..];
            let letters = kept.trim_start_matches(|c: char| !c.is_alphabetic());
            let start = author.start() + offset + (kept.len() - letters.len());
            let name = letters.trim_matches([' ', ',', '、', '，']).to_string();
            if name.chars().count() < 2 || name.split_whitespace().count() > self.max_author_words
            {
                continue;
            }

            claims.claim(whole.start(), whole.end());
            out.push(Candidate {
                raw_text: text[start..whole.end()].trim().to_string(),
                author: name,
                year: year.as_str().to_string(),
            });
        }
        out
    }
}

/// Capitalized words, initials, connectives and surname particles.
fn is_name_like(token: &str) -> bool {
    let word = token
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .trim_end_matches([',', ';', ':']);
    if word.is_empty() {
        return token.chars().all(|c| matches!(c, ',' | ';' | '&'));
    }
    CONNECTIVES.contains(&word)
        || is_surname_particle(word)
        || word.chars().next().is_some_and(char::is_uppercase)
}

fn next_char_boundary(text: &str, at: usize) -> usize {
    text[at..]
        .chars()
        .next()
        .map_or(text.len(), |c| at + c.len_utf8())
}

fn scan_cjk(text: &str, claims: &mut ClaimSet) -> Vec<Candidate> {
    CJK_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if !claims.claim(whole.start(), whole.end()) {
                return None;
            }
            Some(Candidate {
                raw_text: whole.as_str().trim().to_string(),
                author: caps["author"].trim().to_string(),
                year: caps["year"].to_string(),
            })
        })
        .collect()
}

/// Split unclaimed `(Author, Year; Author, Year)` groups. Every segment must
/// parse or the whole group is dropped. Groups never claim their span.
fn scan_parenthetical_groups(text: &str, claims: &ClaimSet) -> Vec<Candidate> {
    let mut out = Vec::new();
    for caps in PAREN_RE.captures_iter(text) {
        let (Some(whole), Some(content)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if claims.overlaps(whole.start(), whole.end()) || !content.as_str().contains(',') {
            continue;
        }

        let parts: Option<Vec<Candidate>> = GROUP_SEPARATOR_RE
            .split(content.as_str())
            .map(|part| {
                let part = part.trim();
                let m = GROUP_PART_RE.captures(part)?;
                Some(Candidate {
                    raw_text: format!("({part})"),
                    author: m["author"].trim().to_string(),
                    year: m["year"].to_string(),
                })
            })
            .collect();
        if let Some(parts) = parts {
            out.extend(parts);
        }
    }
    out
}

/// Normalize a candidate author: CJK connectives to `&`, trailing `et al.`
/// and `等(人)` removed (restored if nothing else remains), leading
/// connectives and digits removed, whitespace collapsed.
fn clean_author(author: &str) -> String {
    let folded = author
        .replace(" 與 ", " & ")
        .replace(" 和 ", " & ")
        .replace(" 以及 ", " & ");

    let mut cleaned = TRAILING_ET_AL_RE.replace(&folded, "").trim().to_string();
    if cleaned.is_empty() {
        cleaned = folded.trim().to_string();
    }
    let cleaned = LEADING_CONNECTIVE_RE.replace(&cleaned, "");
    let cleaned = DIGITS_RE.replace_all(&cleaned, "");
    MULTI_SPACE_RE.replace_all(&cleaned, " ").trim().to_string()
}

fn is_rejected_author(author: &str) -> bool {
    author.is_empty()
        || author.chars().any(|c| c.is_ascii_digit())
        || LONE_INITIAL_RE.is_match(author)
        || BARE_ET_AL_RE.is_match(author)
}

/// Clean, reject, deduplicate (raw text first, then key) and sort.
fn finalize(candidates: Vec<Candidate>) -> Vec<InlineCitation> {
    let mut seen_raw = HashSet::new();
    let mut seen_keys = HashSet::new();
    let mut out = Vec::new();

    for candidate in candidates {
        if !seen_raw.insert(candidate.raw_text.clone()) {
            continue;
        }
        let author = clean_author(&candidate.author);
        if is_rejected_author(&author) {
            tracing::debug!(
                raw = %candidate.raw_text,
                author = %author,
                "rejected citation author"
            );
            continue;
        }
        let citation = InlineCitation {
            raw_text: candidate.raw_text,
            author,
            year: candidate.year,
        };
        if seen_keys.insert(citation.key()) {
            out.push(citation);
        }
    }

    out.sort_by_cached_key(InlineCitation::key);
    out
}

/// Extract citations with the default configuration.
pub fn extract_citations(body: &str) -> Vec<InlineCitation> {
    CitationExtractor::default().extract(body)
}
