//! Ordered grammar chain for logical reference lines.
//!
//! Each [`ReferenceShape`] has one whole-line pattern. Lines are tried
//! against the shapes in [`ReferenceShape::ALL`] order and the first match
//! decides how fields are read. Patterns expect lines that went through
//! [`normalize_reference_text`], so full-width punctuation is already ASCII.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use citelink_core::authors::reference_surnames;
use citelink_core::{ParseOutput, ParsedReference, ReferenceShape};

use crate::identifiers::validate_doi;
use crate::normalize::normalize_reference_text;

/// Optional `https://doi.org/` or `doi:` prefix, then an optional DOI, then end of line.
macro_rules! doi_tail {
    () => {
        r"(?:https?://\s*\S*doi\.org/|(?i:doi):?\s*)?(?P<doi>10\.\S+)?\s*$"
    };
}

/// `Authors (2020a).`
macro_rules! author_year {
    () => {
        r"^(?P<authors>.+?)\s*\(\s*(?P<year>\d{4})[a-z]?\)"
    };
}

static JOURNAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?is)",
        author_year!(),
        r"\.\s*",
        r"(?P<title>.+?)\s*(?:\.\s*|:\s*|$)",
        r"(?P<journal>[^.,]+?)\s*,?\s*",
        r"(?P<vol>\d+)?(?:\((?P<issue>\d+)\))?\s*,?\s*",
        r"(?P<pages>\d+[-–]\d+)?\.?\s*",
        doi_tail!(),
    ))
    .unwrap()
});

static CHAPTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?is)",
        author_year!(),
        r"\.\s*",
        r"(?P<title>.+?)\.\s*",
        r"In\s+(?P<journal>.+?)\s*\((?:Vol\.\s*(?P<vol>\d+)[^)]*?,\s*)?p{1,2}\.\s*(?P<pages>\d+[-–]\d+)\)\.\s*",
        r"(?:[^.]+\.\s*)?",
        doi_tail!(),
    ))
    .unwrap()
});

static CJK_JOURNAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?s)^(?P<authors>[\x{4E00}-\x{9FFF}與和,\s]+?)\s*",
        r"\((?P<year>\d{4})[a-z]?\)\s*\.\s*",
        r"(?P<title>.+?)\s*\.\s*",
        r"(?P<journal>[^,]+),\s*",
        r"(?P<vol>\d+)(?:\((?P<issue>\d+)\))?,\s*",
        r"(?P<pages>\d+[-–]\d+)\.?\s*",
        doi_tail!(),
    ))
    .unwrap()
});

static GENERAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?is)",
        author_year!(),
        r"\.\s*",
        r"(?P<rest>.+?)\s*",
        doi_tail!(),
    ))
    .unwrap()
});

static CJK_FUZZY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?s)^(?P<authors>[\x{4E00}-\x{9FFF}與和,]+).*?",
        r"\(?(?P<year>\d{4})[a-z]?\)?.*?",
        r"(?P<doi>10\.\S+)$",
    ))
    .unwrap()
});

static BOOK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?is)",
        author_year!(),
        r"\.?\s*",
        r"(?P<title>.+?)\s*(?:\(pp?\.[^)]*\))?\.\s*",
        r"[^.]*?Press\.?\s*$",
    ))
    .unwrap()
});

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").unwrap());

/// Where the `General` title ends inside the rest of the line.
static TITLE_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.:]").unwrap());

fn grammar(shape: ReferenceShape) -> &'static Regex {
    match shape {
        ReferenceShape::Journal => &JOURNAL_RE,
        ReferenceShape::Chapter => &CHAPTER_RE,
        ReferenceShape::CjkJournal => &CJK_JOURNAL_RE,
        ReferenceShape::General => &GENERAL_RE,
        ReferenceShape::CjkFuzzy => &CJK_FUZZY_RE,
        ReferenceShape::Book => &BOOK_RE,
    }
}

/// Try every grammar in priority order and return the first whole-line match.
pub fn match_shape(line: &str) -> Option<(ReferenceShape, Captures<'_>)> {
    ReferenceShape::ALL
        .into_iter()
        .find_map(|shape| grammar(shape).captures(line).map(|caps| (shape, caps)))
}

/// Text after the year and its closing parenthesis, up to the next period.
fn cjk_fuzzy_title<'a>(line: &'a str, caps: &Captures<'_>) -> &'a str {
    let Some(year) = caps.name("year") else {
        return "";
    };
    line[year.end()..]
        .trim_start_matches(|c: char| c.is_ascii_lowercase())
        .trim_start_matches(')')
        .trim_start_matches(['.', ' '])
        .split('.')
        .next()
        .unwrap_or_default()
        .trim()
}

fn clean_title(title: &str) -> String {
    URL_RE
        .replace_all(title, "")
        .trim_matches(|c: char| c == ' ' || c == '.')
        .to_string()
}

fn optional(caps: &Captures<'_>, name: &str) -> Option<String> {
    caps.name(name)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse one logical line. Returns `None` when no grammar matches.
pub fn parse_reference(line: &str) -> Option<ParsedReference> {
    let line = normalize_reference_text(line.trim());
    let (shape, caps) = match_shape(&line)?;

    let year: u16 = caps["year"].parse().ok()?;
    let title = match shape {
        ReferenceShape::General => {
            let rest = caps.name("rest").map_or("", |m| m.as_str());
            TITLE_END_RE.split(rest).next().unwrap_or_default().to_string()
        }
        ReferenceShape::CjkFuzzy => cjk_fuzzy_title(&line, &caps).to_string(),
        _ => caps.name("title").map_or("", |m| m.as_str()).to_string(),
    };
    let doi = caps
        .name("doi")
        .and_then(|m| validate_doi(m.as_str()))
        .unwrap_or_default();

    let reference = ParsedReference {
        authors: reference_surnames(&caps["authors"]),
        year,
        title: clean_title(&title),
        doi,
        shape,
        journal: optional(&caps, "journal"),
        volume: optional(&caps, "vol"),
        issue: optional(&caps, "issue"),
        pages: optional(&caps, "pages"),
        raw: line.clone(),
    };
    Some(reference)
}

/// Parse every logical line, collecting the ones no grammar recognizes.
pub fn parse_lines<S: AsRef<str>>(lines: &[S]) -> ParseOutput {
    let mut out = ParseOutput::default();
    for line in lines {
        let line = line.as_ref();
        match parse_reference(line) {
            Some(reference) => out.references.push(reference),
            None => {
                tracing::debug!(line, "no reference grammar matched");
                out.failures.push(line.to_string());
            }
        }
    }
    out
}
