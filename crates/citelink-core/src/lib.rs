use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod authors;
pub mod config_file;
pub mod matching;
pub mod verify;

pub use matching::{ReferenceIndex, match_citations, title_similarity};
pub use verify::{
    FallbackParser, ParseOutput, ParserError, ReferenceParser, VerificationRecord,
    VerificationRequest, VerifiedRow, Verifier, VerifyError, verify_matches,
};

/// Which grammar variant recognized a reference line.
///
/// Variants are declared in the order the parser tries them; the first one
/// whose pattern matches the whole line wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceShape {
    /// `Authors (Year). Title. Journal, Vol(Issue), pages. DOI`
    Journal,
    /// Edited-book chapter: `... In Editors (Eds.), Book (Vol. n, pp. a-b).`
    Chapter,
    /// CJK journal entry with CJK authors and full-width punctuation folded.
    CjkJournal,
    /// `Authors (Year). Rest...` where the title is the first sentence of the rest.
    General,
    /// CJK authors, a year somewhere, and a trailing DOI.
    CjkFuzzy,
    /// Book ending in a "... Press." publisher.
    Book,
}

impl ReferenceShape {
    /// All shapes in parser priority order.
    pub const ALL: [ReferenceShape; 6] = [
        Self::Journal,
        Self::Chapter,
        Self::CjkJournal,
        Self::General,
        Self::CjkFuzzy,
        Self::Book,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Journal => "journal",
            Self::Chapter => "chapter",
            Self::CjkJournal => "cjk_journal",
            Self::General => "general",
            Self::CjkFuzzy => "cjk_fuzzy",
            Self::Book => "book",
        }
    }
}

impl std::fmt::Display for ReferenceShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bibliographic entry parsed from one logical reference line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReference {
    /// Lower-cased surnames (Latin) or single family-name characters (CJK).
    pub authors: Vec<String>,
    pub year: u16,
    pub title: String,
    /// Bare DOI (`10.xxxx/...`), empty when the entry carries none.
    pub doi: String,
    /// The logical line this entry was parsed from.
    pub raw: String,
    pub shape: ReferenceShape,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
}

impl ParsedReference {
    pub fn has_doi(&self) -> bool {
        !self.doi.is_empty()
    }

    pub fn first_author(&self) -> Option<&str> {
        self.authors.first().map(String::as_str)
    }
}

/// An in-text citation marker such as `Smith et al. (2019)` or `王等人（2020）`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineCitation {
    /// The exact matched span of body text.
    pub raw_text: String,
    /// Cleaned author string (connectives folded to `&`, `et al.` removed).
    pub author: String,
    /// Four digits plus an optional disambiguation letter (`2019a`).
    pub year: String,
}

impl InlineCitation {
    /// The numeric part of the year, if it parses.
    pub fn year_number(&self) -> Option<u16> {
        self.year.get(..4).and_then(|y| y.parse().ok())
    }

    /// Deduplication key: `(author.lower(), year)`.
    pub fn key(&self) -> (String, String) {
        (self.author.to_lowercase(), self.year.clone())
    }
}

/// An in-text citation joined to its best-matching reference.
///
/// `title`, `doi` and `reference_raw` are empty when no reference matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedCitation {
    pub raw_text: String,
    pub author: String,
    pub year: String,
    pub title: String,
    pub doi: String,
    pub reference_raw: String,
}

impl MatchedCitation {
    pub fn unmatched(citation: &InlineCitation) -> Self {
        Self {
            raw_text: citation.raw_text.clone(),
            author: citation.author.clone(),
            year: citation.year.clone(),
            title: String::new(),
            doi: String::new(),
            reference_raw: String::new(),
        }
    }

    pub fn with_reference(citation: &InlineCitation, reference: &ParsedReference) -> Self {
        Self {
            raw_text: citation.raw_text.clone(),
            author: citation.author.clone(),
            year: citation.year.clone(),
            title: reference.title.clone(),
            doi: reference.doi.clone(),
            reference_raw: reference.raw.clone(),
        }
    }

    pub fn is_matched(&self) -> bool {
        !self.reference_raw.is_empty()
    }
}

/// Counters for lines dropped or left unparsed while building the reference list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipStats {
    pub page_numbers: usize,
    pub section_labels: usize,
    pub orphan_doi_lines: usize,
    pub unparsed: usize,
    pub total_logical: usize,
}

/// Everything extracted from one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionReport {
    /// Whether a reference-section heading was found at all.
    pub block_found: bool,
    pub references: Vec<ParsedReference>,
    pub citations: Vec<InlineCitation>,
    pub matches: Vec<MatchedCitation>,
    /// Logical lines that no grammar variant recognized.
    pub unmatched_lines: Vec<String>,
    /// Logical lines produced by the merger, in order.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub merged_lines: Vec<String>,
    pub stats: SkipStats,
}

impl ExtractionReport {
    pub fn matched_count(&self) -> usize {
        self.matches.iter().filter(|m| m.is_matched()).count()
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
