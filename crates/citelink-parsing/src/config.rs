use citelink_core::config_file::ParsingSection;
use regex::Regex;

/// Stray labels dropped by the line merger when they stand alone on a line.
pub const DEFAULT_SECTION_LABELS: &[&str] = &[
    "參考資料",
    "参考资料",
    "參考文獻",
    "参考文献",
    "中文文獻",
    "中文文献",
    "英文文獻",
    "英文文献",
    "References",
    "REFERENCES",
    "Bibliography",
];

/// Substrings that mark a line as the continuation of the entry before it.
pub const DEFAULT_CONTINUATION_MARKERS: &[&str] = &["Science,"];

/// Capitalized sentence openers that are never part of a cited author name.
pub const DEFAULT_CITATION_LEAD_WORDS: &[&str] = &[
    "According", "Also", "Although", "As", "Based", "Because", "Both", "By", "Following",
    "For", "From", "Furthermore", "Here", "However", "In", "Indeed", "It", "Like", "Moreover",
    "Our", "Previously", "Recently", "See", "Similarly", "Since", "The", "Then", "Therefore",
    "These", "This", "Thus", "Unlike", "We", "When", "While", "With",
];

/// Controls how a list of patterns/values is overridden from its defaults.
#[derive(Debug, Clone, Default)]
pub enum ListOverride<T> {
    /// Use the built-in defaults.
    #[default]
    Default,
    /// Completely replace the defaults with these values.
    Replace(Vec<T>),
    /// Append these values to the defaults.
    Extend(Vec<T>),
}

impl<T: Clone> ListOverride<T> {
    /// Resolve this override against the given defaults.
    pub fn resolve(&self, defaults: &[T]) -> Vec<T> {
        match self {
            ListOverride::Default => defaults.to_vec(),
            ListOverride::Replace(v) => v.clone(),
            ListOverride::Extend(v) => {
                let mut result = defaults.to_vec();
                result.extend(v.iter().cloned());
                result
            }
        }
    }
}

fn resolve_strings(list: &ListOverride<String>, defaults: &[&str]) -> Vec<String> {
    let defaults: Vec<String> = defaults.iter().map(|s| s.to_string()).collect();
    list.resolve(&defaults)
}

/// Configuration for the reference parsing pipeline.
///
/// Regex fields are `Option<Regex>`; `None` means "use the built-in default".
/// Use [`ParsingConfigBuilder`] to construct with string patterns.
#[derive(Debug, Clone)]
pub struct ParsingConfig {
    // ── section.rs ──
    /// Whole-line heading that opens the reference block. The last match wins.
    pub(crate) section_header_re: Option<Regex>,
    /// Optional end marker (e.g. `Appendix`). `None` runs to the document end.
    pub(crate) section_end_re: Option<Regex>,
    /// Optional cap on the block length in characters.
    pub(crate) max_block_chars: Option<usize>,

    // ── merge.rs ──
    pub(crate) section_labels: ListOverride<String>,
    pub(crate) continuation_markers: ListOverride<String>,
    /// Upper bound on post-pass iterations before giving up on a fixpoint.
    pub(crate) max_merge_passes: usize,

    // ── citations.rs ──
    pub(crate) citation_lead_words: ListOverride<String>,
    /// Western citation candidates with more words than this are rejected.
    pub(crate) max_author_words: usize,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            section_header_re: None,
            section_end_re: None,
            max_block_chars: None,
            section_labels: ListOverride::Default,
            continuation_markers: ListOverride::Default,
            max_merge_passes: 8,
            citation_lead_words: ListOverride::Default,
            max_author_words: 8,
        }
    }
}

impl ParsingConfig {
    pub fn section_labels(&self) -> Vec<String> {
        resolve_strings(&self.section_labels, DEFAULT_SECTION_LABELS)
    }

    pub fn continuation_markers(&self) -> Vec<String> {
        resolve_strings(&self.continuation_markers, DEFAULT_CONTINUATION_MARKERS)
    }

    pub fn citation_lead_words(&self) -> Vec<String> {
        resolve_strings(&self.citation_lead_words, DEFAULT_CITATION_LEAD_WORDS)
    }

    pub fn max_merge_passes(&self) -> usize {
        self.max_merge_passes
    }

    pub fn max_author_words(&self) -> usize {
        self.max_author_words
    }

    pub fn max_block_chars(&self) -> Option<usize> {
        self.max_block_chars
    }
}

/// Builder for [`ParsingConfig`].
///
/// Accepts string patterns that are compiled to `Regex` in [`build()`](Self::build).
/// Fails fast with `regex::Error` if any pattern is invalid.
#[derive(Debug, Clone, Default)]
pub struct ParsingConfigBuilder {
    section_header_re: Option<String>,
    section_end_re: Option<String>,
    max_block_chars: Option<usize>,
    section_labels: ListOverride<String>,
    continuation_markers: ListOverride<String>,
    max_merge_passes: Option<usize>,
    citation_lead_words: ListOverride<String>,
    max_author_words: Option<usize>,
}

fn push_extend(list: &mut ListOverride<String>, value: String) {
    match list {
        ListOverride::Extend(v) | ListOverride::Replace(v) => v.push(value),
        ListOverride::Default => *list = ListOverride::Extend(vec![value]),
    }
}

impl ParsingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a builder from the `[parsing]` table of a config file.
    /// A replacing list wins over an extending one when both are present.
    pub fn from_section(section: &ParsingSection) -> Self {
        let list = |replace: &Option<Vec<String>>, extend: &Option<Vec<String>>| {
            match (replace, extend) {
                (Some(r), _) => ListOverride::Replace(r.clone()),
                (None, Some(e)) => ListOverride::Extend(e.clone()),
                (None, None) => ListOverride::Default,
            }
        };
        Self {
            section_header_re: section.section_header_regex.clone(),
            section_end_re: section.section_end_regex.clone(),
            max_block_chars: section.max_block_chars,
            section_labels: list(&section.section_labels, &section.extra_section_labels),
            continuation_markers: list(
                &section.continuation_markers,
                &section.extra_continuation_markers,
            ),
            max_merge_passes: section.max_merge_passes,
            citation_lead_words: list(
                &section.citation_lead_words,
                &section.extra_citation_lead_words,
            ),
            max_author_words: section.max_author_words,
        }
    }

    // ── Section header / end ──

    pub fn section_header_regex(mut self, pattern: &str) -> Self {
        self.section_header_re = Some(pattern.to_string());
        self
    }

    pub fn section_end_regex(mut self, pattern: &str) -> Self {
        self.section_end_re = Some(pattern.to_string());
        self
    }

    pub fn max_block_chars(mut self, n: usize) -> Self {
        self.max_block_chars = Some(n);
        self
    }

    // ── Merger lists ──

    pub fn set_section_labels(mut self, labels: Vec<String>) -> Self {
        self.section_labels = ListOverride::Replace(labels);
        self
    }

    pub fn add_section_label(mut self, label: String) -> Self {
        push_extend(&mut self.section_labels, label);
        self
    }

    pub fn set_continuation_markers(mut self, markers: Vec<String>) -> Self {
        self.continuation_markers = ListOverride::Replace(markers);
        self
    }

    pub fn add_continuation_marker(mut self, marker: String) -> Self {
        push_extend(&mut self.continuation_markers, marker);
        self
    }

    // ── Citation extractor ──

    pub fn set_citation_lead_words(mut self, words: Vec<String>) -> Self {
        self.citation_lead_words = ListOverride::Replace(words);
        self
    }

    pub fn add_citation_lead_word(mut self, word: String) -> Self {
        push_extend(&mut self.citation_lead_words, word);
        self
    }

    // ── Scalars ──

    pub fn max_merge_passes(mut self, n: usize) -> Self {
        self.max_merge_passes = Some(n);
        self
    }

    pub fn max_author_words(mut self, n: usize) -> Self {
        self.max_author_words = Some(n);
        self
    }

    /// Compile all string patterns into regexes and produce a [`ParsingConfig`].
    pub fn build(self) -> Result<ParsingConfig, regex::Error> {
        let compile = |opt: Option<String>| -> Result<Option<Regex>, regex::Error> {
            opt.map(|p| Regex::new(&p)).transpose()
        };

        let defaults = ParsingConfig::default();
        Ok(ParsingConfig {
            section_header_re: compile(self.section_header_re)?,
            section_end_re: compile(self.section_end_re)?,
            max_block_chars: self.max_block_chars,
            section_labels: self.section_labels,
            continuation_markers: self.continuation_markers,
            max_merge_passes: self
                .max_merge_passes
                .unwrap_or(defaults.max_merge_passes)
                .max(1),
            citation_lead_words: self.citation_lead_words,
            max_author_words: self.max_author_words.unwrap_or(defaults.max_author_words),
        })
    }
}
