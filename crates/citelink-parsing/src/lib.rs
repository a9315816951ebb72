use thiserror::Error;

pub mod citations;
pub mod config;
pub mod extractor;
pub mod grammar;
pub mod identifiers;
pub mod merge;
pub mod normalize;
pub mod section;

pub use citations::{CitationExtractor, ClaimSet, extract_citations};
pub use config::{ListOverride, ParsingConfig, ParsingConfigBuilder};
pub use extractor::ReferenceExtractor;
pub use merge::{LineMerger, MergeOutcome, MergeStats, dump_lines};
pub use section::ReferenceBlock;
// Re-export domain types from core (canonical definitions live there)
pub use citelink_core::{
    ExtractionReport, InlineCitation, MatchedCitation, ParseOutput, ParsedReference,
    ReferenceShape, SkipStats,
};

#[derive(Error, Debug)]
pub enum ParsingError {
    #[error("no references section found")]
    NoReferencesSection,
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Run the full pipeline on one document with the default configuration.
///
/// Pipeline:
/// 1. Normalize the text (NFKC, quotes, non-breaking spaces)
/// 2. Locate the last reference-section heading and isolate the block
/// 3. Merge wrapped lines into one logical line per entry
/// 4. Parse each logical line with the ordered grammar chain
/// 5. Extract in-text citations from the text before the heading
/// 6. Match citations to references by first author and year
pub fn extract_report(text: &str) -> Result<ExtractionReport, ParsingError> {
    ReferenceExtractor::new().extract(text)
}
