use citelink_core::{
    ExtractionReport, InlineCitation, ParseOutput, ParserError, ReferenceParser, SkipStats,
    match_citations,
};

use crate::citations::CitationExtractor;
use crate::config::ParsingConfig;
use crate::merge::{LineMerger, MergeOutcome};
use crate::section::{self, ReferenceBlock};
use crate::{ParsingError, grammar, normalize};

/// A configurable reference and citation extraction pipeline.
///
/// Holds a [`ParsingConfig`] and exposes each pipeline step as a method.
/// The default constructor uses built-in defaults; use
/// [`ReferenceExtractor::with_config`] to supply custom patterns and limits.
pub struct ReferenceExtractor {
    config: ParsingConfig,
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceExtractor {
    /// Create an extractor with default configuration.
    pub fn new() -> Self {
        Self {
            config: ParsingConfig::default(),
        }
    }

    /// Create an extractor with a custom configuration.
    pub fn with_config(config: ParsingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParsingConfig {
        &self.config
    }

    /// Normalize raw document text (step 1).
    pub fn normalize(&self, text: &str) -> String {
        normalize::normalize_document(text)
    }

    /// Locate the reference section (step 2).
    pub fn find_reference_block(&self, text: &str) -> Result<ReferenceBlock, ParsingError> {
        section::find_reference_block(text, &self.config)
    }

    /// Merge the physical lines of a block into logical lines (step 3).
    pub fn merge_lines(&self, block: &str) -> MergeOutcome {
        LineMerger::new(&self.config).merge(block)
    }

    /// Parse logical lines with the grammar chain (step 4).
    pub fn parse_lines(&self, lines: &[String]) -> ParseOutput {
        grammar::parse_lines(lines)
    }

    /// Extract in-text citations from body text (step 5).
    pub fn extract_citations(&self, body: &str) -> Vec<InlineCitation> {
        CitationExtractor::new(&self.config).extract(body)
    }

    /// Merge and parse an already isolated reference block.
    pub fn parse_references(&self, block: &str) -> ParseOutput {
        let merged = self.merge_lines(block);
        self.parse_lines(&merged.lines)
    }

    /// Run the whole pipeline on one document.
    ///
    /// A document without a reference section is not an error: the report
    /// has `block_found == false`, no references, and every citation unmatched.
    pub fn extract(&self, text: &str) -> Result<ExtractionReport, ParsingError> {
        if text.contains('\0') {
            return Err(ParsingError::InvalidInput(
                "text contains NUL bytes; is this a binary file?".to_string(),
            ));
        }

        let text = self.normalize(text);
        let mut report = ExtractionReport::default();

        match self.find_reference_block(&text) {
            Ok(block) => {
                let merged = self.merge_lines(block.entries());
                let parsed = self.parse_lines(&merged.lines);

                report.block_found = true;
                report.stats = SkipStats {
                    page_numbers: merged.stats.page_numbers,
                    section_labels: merged.stats.section_labels,
                    orphan_doi_lines: merged.stats.orphan_doi_lines,
                    unparsed: parsed.failures.len(),
                    total_logical: merged.lines.len(),
                };
                report.references = parsed.references;
                report.unmatched_lines = parsed.failures;
                report.merged_lines = merged.lines;
            }
            Err(ParsingError::NoReferencesSection) => {
                tracing::warn!("no reference section found; citations will be unmatched");
            }
            Err(e) => return Err(e),
        }

        let body = section::citation_body(&text, &self.config);
        report.citations = self.extract_citations(body);
        report.matches = match_citations(&report.citations, &report.references);

        tracing::info!(
            references = report.references.len(),
            citations = report.citations.len(),
            matched = report.matched_count(),
            unparsed = report.stats.unparsed,
            "extraction complete"
        );
        Ok(report)
    }
}

impl ReferenceParser for ReferenceExtractor {
    fn name(&self) -> &str {
        "rule-based"
    }

    fn parse_block(&self, block: &str) -> Result<ParseOutput, ParserError> {
        Ok(self.parse_references(block))
    }
}
