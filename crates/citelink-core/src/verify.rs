//! Collaborator seams around the deterministic pipeline.
//!
//! The core never talks to a network service itself. A [`Verifier`] looks a
//! matched reference up in a bibliographic registry, and a [`ReferenceParser`]
//! turns a reference block into entries. The rule-based extractor is one
//! `ReferenceParser`; a model-backed parser can be another, combined through
//! [`FallbackParser`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{MatchedCitation, ParsedReference};

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("verification service unavailable: {0}")]
    Unavailable(String),
    #[error("verification request rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("parser backend failed: {0}")]
    Backend(String),
    #[error("parser returned malformed output: {0}")]
    Malformed(String),
}

/// What the verifier is asked to confirm for one reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    /// First author surname, or `"?"` when the reference has none.
    pub author: String,
    pub year: u16,
    pub title: String,
    pub doi: String,
}

impl VerificationRequest {
    pub fn from_reference(reference: &ParsedReference) -> Self {
        Self {
            author: reference
                .first_author()
                .map(str::to_string)
                .unwrap_or_else(|| "?".to_string()),
            year: reference.year,
            title: reference.title.clone(),
            doi: reference.doi.clone(),
        }
    }
}

/// What the verifier found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// `1` when the registry holds a matching record, otherwise `0`.
    pub found: u8,
    pub cr_title: String,
    pub cr_doi: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_url: Option<String>,
}

impl VerificationRecord {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn is_found(&self) -> bool {
        self.found != 0
    }
}

/// A matched citation merged with the verifier's answer, one output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedRow {
    #[serde(flatten)]
    pub citation: MatchedCitation,
    #[serde(flatten)]
    pub record: VerificationRecord,
}

impl VerifiedRow {
    pub fn merge(citation: MatchedCitation, record: VerificationRecord) -> Self {
        Self { citation, record }
    }
}

/// Trait for bibliographic registry lookups (Crossref or similar).
pub trait Verifier: Send + Sync {
    fn name(&self) -> &str;

    fn verify(&self, request: &VerificationRequest) -> Result<VerificationRecord, VerifyError>;
}

/// Verify each matched citation against the reference it was joined to.
///
/// Unmatched citations are not sent to the verifier. Verifier errors are
/// logged and recorded as not-found so one failing lookup never aborts a batch.
pub fn verify_matches(
    matches: &[MatchedCitation],
    references: &[ParsedReference],
    verifier: &dyn Verifier,
) -> Vec<VerifiedRow> {
    matches
        .iter()
        .map(|m| {
            let reference = references.iter().find(|r| r.raw == m.reference_raw);
            let record = match reference {
                Some(r) if m.is_matched() => {
                    let request = VerificationRequest::from_reference(r);
                    verifier.verify(&request).unwrap_or_else(|e| {
                        tracing::warn!(
                            verifier = verifier.name(),
                            citation = %m.raw_text,
                            error = %e,
                            "verification failed"
                        );
                        VerificationRecord::not_found()
                    })
                }
                _ => VerificationRecord::not_found(),
            };
            VerifiedRow::merge(m.clone(), record)
        })
        .collect()
}

/// Entries produced by a [`ReferenceParser`], plus the lines it could not parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOutput {
    pub references: Vec<ParsedReference>,
    pub failures: Vec<String>,
}

/// Trait for anything that can turn a reference block into entries.
pub trait ReferenceParser: Send + Sync {
    fn name(&self) -> &str;

    fn parse_block(&self, block: &str) -> Result<ParseOutput, ParserError>;
}

/// Runs `secondary` only when `primary` errors or yields no references.
pub struct FallbackParser<P, S> {
    primary: P,
    secondary: S,
}

impl<P: ReferenceParser, S: ReferenceParser> FallbackParser<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: ReferenceParser, S: ReferenceParser> ReferenceParser for FallbackParser<P, S> {
    fn name(&self) -> &str {
        self.primary.name()
    }

    fn parse_block(&self, block: &str) -> Result<ParseOutput, ParserError> {
        match self.primary.parse_block(block) {
            Ok(out) if !out.references.is_empty() => Ok(out),
            Ok(_) => {
                tracing::info!(
                    primary = self.primary.name(),
                    secondary = self.secondary.name(),
                    "primary parser found no references, falling back"
                );
                self.secondary.parse_block(block)
            }
            Err(e) => {
                tracing::warn!(
                    primary = self.primary.name(),
                    error = %e,
                    "primary parser failed, falling back"
                );
                self.secondary.parse_block(block)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// A hand-rolled parser returning a fixed result and counting calls.
    pub struct MockParser {
        pub name: &'static str,
        pub result: Result<ParseOutput, String>,
        pub calls: AtomicUsize,
    }

    impl MockParser {
        pub fn new(name: &'static str, result: Result<ParseOutput, String>) -> Self {
            Self {
                name,
                result,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ReferenceParser for &MockParser {
        fn name(&self) -> &str {
            self.name
        }

        fn parse_block(&self, _block: &str) -> Result<ParseOutput, ParserError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(ParserError::Backend)
        }
    }

    /// A verifier that recognizes exactly one DOI.
    pub struct MockVerifier {
        pub known_doi: &'static str,
    }

    impl Verifier for MockVerifier {
        fn name(&self) -> &str {
            "mock"
        }

        fn verify(&self, request: &VerificationRequest) -> Result<VerificationRecord, VerifyError> {
            if request.doi.is_empty() {
                return Err(VerifyError::Rejected("no DOI".into()));
            }
            if request.doi == self.known_doi {
                Ok(VerificationRecord {
                    found: 1,
                    cr_title: request.title.clone(),
                    cr_doi: request.doi.clone(),
                    verification_url: Some(format!("https://doi.org/{}", request.doi)),
                })
            } else {
                Ok(VerificationRecord::not_found())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockParser, MockVerifier};
    use super::*;
    use crate::{InlineCitation, ReferenceShape};

    fn reference(doi: &str) -> ParsedReference {
        ParsedReference {
            authors: vec!["lee".into(), "chen".into()],
            year: 2019,
            title: "Learning to Parse".into(),
            doi: doi.into(),
            raw: format!("Lee, K., & Chen, Y. (2019). Learning to Parse. {doi}"),
            shape: ReferenceShape::Journal,
            journal: None,
            volume: None,
            issue: None,
            pages: None,
        }
    }

    fn output(n: usize) -> ParseOutput {
        ParseOutput {
            references: (0..n).map(|_| reference("10.9999/xyz")).collect(),
            failures: vec![],
        }
    }

    #[test]
    fn test_request_placeholder_author() {
        let mut r = reference("");
        r.authors.clear();
        let req = VerificationRequest::from_reference(&r);
        assert_eq!(req.author, "?");
        assert_eq!(req.year, 2019);
    }

    #[test]
    fn test_fallback_not_used_when_primary_succeeds() {
        let primary = MockParser::new("rules", Ok(output(2)));
        let secondary = MockParser::new("model", Ok(output(5)));
        let parser = FallbackParser::new(&primary, &secondary);
        let out = parser.parse_block("block").unwrap();
        assert_eq!(out.references.len(), 2);
        assert_eq!(secondary.call_count(), 0);
    }

    #[test]
    fn test_fallback_used_on_empty_or_error() {
        let empty = MockParser::new("rules", Ok(output(0)));
        let secondary = MockParser::new("model", Ok(output(3)));
        let out = FallbackParser::new(&empty, &secondary)
            .parse_block("block")
            .unwrap();
        assert_eq!(out.references.len(), 3);

        let failing = MockParser::new("rules", Err("boom".into()));
        let out = FallbackParser::new(&failing, &secondary)
            .parse_block("block")
            .unwrap();
        assert_eq!(out.references.len(), 3);
        assert_eq!(secondary.call_count(), 2);
    }

    #[test]
    fn test_verify_matches_merges_rows() {
        let refs = vec![reference("10.9999/xyz")];
        let citation = InlineCitation {
            raw_text: "Lee and Chen (2019)".into(),
            author: "Lee & Chen".into(),
            year: "2019".into(),
        };
        let unmatched = InlineCitation {
            raw_text: "Nobody (2001)".into(),
            author: "Nobody".into(),
            year: "2001".into(),
        };
        let matches = vec![
            MatchedCitation::with_reference(&citation, &refs[0]),
            MatchedCitation::unmatched(&unmatched),
        ];
        let rows = verify_matches(&matches, &refs, &MockVerifier { known_doi: "10.9999/xyz" });
        assert_eq!(rows.len(), 2);
        assert!(rows[0].record.is_found());
        assert_eq!(rows[0].record.cr_doi, "10.9999/xyz");
        assert!(!rows[1].record.is_found());

        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["found"], 1);
        assert_eq!(json["raw_text"], "Lee and Chen (2019)");
    }

    #[test]
    fn test_verifier_error_becomes_not_found() {
        let refs = vec![reference("")];
        let citation = InlineCitation {
            raw_text: "Lee (2019)".into(),
            author: "Lee".into(),
            year: "2019".into(),
        };
        let matches = vec![MatchedCitation::with_reference(&citation, &refs[0])];
        let rows = verify_matches(&matches, &refs, &MockVerifier { known_doi: "10.1/x" });
        assert_eq!(rows[0].record, VerificationRecord::not_found());
    }
}
