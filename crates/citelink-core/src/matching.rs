use std::cmp::Ordering;
use std::collections::HashMap;

use crate::authors::normalize_first_author;
use crate::{InlineCitation, MatchedCitation, ParsedReference};

/// Strings shorter than this (in characters) never count as similar.
const MIN_SIMILARITY_CHARS: usize = 10;

/// Case-insensitive normalized Indel similarity in `0.0..=1.0`.
///
/// Returns 0 when either side is shorter than ten characters so that short
/// fragments cannot win a tie-break on similarity alone.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    if a.chars().count() < MIN_SIMILARITY_CHARS || b.chars().count() < MIN_SIMILARITY_CHARS {
        return 0.0;
    }
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    rapidfuzz::fuzz::ratio(a.chars(), b.chars())
}

/// Lexicographic score used to pick among same-key candidates:
/// title similarity, then DOI presence, then title length.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CandidateScore {
    similarity: f64,
    has_doi: bool,
    title_len: usize,
}

impl CandidateScore {
    fn of(reference: &ParsedReference, raw_text: &str) -> Self {
        Self {
            similarity: title_similarity(&reference.title, raw_text),
            has_doi: reference.has_doi(),
            title_len: reference.title.chars().count(),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.similarity
            .total_cmp(&other.similarity)
            .then(self.has_doi.cmp(&other.has_doi))
            .then(self.title_len.cmp(&other.title_len))
    }
}

/// References grouped by `(normalized first author, year)`.
pub struct ReferenceIndex<'a> {
    by_key: HashMap<(String, u16), Vec<&'a ParsedReference>>,
}

impl<'a> ReferenceIndex<'a> {
    /// Index every reference that has at least one author. Insertion order
    /// within a key follows the input order.
    pub fn build(references: &'a [ParsedReference]) -> Self {
        let mut by_key: HashMap<(String, u16), Vec<&'a ParsedReference>> = HashMap::new();
        for r in references {
            let Some(first) = r.first_author() else {
                continue;
            };
            let key = (normalize_first_author(first), r.year);
            if key.0.is_empty() {
                continue;
            }
            by_key.entry(key).or_default().push(r);
        }
        Self { by_key }
    }

    pub fn candidates(&self, author: &str, year: u16) -> &[&'a ParsedReference] {
        self.by_key
            .get(&(normalize_first_author(author), year))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The best-scoring candidate for `citation`, or `None` when no reference
    /// shares its key. The first candidate wins exact ties.
    pub fn best_match(&self, citation: &InlineCitation) -> Option<&'a ParsedReference> {
        let year = citation.year_number()?;
        let mut best: Option<(&'a ParsedReference, CandidateScore)> = None;
        for &candidate in self.candidates(&citation.author, year) {
            let score = CandidateScore::of(candidate, &citation.raw_text);
            match &best {
                Some((_, top)) if score.compare(top) != Ordering::Greater => {}
                _ => best = Some((candidate, score)),
            }
        }
        best.map(|(r, _)| r)
    }

    pub fn len(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Join every citation to its best reference, preserving citation order.
/// Unmatched citations carry empty `title`, `doi` and `reference_raw`.
pub fn match_citations(
    citations: &[InlineCitation],
    references: &[ParsedReference],
) -> Vec<MatchedCitation> {
    let index = ReferenceIndex::build(references);
    citations
        .iter()
        .map(|c| match index.best_match(c) {
            Some(r) => {
                tracing::debug!(citation = %c.raw_text, reference = %r.raw, "matched citation");
                MatchedCitation::with_reference(c, r)
            }
            None => MatchedCitation::unmatched(c),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReferenceShape;

    fn reference(authors: &[&str], year: u16, title: &str, doi: &str) -> ParsedReference {
        ParsedReference {
            authors: authors.iter().map(|s| s.to_string()).collect(),
            year,
            title: title.into(),
            doi: doi.into(),
            raw: format!("{} ({}). {}.", authors.join(", "), year, title),
            shape: ReferenceShape::General,
            journal: None,
            volume: None,
            issue: None,
            pages: None,
        }
    }

    fn citation(raw: &str, author: &str, year: &str) -> InlineCitation {
        InlineCitation {
            raw_text: raw.into(),
            author: author.into(),
            year: year.into(),
        }
    }

    #[test]
    fn test_similarity_short_strings_are_zero() {
        assert_eq!(title_similarity("short", "short"), 0.0);
        assert_eq!(title_similarity("a long enough title", "tiny"), 0.0);
        assert!(title_similarity("Learning to Parse", "learning to parse") > 0.99);
    }

    #[test]
    fn test_no_candidates_gives_empty_fields() {
        let refs = vec![reference(&["smith"], 2020, "Something", "")];
        let out = match_citations(&[citation("Jones (2020)", "Jones", "2020")], &refs);
        assert_eq!(out.len(), 1);
        assert!(out[0].title.is_empty());
        assert!(out[0].doi.is_empty());
        assert!(out[0].reference_raw.is_empty());
    }

    #[test]
    fn test_year_must_match() {
        let refs = vec![reference(&["smith"], 2019, "Something", "")];
        let out = match_citations(&[citation("Smith (2020)", "Smith", "2020")], &refs);
        assert!(!out[0].is_matched());
    }

    #[test]
    fn test_picks_higher_similarity_candidate() {
        let refs = vec![
            reference(&["smith"], 2020, "Unrelated Work on Fish Migration", "10.1/a"),
            reference(&["smith"], 2020, "Deep Parsing of Reference Lists", ""),
        ];
        let c = citation(
            "Smith (2020) Deep Parsing of Reference Lists",
            "Smith",
            "2020",
        );
        let out = match_citations(&[c], &refs);
        assert_eq!(out[0].title, "Deep Parsing of Reference Lists");
    }

    #[test]
    fn test_doi_breaks_similarity_tie() {
        let refs = vec![
            reference(&["smith"], 2020, "Alpha", ""),
            reference(&["smith"], 2020, "Beta", "10.5555/b"),
        ];
        let out = match_citations(&[citation("Smith (2020)", "Smith", "2020")], &refs);
        assert_eq!(out[0].doi, "10.5555/b");
    }

    #[test]
    fn test_title_length_then_first_wins() {
        let refs = vec![
            reference(&["smith"], 2020, "Short", ""),
            reference(&["smith"], 2020, "Longer one", ""),
            reference(&["smith"], 2020, "Longer two", ""),
        ];
        // Raw text under ten characters forces every similarity to zero.
        let out = match_citations(&[citation("Sm (2020)", "Smith", "2020")], &refs);
        assert_eq!(out[0].title, "Longer one", "first of equal scores must win");
    }

    #[test]
    fn test_year_suffix_and_multi_author_citation() {
        let refs = vec![reference(&["lee", "chen"], 2019, "Learning to Parse", "10.9999/xyz")];
        let cites = [citation("Lee and Chen (2019a)", "Lee & Chen", "2019a")];
        let out = match_citations(&cites, &refs);
        assert_eq!(out[0].doi, "10.9999/xyz");
    }

    #[test]
    fn test_cjk_key() {
        let refs = vec![reference(&["林"], 2005, "服務品質之研究", "")];
        let out = match_citations(&[citation("林俊宏（2005）", "林俊宏", "2005")], &refs);
        assert!(out[0].is_matched());
    }

    #[test]
    fn test_index_skips_authorless_references() {
        let refs = vec![
            reference(&[], 2020, "Anonymous", ""),
            reference(&["smith"], 2020, "Named", ""),
        ];
        let index = ReferenceIndex::build(&refs);
        assert_eq!(index.len(), 1);
    }
}
