use once_cell::sync::Lazy;
use regex::Regex;

use crate::ParsingError;
use crate::config::ParsingConfig;

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:references?|bibliography|works[ \t]+cited|參考文獻|参考文献|參考資料|参考资料|參考來源)[ \t]*[:：]?[ \t\r]*$",
    )
    .unwrap()
});

/// The reference section of a document, starting at its heading line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceBlock {
    /// Block text, heading line included.
    pub text: String,
    /// Byte offset within `text` where the entries begin (end of the heading).
    pub entries_start: usize,
    /// Byte offset of the block within the source document.
    pub offset: usize,
}

impl ReferenceBlock {
    /// The heading line as it appeared in the document.
    pub fn heading(&self) -> &str {
        self.text[..self.entries_start].trim()
    }

    /// The entry text after the heading.
    pub fn entries(&self) -> &str {
        &self.text[self.entries_start..]
    }
}

fn header_re(config: &ParsingConfig) -> &Regex {
    config.section_header_re.as_ref().unwrap_or(&HEADER_RE)
}

/// Byte index of the `n`th char boundary, or the text length.
fn char_boundary(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len())
}

/// Locate the reference section.
///
/// Uses the LAST heading match: tables of contents and running headers
/// often mention "References" well before the real list. The block extends
/// to the configured end marker, to the configured length cap, or to the
/// end of the document, whichever comes first.
pub fn find_reference_block(
    text: &str,
    config: &ParsingConfig,
) -> Result<ReferenceBlock, ParsingError> {
    let heading = header_re(config)
        .find_iter(text)
        .last()
        .ok_or(ParsingError::NoReferencesSection)?;

    let start = heading.start();
    let rest = &text[heading.end()..];
    let mut end = match config.section_end_re.as_ref().and_then(|re| re.find(rest)) {
        Some(m) => heading.end() + m.start(),
        None => text.len(),
    };
    if let Some(max) = config.max_block_chars {
        end = end.min(start + char_boundary(&text[start..], max));
    }

    tracing::debug!(
        heading = heading.as_str().trim(),
        offset = start,
        len = end - start,
        "found reference block"
    );

    Ok(ReferenceBlock {
        text: text[start..end].to_string(),
        entries_start: (heading.end() - start).min(end - start),
        offset: start,
    })
}

/// The part of the document that precedes the reference section, where
/// in-text citations are searched. The whole text when no heading exists.
pub fn citation_body<'a>(text: &'a str, config: &ParsingConfig) -> &'a str {
    match header_re(config).find_iter(text).last() {
        Some(m) => &text[..m.start()],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParsingConfigBuilder;

    const DOC: &str = "Intro\nSee References below.\nReferences\nToC entry\n\nBody text Smith (2020).\n\nReferences\nSmith, J. (2020). A title.\nDoe, A. (2019). Another.\n";

    #[test]
    fn test_last_heading_wins() {
        let block = find_reference_block(DOC, &ParsingConfig::default()).unwrap();
        assert_eq!(block.heading(), "References");
        assert!(block.entries().trim_start().starts_with("Smith, J. (2020)"));
        assert!(!block.text.contains("Body text"));
    }

    #[test]
    fn test_inline_mentions_are_not_headings() {
        let doc = "As the references show, it works.\nNo list here.";
        assert!(matches!(
            find_reference_block(doc, &ParsingConfig::default()),
            Err(ParsingError::NoReferencesSection)
        ));
    }

    #[test]
    fn test_cjk_heading_with_colon() {
        let doc = "正文內容\n參考文獻：\n王小明（2020）。研究。\n";
        let block = find_reference_block(doc, &ParsingConfig::default()).unwrap();
        assert!(block.entries().contains("王小明"));
    }

    #[test]
    fn test_isolation_is_idempotent() {
        let config = ParsingConfig::default();
        let once = find_reference_block(DOC, &config).unwrap();
        let twice = find_reference_block(&once.text, &config).unwrap();
        assert_eq!(once.text, twice.text);
        assert_eq!(once.entries(), twice.entries());
    }

    #[test]
    fn test_end_marker_and_cap() {
        let doc = "References\nA (2020). X.\nAppendix A\nProofs\n";
        let config = ParsingConfigBuilder::new()
            .section_end_regex(r"(?m)^Appendix\b")
            .build()
            .unwrap();
        let block = find_reference_block(doc, &config).unwrap();
        assert!(!block.text.contains("Appendix"));
        let again = find_reference_block(&block.text, &config).unwrap();
        assert_eq!(again.text, block.text);

        let capped = ParsingConfigBuilder::new().max_block_chars(14).build().unwrap();
        let block = find_reference_block(doc, &capped).unwrap();
        assert_eq!(block.text.chars().count(), 14);
        let again = find_reference_block(&block.text, &capped).unwrap();
        assert_eq!(again.text, block.text);
    }

    #[test]
    fn test_citation_body_stops_at_last_heading() {
        let body = citation_body(DOC, &ParsingConfig::default());
        assert!(body.contains("Body text Smith (2020)."));
        assert!(!body.contains("A title"));
        assert_eq!(citation_body("no heading", &ParsingConfig::default()), "no heading");
    }
}
