use std::io::Write;

use citelink_core::{ExtractionReport, InlineCitation, MatchedCitation, ParsedReference, SkipStats};
use clap::ValueEnum;
use owo_colors::OwoColorize;
use serde::Serialize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    /// Parse the `format` value of the `[output]` config table.
    pub fn from_config(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value.trim(), true).ok()
    }
}

/// One document's report, tagged with its file name for JSON output.
#[derive(Debug, Serialize)]
pub struct FileReport<'a> {
    pub file: &'a str,
    #[serde(flatten)]
    pub report: &'a ExtractionReport,
}

pub fn write_json<T: Serialize + ?Sized>(w: &mut dyn Write, value: &T) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut *w, value)?;
    writeln!(w)
}

fn heading(w: &mut dyn Write, text: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", text.bold().cyan())
    } else {
        writeln!(w, "{}", text)
    }
}

fn dim_line(w: &mut dyn Write, text: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", text.dimmed())
    } else {
        writeln!(w, "{}", text)
    }
}

/// Print the per-document header with reference and citation counts.
pub fn print_report_header(
    w: &mut dyn Write,
    file_name: &str,
    report: &ExtractionReport,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, &format!("== {} ==", file_name), color)?;

    if !report.block_found {
        let msg = "No references section found; every citation is unmatched";
        if color.enabled() {
            writeln!(w, "{}", msg.yellow())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    }

    writeln!(
        w,
        "Found {} references and {} in-text citations ({} matched)",
        report.references.len(),
        report.citations.len(),
        report.matched_count()
    )?;
    print_skip_stats(w, &report.stats, color)?;
    writeln!(w)?;
    Ok(())
}

fn print_skip_stats(w: &mut dyn Write, stats: &SkipStats, color: ColorMode) -> std::io::Result<()> {
    let dropped = stats.page_numbers + stats.section_labels + stats.orphan_doi_lines;
    if dropped > 0 {
        let msg = format!(
            "(Dropped {} page numbers, {} section labels, {} orphan DOI lines)",
            stats.page_numbers, stats.section_labels, stats.orphan_doi_lines
        );
        dim_line(w, &msg, color)?;
    }
    if stats.unparsed > 0 {
        let msg = format!(
            "({} of {} logical lines matched no reference pattern)",
            stats.unparsed, stats.total_logical
        );
        dim_line(w, &msg, color)?;
    }
    Ok(())
}

/// Print parsed references as numbered blocks.
pub fn print_references(
    w: &mut dyn Write,
    references: &[ParsedReference],
    color: ColorMode,
) -> std::io::Result<()> {
    for (i, r) in references.iter().enumerate() {
        if color.enabled() {
            writeln!(w, "{}", format!("[{}]", i + 1).bold().yellow())?;
        } else {
            writeln!(w, "[{}]", i + 1)?;
        }

        writeln!(w, "  Title:   {}", r.title)?;
        writeln!(
            w,
            "  Authors: {}",
            if r.authors.is_empty() {
                "(none)".to_string()
            } else {
                r.authors.join("; ")
            }
        )?;
        writeln!(w, "  Year:    {}", r.year)?;
        if let Some(ref journal) = r.journal {
            writeln!(w, "  Source:  {}", journal)?;
        }
        if r.has_doi() {
            writeln!(w, "  DOI:     {}", r.doi)?;
        }
        writeln!(w, "  Shape:   {}", r.shape)?;

        let raw = truncate(&r.raw, 200);
        if color.enabled() {
            writeln!(w, "  Raw:     {}", raw.dimmed())?;
        } else {
            writeln!(w, "  Raw:     {}", raw)?;
        }
    }
    Ok(())
}

/// Print extracted citations, one per line, in `(author, year)` order.
pub fn print_citations(
    w: &mut dyn Write,
    citations: &[InlineCitation],
    color: ColorMode,
) -> std::io::Result<()> {
    for c in citations {
        if color.enabled() {
            writeln!(w, "  {} ({})  {}", c.author.bold(), c.year, c.raw_text.dimmed())?;
        } else {
            writeln!(w, "  {} ({})  {}", c.author, c.year, c.raw_text)?;
        }
    }
    Ok(())
}

/// Print each citation with the reference it was matched to.
pub fn print_matches(
    w: &mut dyn Write,
    matches: &[MatchedCitation],
    color: ColorMode,
) -> std::io::Result<()> {
    if matches.is_empty() {
        return dim_line(w, "No in-text citations found", color);
    }

    for m in matches {
        let label = format!("{} ({})", m.author, m.year);
        if m.is_matched() {
            if color.enabled() {
                writeln!(w, "{} {}", "[MATCHED]".green().bold(), label.bold())?;
            } else {
                writeln!(w, "[MATCHED] {}", label)?;
            }
            writeln!(w, "  Title: {}", m.title)?;
            if !m.doi.is_empty() {
                writeln!(w, "  DOI:   {}", m.doi)?;
            }
        } else if color.enabled() {
            writeln!(w, "{} {}", "[NO REFERENCE]".red().bold(), label.bold())?;
        } else {
            writeln!(w, "[NO REFERENCE] {}", label)?;
        }

        let raw = format!("  Text:  {}", truncate(&m.raw_text, 120));
        dim_line(w, &raw, color)?;
    }
    Ok(())
}

/// Print logical lines that no reference pattern recognized.
pub fn print_unmatched_lines(
    w: &mut dyn Write,
    lines: &[String],
    color: ColorMode,
) -> std::io::Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    writeln!(w)?;
    heading(w, &format!("Unparsed reference lines ({})", lines.len()), color)?;
    for line in lines {
        if color.enabled() {
            writeln!(w, "  {} {}", "-".red(), line)?;
        } else {
            writeln!(w, "  - {}", line)?;
        }
    }
    Ok(())
}

/// Print the totals line for a multi-file run.
pub fn print_batch_summary(
    w: &mut dyn Write,
    documents: usize,
    references: usize,
    citations: usize,
    matched: usize,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    let sep = "=".repeat(60);
    heading(w, &sep, color)?;
    heading(w, "SUMMARY", color)?;
    heading(w, &sep, color)?;
    writeln!(w, "  Documents:  {}", documents)?;
    writeln!(w, "  References: {}", references)?;
    writeln!(w, "  Citations:  {}", citations)?;
    let msg = format!("  Matched:    {}", matched);
    if color.enabled() {
        writeln!(w, "{}", msg.green())?;
    } else {
        writeln!(w, "{}", msg)?;
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citelink_core::ReferenceShape;

    fn render(f: impl FnOnce(&mut dyn Write) -> std::io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn sample_reference() -> ParsedReference {
        ParsedReference {
            authors: vec!["smith".into(), "doe".into()],
            year: 2020,
            title: "A Great Study of Things".into(),
            doi: "10.1234/abcd".into(),
            raw: "Smith, J., & Doe, A. (2020). A Great Study of Things.".into(),
            shape: ReferenceShape::Journal,
            journal: Some("Journal of Things".into()),
            volume: Some("5".into()),
            issue: None,
            pages: None,
        }
    }

    #[test]
    fn test_format_from_config() {
        assert_eq!(OutputFormat::from_config("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_config(" Text "), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::from_config("yaml"), None);
    }

    #[test]
    fn test_references_plain() {
        let out = render(|w| print_references(w, &[sample_reference()], ColorMode(false)));
        assert!(out.starts_with("[1]\n"));
        assert!(out.contains("  Authors: smith; doe\n"));
        assert!(out.contains("  DOI:     10.1234/abcd\n"));
        assert!(out.contains("  Shape:   journal\n"));
        assert!(!out.contains('\u{1b}'), "no ANSI codes without color");
    }

    #[test]
    fn test_matches_plain() {
        let citation = InlineCitation {
            raw_text: "Smith and Doe (2020)".into(),
            author: "Smith and Doe".into(),
            year: "2020".into(),
        };
        let matched = MatchedCitation::with_reference(&citation, &sample_reference());
        let missing = MatchedCitation::unmatched(&InlineCitation {
            raw_text: "Roe (1999)".into(),
            author: "Roe".into(),
            year: "1999".into(),
        });

        let out = render(|w| print_matches(w, &[matched, missing], ColorMode(false)));
        assert!(out.contains("[MATCHED] Smith and Doe (2020)\n"));
        assert!(out.contains("  Title: A Great Study of Things\n"));
        assert!(out.contains("[NO REFERENCE] Roe (1999)\n"));
    }

    #[test]
    fn test_header_reports_missing_block_and_drops() {
        let report = ExtractionReport {
            stats: SkipStats {
                page_numbers: 2,
                ..SkipStats::default()
            },
            ..ExtractionReport::default()
        };
        let out = render(|w| print_report_header(w, "paper.txt", &report, ColorMode(false)));
        assert!(out.contains("== paper.txt =="));
        assert!(out.contains("No references section found"));
        assert!(out.contains("(Dropped 2 page numbers, 0 section labels, 0 orphan DOI lines)"));
    }

    #[test]
    fn test_json_report_is_flattened() {
        let report = ExtractionReport {
            block_found: true,
            references: vec![sample_reference()],
            ..ExtractionReport::default()
        };
        let out = render(|w| {
            write_json(
                w,
                &[FileReport {
                    file: "paper.txt",
                    report: &report,
                }],
            )
        });
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["file"], "paper.txt");
        assert_eq!(value[0]["block_found"], true);
        assert_eq!(value[0]["references"][0]["shape"], "journal");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("王小明研究", 3), "王小明...");
        assert_eq!(truncate("short", 10), "short");
    }
}
