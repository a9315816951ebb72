use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use citelink_core::ExtractionReport;
use citelink_core::config_file::{self, ConfigFile};
use citelink_parsing::{ParsingConfigBuilder, ReferenceExtractor, dump_lines, section};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

mod output;

use output::{ColorMode, FileReport, OutputFormat};

/// Citelink - Extract references from scholarly text and link in-text citations to them
#[derive(Parser, Debug)]
#[command(name = "citelink", version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline: references, citations and matches
    Extract {
        /// UTF-8 text files to process
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format (overrides the config file)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Also print reference lines that no pattern recognized
        #[arg(long)]
        debug: bool,

        /// Write the merged logical lines to this file as NNN<TAB>line rows
        #[arg(long)]
        dump_merged: Option<PathBuf>,

        /// Path to output file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Parse only the reference section of a document
    References {
        /// UTF-8 text file to process
        file: PathBuf,

        /// Output format (overrides the config file)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Extract only the in-text citations of a document
    Citations {
        /// UTF-8 text file to process
        file: PathBuf,

        /// Output format (overrides the config file)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

/// Settings resolved from CLI flags > config file > defaults.
struct Settings {
    format: OutputFormat,
    color: ColorMode,
    debug: bool,
}

impl Settings {
    fn resolve(
        config: &ConfigFile,
        format: Option<OutputFormat>,
        no_color: bool,
        debug: bool,
        to_file: bool,
    ) -> Self {
        let section = config.output.clone().unwrap_or_default();
        let format = format
            .or_else(|| section.format.as_deref().and_then(OutputFormat::from_config))
            .unwrap_or(OutputFormat::Text);
        let use_color = !no_color && !to_file && section.color.unwrap_or(true);
        Self {
            format,
            color: ColorMode(use_color),
            debug: debug || section.debug.unwrap_or(false),
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config_file()?;
    let extractor = build_extractor(&config)?;

    match cli.command {
        Command::Extract {
            files,
            format,
            debug,
            dump_merged,
            output,
            no_color,
        } => {
            let settings = Settings::resolve(&config, format, no_color, debug, output.is_some());
            extract(&extractor, &files, &settings, dump_merged, output)
        }
        Command::References {
            file,
            format,
            no_color,
        } => {
            let settings = Settings::resolve(&config, format, no_color, false, false);
            references(&extractor, &file, &settings)
        }
        Command::Citations {
            file,
            format,
            no_color,
        } => {
            let settings = Settings::resolve(&config, format, no_color, false, false);
            citations(&extractor, &file, &settings)
        }
    }
}

/// `RUST_LOG` wins unless `-v` is given; logs go to stderr so stdout stays parseable.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let directives = format!("citelink_core={level},citelink_parsing={level}");
    let filter = if verbose > 0 {
        EnvFilter::new(directives)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// `CITELINK_CONFIG` names an explicit file; otherwise cascade CWD over platform config.
fn load_config_file() -> anyhow::Result<ConfigFile> {
    match std::env::var_os("CITELINK_CONFIG") {
        Some(path) => {
            let path = PathBuf::from(path);
            let config = config_file::read_config(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config from CITELINK_CONFIG");
            Ok(config)
        }
        None => Ok(config_file::load_config()),
    }
}

fn build_extractor(config: &ConfigFile) -> anyhow::Result<ReferenceExtractor> {
    let builder = match config.parsing {
        Some(ref parsing) => ParsingConfigBuilder::from_section(parsing),
        None => ParsingConfigBuilder::new(),
    };
    let parsing = builder
        .build()
        .context("Invalid regular expression in [parsing] config")?;
    Ok(ReferenceExtractor::with_config(parsing))
}

fn read_document(path: &Path) -> anyhow::Result<String> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} as UTF-8 text", path.display()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn open_writer(output: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    Ok(writer)
}

fn extract(
    extractor: &ReferenceExtractor,
    files: &[PathBuf],
    settings: &Settings,
    dump_merged: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let progress = if files.len() > 1 {
        let bar = ProgressBar::new(files.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} [{bar:40.green/dim}] {pos}/{len}")?
                .progress_chars("=> "),
        );
        Some(bar)
    } else {
        None
    };

    let mut reports: Vec<(String, ExtractionReport)> = Vec::with_capacity(files.len());
    let mut failures: Vec<(String, anyhow::Error)> = Vec::new();

    for path in files {
        let name = display_name(path);
        if let Some(ref bar) = progress {
            bar.set_message(name.clone());
        }

        let result = read_document(path).and_then(|text| {
            extractor
                .extract(&text)
                .with_context(|| format!("Failed to process {}", path.display()))
        });
        match result {
            Ok(report) => reports.push((name, report)),
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping document");
                failures.push((name, e));
            }
        }

        if let Some(ref bar) = progress {
            bar.inc(1);
        }
    }
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    if let Some(ref dump_path) = dump_merged {
        write_merged_dump(dump_path, &reports)?;
    }

    let mut writer = open_writer(output.as_deref())?;
    match settings.format {
        OutputFormat::Json => {
            if !settings.debug {
                for (_, report) in reports.iter_mut() {
                    report.merged_lines.clear();
                }
            }
            let tagged: Vec<FileReport<'_>> = reports
                .iter()
                .map(|(name, report)| FileReport { file: name, report })
                .collect();
            output::write_json(&mut writer, &tagged)?;
        }
        OutputFormat::Text => {
            for (name, report) in &reports {
                output::print_report_header(&mut writer, name, report, settings.color)?;
                output::print_matches(&mut writer, &report.matches, settings.color)?;
                if settings.debug {
                    output::print_unmatched_lines(
                        &mut writer,
                        &report.unmatched_lines,
                        settings.color,
                    )?;
                }
                writeln!(writer)?;
            }
            if reports.len() > 1 {
                output::print_batch_summary(
                    &mut writer,
                    reports.len(),
                    reports.iter().map(|(_, r)| r.references.len()).sum(),
                    reports.iter().map(|(_, r)| r.citations.len()).sum(),
                    reports.iter().map(|(_, r)| r.matched_count()).sum(),
                    settings.color,
                )?;
            }
        }
    }
    writer.flush()?;

    if !failures.is_empty() {
        for (name, e) in &failures {
            eprintln!("{}: {:#}", name, e);
        }
        anyhow::bail!("{} of {} files failed", failures.len(), files.len());
    }
    Ok(())
}

/// One document writes the plain dump; several get a `# name` line before each.
fn write_merged_dump(path: &Path, reports: &[(String, ExtractionReport)]) -> anyhow::Result<()> {
    let content = match reports {
        [(_, report)] => dump_lines(&report.merged_lines),
        _ => reports
            .iter()
            .map(|(name, report)| format!("# {}\n{}", name, dump_lines(&report.merged_lines)))
            .collect(),
    };
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write merged lines to {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote merged lines");
    Ok(())
}

fn references(
    extractor: &ReferenceExtractor,
    file: &Path,
    settings: &Settings,
) -> anyhow::Result<()> {
    let text = extractor.normalize(&read_document(file)?);
    let block = extractor
        .find_reference_block(&text)
        .with_context(|| format!("No references section found in {}", file.display()))?;
    let parsed = extractor.parse_references(block.entries());

    let mut writer = open_writer(None)?;
    match settings.format {
        OutputFormat::Json => output::write_json(&mut writer, &parsed.references)?,
        OutputFormat::Text => {
            writeln!(
                writer,
                "{}: {} references under \"{}\"\n",
                display_name(file),
                parsed.references.len(),
                block.heading()
            )?;
            output::print_references(&mut writer, &parsed.references, settings.color)?;
            output::print_unmatched_lines(&mut writer, &parsed.failures, settings.color)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn citations(
    extractor: &ReferenceExtractor,
    file: &Path,
    settings: &Settings,
) -> anyhow::Result<()> {
    let text = extractor.normalize(&read_document(file)?);
    let body = section::citation_body(&text, extractor.config());
    let found = extractor.extract_citations(body);

    let mut writer = open_writer(None)?;
    match settings.format {
        OutputFormat::Json => output::write_json(&mut writer, &found)?,
        OutputFormat::Text => {
            writeln!(
                writer,
                "{}: {} in-text citations\n",
                display_name(file),
                found.len()
            )?;
            output::print_citations(&mut writer, &found, settings.color)?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use citelink_core::config_file::OutputSection;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_extract_args() {
        let cli = Cli::try_parse_from([
            "citelink",
            "-v",
            "extract",
            "a.txt",
            "b.txt",
            "--format",
            "json",
            "--dump-merged",
            "merged.tsv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Extract {
                files,
                format,
                dump_merged,
                ..
            } => {
                assert_eq!(files.len(), 2);
                assert_eq!(format, Some(OutputFormat::Json));
                assert_eq!(dump_merged, Some(PathBuf::from("merged.tsv")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_extract_requires_a_file() {
        assert!(Cli::try_parse_from(["citelink", "extract"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let config = ConfigFile {
            parsing: None,
            output: Some(OutputSection {
                format: Some("json".into()),
                color: Some(true),
                debug: Some(true),
            }),
        };

        let from_file = Settings::resolve(&config, None, false, false, false);
        assert_eq!(from_file.format, OutputFormat::Json);
        assert!(from_file.color.enabled());
        assert!(from_file.debug);

        let overridden = Settings::resolve(&config, Some(OutputFormat::Text), true, false, false);
        assert_eq!(overridden.format, OutputFormat::Text);
        assert!(!overridden.color.enabled());

        let to_file = Settings::resolve(&ConfigFile::default(), None, false, false, true);
        assert!(!to_file.color.enabled(), "no color when writing to a file");
        assert!(!to_file.debug);
    }

    #[test]
    fn test_merged_dump_multi_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.tsv");

        let report = |line: &str| ExtractionReport {
            merged_lines: vec![line.to_string()],
            ..ExtractionReport::default()
        };
        let reports = vec![
            ("a.txt".to_string(), report("Smith, J. (2020). One.")),
            ("b.txt".to_string(), report("Doe, A. (2019). Two.")),
        ];
        write_merged_dump(&path, &reports).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "# a.txt\n001\tSmith, J. (2020). One.\n# b.txt\n001\tDoe, A. (2019). Two.\n"
        );
    }
}
