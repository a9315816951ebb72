use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_NAME: &str = ".citelink.toml";

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub parsing: Option<ParsingSection>,
    pub output: Option<OutputSection>,
}

/// Overrides for the reference parser's heuristics.
///
/// List fields come in pairs: `section_labels` replaces the built-in list,
/// `extra_section_labels` appends to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsingSection {
    pub section_header_regex: Option<String>,
    pub section_end_regex: Option<String>,
    pub max_block_chars: Option<usize>,
    pub max_merge_passes: Option<usize>,
    pub max_author_words: Option<usize>,
    pub section_labels: Option<Vec<String>>,
    pub extra_section_labels: Option<Vec<String>>,
    pub continuation_markers: Option<Vec<String>>,
    pub extra_continuation_markers: Option<Vec<String>>,
    pub citation_lead_words: Option<Vec<String>>,
    pub extra_citation_lead_words: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSection {
    /// `"text"` or `"json"`.
    pub format: Option<String>,
    pub color: Option<bool>,
    /// Include unparsed reference lines in the output.
    pub debug: Option<bool>,
}

/// Platform config directory path: `<config_dir>/citelink/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("citelink").join("config.toml"))
}

/// Load config by cascading CWD `.citelink.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(LOCAL_CONFIG_NAME));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    if !path.exists() {
        return None;
    }
    match read_config(path) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
            None
        }
    }
}

/// Read a config file that the user named explicitly; errors are reported.
pub fn read_config(path: &Path) -> Result<ConfigFile, CoreError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

fn pick<T: Clone>(overlay: &Option<T>, base: &Option<T>) -> Option<T> {
    overlay.clone().or_else(|| base.clone())
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let bp = base.parsing.unwrap_or_default();
    let op = overlay.parsing.unwrap_or_default();
    let bo = base.output.unwrap_or_default();
    let oo = overlay.output.unwrap_or_default();

    ConfigFile {
        parsing: Some(ParsingSection {
            section_header_regex: pick(&op.section_header_regex, &bp.section_header_regex),
            section_end_regex: pick(&op.section_end_regex, &bp.section_end_regex),
            max_block_chars: pick(&op.max_block_chars, &bp.max_block_chars),
            max_merge_passes: pick(&op.max_merge_passes, &bp.max_merge_passes),
            max_author_words: pick(&op.max_author_words, &bp.max_author_words),
            section_labels: pick(&op.section_labels, &bp.section_labels),
            extra_section_labels: pick(&op.extra_section_labels, &bp.extra_section_labels),
            continuation_markers: pick(&op.continuation_markers, &bp.continuation_markers),
            extra_continuation_markers: pick(
                &op.extra_continuation_markers,
                &bp.extra_continuation_markers,
            ),
            citation_lead_words: pick(&op.citation_lead_words, &bp.citation_lead_words),
            extra_citation_lead_words: pick(
                &op.extra_citation_lead_words,
                &bp.extra_citation_lead_words,
            ),
        }),
        output: Some(OutputSection {
            format: pick(&oo.format, &bo.format),
            color: pick(&oo.color, &bo.color),
            debug: pick(&oo.debug, &bo.debug),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_section_round_trip_toml() {
        let config = ConfigFile {
            parsing: Some(ParsingSection {
                continuation_markers: Some(vec!["Nature,".to_string()]),
                max_block_chars: Some(50_000),
                ..Default::default()
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn absent_fields_deserialize_as_none() {
        let toml_str = "[parsing]\nmax_merge_passes = 4\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        let parsing = parsed.parsing.unwrap();
        assert_eq!(parsing.max_merge_passes, Some(4));
        assert!(parsing.section_labels.is_none());
        assert!(parsed.output.is_none());
    }

    #[test]
    fn merge_overlay_wins_and_base_preserved() {
        let base = ConfigFile {
            parsing: Some(ParsingSection {
                max_author_words: Some(6),
                max_merge_passes: Some(3),
                ..Default::default()
            }),
            output: Some(OutputSection {
                format: Some("json".into()),
                ..Default::default()
            }),
        };
        let overlay = ConfigFile {
            parsing: Some(ParsingSection {
                max_author_words: Some(10),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        let parsing = merged.parsing.unwrap();
        assert_eq!(parsing.max_author_words, Some(10));
        assert_eq!(parsing.max_merge_passes, Some(3));
        assert_eq!(merged.output.unwrap().format.as_deref(), Some("json"));
    }

    #[test]
    fn load_from_path_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_path(&dir.path().join("nope.toml")).is_none());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[parsing\n").unwrap();
        assert!(load_from_path(&bad).is_none());
        assert!(read_config(&bad).is_err());
    }

    #[test]
    fn read_config_from_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = ConfigFile {
            output: Some(OutputSection {
                color: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(read_config(&path).unwrap(), config);
    }
}
