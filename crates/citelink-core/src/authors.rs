use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Common lower-case surname particles (`van der Berg`, `de la Cruz`).
static SURNAME_PREFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "van", "von", "de", "del", "della", "der", "den", "di", "da", "du", "dos", "al", "el",
        "la", "le", "ben", "ibn", "mac", "mc",
    ]
    .into_iter()
    .collect()
});

/// Name suffixes to skip when picking a surname.
static NAME_SUFFIXES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["jr", "sr", "ii", "iii", "iv"].into_iter().collect());

/// Dotted initials: `J.`, `A.B.`, `J.-P.`.
static DOTTED_INITIALS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Z]\.-?)+[A-Z]?\.?$").unwrap());

/// Undotted capitals such as `J` or `JP`. Also the shape of short
/// upper-case surnames (`LI`, `WU`).
static BARE_CAPITALS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{1,2}$").unwrap());

/// Delimiters between names in a reference author field.
static AUTHOR_DELIM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[、,，&和與]").unwrap());

/// Delimiters that end the first author in a citation author string.
static FIRST_AUTHOR_DELIM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,，&、和與]|\s+and\s+").unwrap());

/// Whether `c` is a CJK unified ideograph (basic block, extension A, or compatibility).
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}')
}

/// Whether `word` is a lower-case surname particle such as `van` or `de`.
pub fn is_surname_particle(word: &str) -> bool {
    SURNAME_PREFIXES.contains(word)
}

fn is_filler_word(word: &str) -> bool {
    let lower = word.trim_end_matches('.').to_lowercase();
    matches!(lower.as_str(), "and" | "et" | "al" | "eds" | "ed")
        || NAME_SUFFIXES.contains(lower.as_str())
        || word.chars().all(|c| c == '.' || c == '…')
}

fn trim_word(word: &str) -> &str {
    word.trim_matches(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '’' || c == '-'))
}

fn is_initial(word: &str, leading: bool) -> bool {
    DOTTED_INITIALS_RE.is_match(word) || (!leading && BARE_CAPITALS_RE.is_match(word))
}

/// Reduce one name token to a surname.
///
/// Latin names yield the last word that is not an initial, suffix or filler,
/// lower-cased. CJK names yield their first character. Returns `None` for
/// tokens that carry no surname at all (`J.`, `et al.`, `...`).
///
/// The token is read as standing where a surname is expected, so a leading
/// undotted capital pair (`LI`, `WU`) is a surname. Use [`reference_surnames`]
/// for whole author fields.
pub fn surname(name: &str) -> Option<String> {
    reduce_name(name, true)
}

fn reduce_name(name: &str, surname_position: bool) -> Option<String> {
    let name = name.trim();
    let first = name.chars().next()?;
    if is_cjk(first) {
        return Some(first.to_string());
    }

    let words: Vec<&str> = name
        .split_whitespace()
        .enumerate()
        .filter(|&(i, w)| !is_initial(w, surname_position && i == 0) && !is_filler_word(w))
        .map(|(_, w)| trim_word(w))
        .filter(|w| w.chars().any(|c| c.is_alphabetic()))
        .collect();

    words.last().map(|w| w.to_lowercase())
}

/// Split a reference author field on name delimiters and reduce each
/// token to a surname, dropping tokens that carry none.
///
/// Fields alternate `Surname, Initials`, so a token right after a surname
/// is read strictly: undotted capitals there (`Smith, JP`) are initials.
///
/// `"Smith, J., & Doe, A."` → `["smith", "doe"]`; `"LI, X., & WU, Y."` →
/// `["li", "wu"]`; `"駱俊宏、方世榮"` → `["駱", "方"]`.
pub fn reference_surnames(field: &str) -> Vec<String> {
    let mut surnames = Vec::new();
    let mut expect_surname = true;
    for token in AUTHOR_DELIM_RE.split(field).filter(|t| !t.trim().is_empty()) {
        match reduce_name(token, expect_surname) {
            Some(s) => {
                surnames.push(s);
                expect_surname = false;
            }
            None => expect_surname = true,
        }
    }
    surnames
}

/// Normalize a citation or reference author string to the first author's
/// surname used as the matching key.
///
/// Apostrophes are dropped, everything after the first conjunction delimiter
/// is discarded, then Latin names keep their last word (lower-cased) and
/// CJK names their first character.
pub fn normalize_first_author(author: &str) -> String {
    let cleaned: String = author.chars().filter(|&c| c != '\'' && c != '’').collect();
    let first = FIRST_AUTHOR_DELIM_RE
        .split(cleaned.trim())
        .next()
        .unwrap_or_default()
        .trim();

    match first.chars().next() {
        None => String::new(),
        Some(c) if is_cjk(c) => c.to_string(),
        Some(_) => first
            .split_whitespace()
            .last()
            .map(|w| trim_word(w).to_lowercase())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surname_latin() {
        assert_eq!(surname("Smith").as_deref(), Some("smith"));
        assert_eq!(surname("John Smith").as_deref(), Some("smith"));
        assert_eq!(surname(" and Doe").as_deref(), Some("doe"));
        assert_eq!(surname("Smith J").as_deref(), Some("smith"));
        assert_eq!(surname("King Jr.").as_deref(), Some("king"));
    }

    #[test]
    fn test_surname_rejects_initials_and_fillers() {
        assert_eq!(surname(" J."), None);
        assert_eq!(surname("A. B."), None);
        assert_eq!(surname("J.-P."), None);
        assert_eq!(surname("et al."), None);
        assert_eq!(surname("..."), None);
        assert_eq!(surname(""), None);
    }

    #[test]
    fn test_surname_cjk_first_char() {
        assert_eq!(surname("駱俊宏").as_deref(), Some("駱"));
        assert_eq!(surname(" 王小明").as_deref(), Some("王"));
    }

    #[test]
    fn test_reference_surnames() {
        assert_eq!(reference_surnames("Smith, J., & Doe, A."), vec!["smith", "doe"]);
        assert_eq!(
            reference_surnames("Liao, C.-H., Huang, J.-Y., & Chang, C.-C."),
            vec!["liao", "huang", "chang"]
        );
        assert_eq!(reference_surnames("駱俊宏、方世榮和洪東興"), vec!["駱", "方", "洪"]);
        assert_eq!(reference_surnames("van der Berg, K."), vec!["berg"]);
    }

    #[test]
    fn test_short_upper_case_surnames_kept() {
        assert_eq!(reference_surnames("LI, X., & WU, Y."), vec!["li", "wu"]);
        assert_eq!(reference_surnames("NG, A. B., MA, C."), vec!["ng", "ma"]);
        assert_eq!(surname("XU").as_deref(), Some("xu"));
        // Undotted initials after a surname are still initials.
        assert_eq!(reference_surnames("Smith, JP, & Doe, A"), vec!["smith", "doe"]);
    }

    #[test]
    fn test_surname_particle_is_case_sensitive() {
        assert!(is_surname_particle("van"));
        assert!(!is_surname_particle("Van"));
        assert!(!is_surname_particle("smith"));
    }

    #[test]
    fn test_normalize_first_author() {
        assert_eq!(normalize_first_author("Lee and Chen"), "lee");
        assert_eq!(normalize_first_author("Batra & Ray"), "batra");
        assert_eq!(normalize_first_author("Almeida, J."), "almeida");
        assert_eq!(normalize_first_author("O'Brien"), "obrien");
        assert_eq!(normalize_first_author("林俊宏"), "林");
        assert_eq!(normalize_first_author("王、李"), "王");
        assert_eq!(normalize_first_author(""), "");
    }

    #[test]
    fn test_normalize_is_stable_on_surnames() {
        for s in ["smith", "lee", "林", "o'brien"] {
            let once = normalize_first_author(s);
            assert_eq!(normalize_first_author(&once), once);
        }
    }
}
