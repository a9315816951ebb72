use once_cell::sync::Lazy;
use regex::Regex;

/// A bare DOI: registrant prefix of 4 to 9 digits, a slash, a suffix.
static DOI_SHAPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").unwrap());

static DOI_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?://(?:dx\.)?doi\.org/(10\.\d{4,9}/[^\s\]>}]+)").unwrap()
});

static DOI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"10\.\d{4,9}/[^\s\]>}]+").unwrap());

/// Strip trailing punctuation and unbalanced closing brackets from a DOI.
pub fn clean_doi(doi: &str) -> String {
    const TRAILING: [char; 4] = ['.', ',', ';', ':'];
    let mut doi = doi.trim().trim_end_matches(TRAILING);

    loop {
        let unbalanced = [('(', ')'), ('[', ']'), ('{', '}')]
            .into_iter()
            .find(|&(open, close)| {
                doi.ends_with(close) && doi.matches(close).count() > doi.matches(open).count()
            });
        match unbalanced {
            Some((_, close)) => {
                doi = doi[..doi.len() - close.len_utf8()].trim_end_matches(TRAILING);
            }
            None => break,
        }
    }

    doi.to_string()
}

/// Clean a captured DOI and accept it only if it has the `10.NNNN/suffix` shape.
pub fn validate_doi(candidate: &str) -> Option<String> {
    let cleaned = clean_doi(candidate);
    DOI_SHAPE_RE.is_match(&cleaned).then_some(cleaned)
}

/// Find the first DOI in `text`, preferring `doi.org` URLs over bare DOIs.
pub fn extract_doi(text: &str) -> Option<String> {
    if let Some(caps) = DOI_URL_RE.captures(text) {
        return validate_doi(&caps[1]);
    }
    DOI_RE.find(text).and_then(|m| validate_doi(m.as_str()))
}

/// `https:// doi.org/` left by line wrapping.
static SCHEME_GAP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(https?://)\s+(\S*doi\.org/)").unwrap());

/// `doi.org/ 10.` left by line wrapping.
static HOST_GAP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(doi\.org/)\s+(10\.)").unwrap());

/// `10.1037//0022-3514` → `10.1037/0022-3514`.
static DOUBLE_SLASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(10\.\d{4,9})/{2,}").unwrap());

/// A DOI token, the gap after it, and the token that follows.
static DOI_GAP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(10\.\d{4,9}/\S*)([ \t]+)(\S+)").unwrap());

static DIGIT_FRAGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d[\d.\-]*[.,;]?$").unwrap());

/// Whether `next` continues a DOI that was broken after `doi`.
fn is_doi_continuation(doi: &str, next: &str) -> bool {
    let Some(last) = doi.chars().last() else {
        return false;
    };
    let Some(first) = next.chars().next() else {
        return false;
    };
    if matches!(first, '.' | '/' | '-' | '_' | ')') {
        return true;
    }
    if matches!(last, '.' | '/' | '-' | '_' | ':' | '(') {
        return first.is_ascii_digit() || first.is_ascii_lowercase();
    }
    last.is_ascii_digit() && DIGIT_FRAGMENT_RE.is_match(next)
}

fn join_first_doi_gap(line: &str) -> Option<String> {
    DOI_GAP_RE.captures_iter(line).find_map(|caps| {
        let (doi, gap, next) = (caps.get(1)?, caps.get(2)?, caps.get(3)?);
        if !is_doi_continuation(doi.as_str(), next.as_str()) {
            return None;
        }
        let mut out = String::with_capacity(line.len());
        out.push_str(&line[..gap.start()]);
        out.push_str(&line[gap.end()..]);
        Some(out)
    })
}

/// Remove whitespace that line wrapping inserted inside DOIs and `doi.org`
/// URLs, and duplicate slashes after the DOI prefix. Text that merely
/// follows a complete DOI is left alone.
pub fn collapse_doi_breaks(line: &str) -> String {
    let mut current = line.to_string();
    loop {
        let mut next = SCHEME_GAP_RE.replace_all(&current, "$1$2").into_owned();
        next = HOST_GAP_RE.replace_all(&next, "$1$2").into_owned();
        next = DOUBLE_SLASH_RE.replace_all(&next, "$1/").into_owned();
        while let Some(joined) = join_first_doi_gap(&next) {
            next = joined;
        }
        if next == current {
            return current;
        }
        current = next;
    }
}
