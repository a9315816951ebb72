use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Normalize a whole document: NFKC, typographic quotes to ASCII, and
/// non-breaking spaces to plain spaces.
pub fn normalize_document(text: &str) -> String {
    text.nfkc()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => '"',
            '\u{00A0}' | '\u{202F}' | '\u{2007}' => ' ',
            other => other,
        })
        .collect()
}

/// Fold full-width CJK punctuation to its ASCII counterpart.
pub fn fold_cjk_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '（' => '(',
            '）' => ')',
            '。' => '.',
            '、' => ',',
            '，' => ',',
            '：' => ':',
            '；' => ';',
            '\u{00A0}' => ' ',
            other => other,
        })
        .collect()
}

/// `_Title_` / `*Title*` emphasis, only when the markers sit at word
/// boundaries so underscores inside DOIs and URLs survive.
static EMPHASIS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[\s(\[])[_*]([^_*\s][^_*]*?)[_*]([\s.,;:)\]]|$)").unwrap()
});

static ITALIC_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?i>").unwrap());

/// Strip italic and underline markup until nothing changes.
pub fn strip_markup(text: &str) -> String {
    let mut current = ITALIC_TAG_RE.replace_all(text, "").into_owned();
    loop {
        let next = EMPHASIS_RE.replace_all(&current, "$1$2$3").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Normalize one reference line: punctuation folding, then markup removal.
/// Applying it twice gives the same result as applying it once.
pub fn normalize_reference_text(text: &str) -> String {
    strip_markup(&fold_cjk_punctuation(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_quotes_and_nbsp() {
        let out = normalize_document("\u{201C}Deep\u{201D} isn\u{2019}t\u{00A0}easy");
        assert_eq!(out, "\"Deep\" isn't easy");
    }

    #[test]
    fn test_document_nfkc_folds_fullwidth_letters() {
        assert_eq!(normalize_document("ＡＢＣ１２３"), "ABC123");
    }

    #[test]
    fn test_fold_cjk_punctuation() {
        assert_eq!(
            fold_cjk_punctuation("駱俊宏、方世榮（2005）。服務品質：研究；中華，8"),
            "駱俊宏,方世榮(2005).服務品質:研究;中華,8"
        );
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(strip_markup("In _Journal of Things_, 5(2)"), "In Journal of Things, 5(2)");
        assert_eq!(strip_markup("*Nature*."), "Nature.");
        assert_eq!(strip_markup("<i>Title</I> here"), "Title here");
        assert_eq!(strip_markup("_A_ _B_"), "A B");
    }

    #[test]
    fn test_markup_keeps_doi_underscores() {
        let doi = "https://doi.org/10.1000/abc_def_ghi";
        assert_eq!(strip_markup(doi), doi);
    }

    #[test]
    fn test_reference_normalization_is_idempotent() {
        let inputs = [
            "Smith, J.（2020）。_A Study_。*Journal*，5（2），10-20。",
            "<i>Title</i> _x_",
            "__double__ markers",
        ];
        for input in inputs {
            let once = normalize_reference_text(input);
            assert_eq!(normalize_reference_text(&once), once, "input: {input}");
        }
    }
}
