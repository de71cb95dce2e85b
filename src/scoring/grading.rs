//! Loose answer comparison used for automatic speed-round grading.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Separators between accepted variants of an expected answer.
const VARIANT_SEPARATORS: [char; 3] = ['|', ';', '\n'];

/// Fold case, strip diacritics and collapse whitespace.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'đ' | 'Đ' => 'd',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalised, non-empty variants of an expected answer.
pub fn variants(expected: &str) -> Vec<String> {
    expected
        .split(VARIANT_SEPARATORS)
        .map(normalize)
        .filter(|variant| !variant.is_empty())
        .collect()
}

/// Whether `submitted` matches any variant of `expected`.
pub fn is_match(submitted: &str, expected: &str) -> bool {
    let submitted = normalize(submitted);
    !submitted.is_empty() && variants(expected).iter().any(|variant| *variant == submitted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diacritics_case_and_spacing_are_ignored() {
        assert!(is_match("  hà  nội ", "Hà Nội|Ha Noi"));
        assert_eq!(normalize("  Hà  NỘI "), "ha noi");
    }

    #[test]
    fn d_with_stroke_folds_to_d() {
        assert!(is_match("da nang", "Đà Nẵng"));
    }

    #[test]
    fn every_separator_splits_variants() {
        assert!(is_match("tokyo", "Kyoto; Tokyo"));
        assert!(is_match("osaka", "Kyoto\nOsaka"));
        assert!(!is_match("nara", "Kyoto|Osaka;Tokyo"));
    }

    #[test]
    fn blank_submission_never_matches() {
        assert!(!is_match("   ", "|"));
        assert!(!is_match("", "anything"));
    }
}
