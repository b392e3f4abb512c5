// 📏 String Similarity - Levenshtein distance + model-number extraction
//
// Edit distance is only ever applied to short tokens and model names.

use once_cell::sync::Lazy;
use regex::Regex;

/// Digit run followed by optional letters: "hd600" -> "600", "400se" -> "400se"
static MODEL_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)([a-z]*)").unwrap());

/// Calculate Levenshtein distance between two strings
///
/// Minimum number of single-character edits (insertions, deletions,
/// substitutions) turning one string into the other. Counts chars, not bytes.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    strsim::levenshtein(s1, s2)
}

/// Check if two strings match within Levenshtein distance threshold
pub fn within_edits(s1: &str, s2: &str, max_edits: usize) -> bool {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();
    if len1.abs_diff(len2) > max_edits {
        return false;
    }
    levenshtein_distance(s1, s2) <= max_edits
}

/// (max_len - distance) / max_len, in [0, 1]. Two empty strings are identical.
pub fn similarity_ratio(s1: &str, s2: &str) -> f64 {
    strsim::normalized_levenshtein(s1, s2)
}

/// Extract model-number tokens: 2-4 digits plus any trailing letters.
///
/// Expects lowercase input. Digit runs shorter than 2 or longer than 4 are
/// not model numbers ("mk2", "2021" is kept, "123456" is dropped).
pub fn extract_model_numbers(text: &str) -> Vec<String> {
    MODEL_NUMBER
        .captures_iter(text)
        .filter_map(|caps| {
            let digits = caps.get(1)?.as_str();
            if !(2..=4).contains(&digits.len()) {
                return None;
            }
            let letters = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            Some(format!("{}{}", digits, letters))
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
