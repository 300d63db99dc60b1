//! String distance and similarity measures.
//!
//! The plain functions operate on `&str` and are reused by the in-memory
//! store's approximate matching. The `*_transform` wrappers adapt them to
//! the binary transform signature: operands are coerced to text, anything
//! without a text view produces no scope.

use std::collections::HashMap;

use recordlink_storage::Value;

use super::{expect_args, text_of};
use crate::error::MatchError;

/// Levenshtein edit distance over characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - distance / max(len)`; two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Sorensen-Dice coefficient over character bigrams, case-insensitive.
/// Bigrams are counted as a multiset.
pub fn sorensen_dice(a: &str, b: &str) -> f64 {
    let a = bigrams(&a.to_lowercase());
    let b = bigrams(&b.to_lowercase());
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut counts: HashMap<(char, char), usize> = HashMap::new();
    for pair in &a {
        *counts.entry(*pair).or_insert(0) += 1;
    }
    let mut shared = 0;
    for pair in &b {
        if let Some(n) = counts.get_mut(pair) {
            if *n > 0 {
                *n -= 1;
                shared += 1;
            }
        }
    }
    2.0 * shared as f64 / total as f64
}

fn bigrams(s: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Jaro similarity.
pub fn jaro(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_matched = vec![false; a.len()];
    let mut b_matched = vec![false; b.len()];
    let mut matches = 0usize;

    for (i, ca) in a.iter().enumerate() {
        let lo = i.saturating_sub(window);
        let hi = (i + window + 1).min(b.len());
        for j in lo..hi {
            if !b_matched[j] && b[j] == *ca {
                a_matched[i] = true;
                b_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }
    if matches == 0 {
        return 0.0;
    }

    let mut transpositions = 0usize;
    let mut k = 0usize;
    for (i, ca) in a.iter().enumerate() {
        if !a_matched[i] {
            continue;
        }
        while !b_matched[k] {
            k += 1;
        }
        if *ca != b[k] {
            transpositions += 1;
        }
        k += 1;
    }

    let m = matches as f64;
    let t = (transpositions / 2) as f64;
    (m / a.len() as f64 + m / b.len() as f64 + (m - t) / m) / 3.0
}

/// Jaro-Winkler similarity with the standard prefix scale of 0.1 over at
/// most four leading characters, case-insensitive.
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let j = jaro(&a, &b);
    let prefix = a
        .chars()
        .zip(b.chars())
        .take(4)
        .take_while(|(x, y)| x == y)
        .count();
    j + prefix as f64 * 0.1 * (1.0 - j)
}

// ──────────────────────────────────────────────
// Binary transform wrappers
// ──────────────────────────────────────────────

fn text_pair(a: &Value, b: &Value) -> Option<(String, String)> {
    Some((text_of(a)?, text_of(b)?))
}

pub fn levenshtein_transform(a: &Value, b: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("levenshtein", args, 0, 0)?;
    Ok(text_pair(a, b).map(|(a, b)| Value::Number(levenshtein(&a, &b) as f64)))
}

pub fn similarity_transform(a: &Value, b: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("similarity", args, 0, 0)?;
    Ok(text_pair(a, b).map(|(a, b)| Value::Number(similarity(&a, &b))))
}

pub fn sorensen_dice_transform(a: &Value, b: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("sorensen_dice", args, 0, 0)?;
    Ok(text_pair(a, b).map(|(a, b)| Value::Number(sorensen_dice(&a, &b))))
}

pub fn jaro_winkler_transform(a: &Value, b: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("jaro_winkler", args, 0, 0)?;
    Ok(text_pair(a, b).map(|(a, b)| Value::Number(jaro_winkler(&a, &b))))
}
