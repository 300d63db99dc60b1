//! Phonetic encodings: American Soundex and original Metaphone.

use recordlink_storage::Value;

use super::{expect_args, text_of};
use crate::error::MatchError;

fn soundex_code(c: char) -> u8 {
    match c {
        'B' | 'F' | 'P' | 'V' => b'1',
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => b'2',
        'D' | 'T' => b'3',
        'L' => b'4',
        'M' | 'N' => b'5',
        'R' => b'6',
        _ => 0,
    }
}

/// Four-character American Soundex code. Non-letters are ignored; `None`
/// when the input has no letters.
pub fn soundex(s: &str) -> Option<String> {
    let letters: Vec<char> = s
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let (&first, rest) = letters.split_first()?;

    let mut out = String::with_capacity(4);
    out.push(first);
    let mut last = soundex_code(first);
    for &c in rest {
        if out.len() == 4 {
            break;
        }
        // H and W do not separate letters with the same code.
        if c == 'H' || c == 'W' {
            continue;
        }
        let code = soundex_code(c);
        if code == 0 {
            last = 0;
            continue;
        }
        if code != last {
            out.push(char::from(code));
        }
        last = code;
    }
    while out.len() < 4 {
        out.push('0');
    }
    Some(out)
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'A' | 'E' | 'I' | 'O' | 'U')
}

/// Original Metaphone encoding (Philips, 1990).
pub fn metaphone(s: &str) -> Option<String> {
    let mut w: Vec<char> = s
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if w.is_empty() {
        return None;
    }

    // Initial letter exceptions.
    match (w[0], w.get(1).copied()) {
        ('A', Some('E')) | ('G', Some('N')) | ('K', Some('N')) | ('P', Some('N'))
        | ('W', Some('R')) => {
            w.remove(0);
        }
        ('X', _) => w[0] = 'S',
        ('W', Some('H')) => {
            w.remove(1);
        }
        _ => {}
    }

    let at = |i: usize| -> Option<char> { w.get(i).copied() };
    let mut out = String::new();
    let mut i = 0;
    while i < w.len() {
        let c = w[i];
        let prev = if i > 0 { at(i - 1) } else { None };
        let next = at(i + 1);
        let next2 = at(i + 2);

        // Doubled letters collapse, except C.
        if prev == Some(c) && c != 'C' {
            i += 1;
            continue;
        }

        match c {
            'A' | 'E' | 'I' | 'O' | 'U' => {
                if i == 0 {
                    out.push(c);
                }
            }
            'B' => {
                if !(prev == Some('M') && next.is_none()) {
                    out.push('B');
                }
            }
            'C' => {
                if next == Some('I') && next2 == Some('A') {
                    out.push('X');
                } else if next == Some('H') {
                    out.push('X');
                    i += 1;
                } else if matches!(next, Some('I') | Some('E') | Some('Y')) {
                    if prev != Some('S') {
                        out.push('S');
                    }
                } else {
                    out.push('K');
                }
            }
            'D' => {
                if next == Some('G') && matches!(next2, Some('E') | Some('Y') | Some('I')) {
                    out.push('J');
                    i += 1;
                } else {
                    out.push('T');
                }
            }
            'G' => {
                let silent_gh = next == Some('H') && !next2.is_some_and(is_vowel);
                let silent_gn = next == Some('N')
                    && (next2.is_none()
                        || (next2 == Some('E') && at(i + 3) == Some('D') && at(i + 4).is_none()));
                if !(silent_gh || silent_gn) {
                    if matches!(next, Some('I') | Some('E') | Some('Y')) {
                        out.push('J');
                    } else {
                        out.push('K');
                    }
                }
            }
            'H' => {
                let after_modifier = matches!(prev, Some('C') | Some('S') | Some('P') | Some('T') | Some('G'));
                let between_vowels = prev.is_some_and(is_vowel) && !next.is_some_and(is_vowel);
                if !after_modifier && !between_vowels {
                    out.push('H');
                }
            }
            'K' => {
                if prev != Some('C') {
                    out.push('K');
                }
            }
            'P' => {
                if next == Some('H') {
                    out.push('F');
                    i += 1;
                } else {
                    out.push('P');
                }
            }
            'Q' => out.push('K'),
            'S' => {
                if next == Some('H') {
                    out.push('X');
                    i += 1;
                } else if next == Some('I') && matches!(next2, Some('O') | Some('A')) {
                    out.push('X');
                } else {
                    out.push('S');
                }
            }
            'T' => {
                if next == Some('I') && matches!(next2, Some('O') | Some('A')) {
                    out.push('X');
                } else if next == Some('H') {
                    out.push('0');
                    i += 1;
                } else if !(next == Some('C') && next2 == Some('H')) {
                    out.push('T');
                }
            }
            'V' => out.push('F'),
            'W' | 'Y' => {
                if next.is_some_and(is_vowel) {
                    out.push(c);
                }
            }
            'X' => out.push_str("KS"),
            'Z' => out.push('S'),
            // F J L M N R
            _ => out.push(c),
        }
        i += 1;
    }
    Some(out)
}

pub fn soundex_transform(value: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("soundex", args, 0, 0)?;
    Ok(text_of(value).and_then(|s| soundex(&s)).map(Value::Text))
}

pub fn metaphone_transform(value: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("metaphone", args, 0, 0)?;
    Ok(text_of(value).and_then(|s| metaphone(&s)).map(Value::Text))
}

/// Binary: true when both operands share a Soundex code.
pub fn sounds_like(a: &Value, b: &Value, args: &[Value]) -> Result<Option<Value>, MatchError> {
    expect_args("sounds_like", args, 0, 0)?;
    let a = text_of(a).and_then(|s| soundex(&s));
    let b = text_of(b).and_then(|s| soundex(&s));
    Ok(match (a, b) {
        (Some(a), Some(b)) => Some(Value::Bool(a == b)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soundex_reference_codes() {
        assert_eq!(soundex("Robert").as_deref(), Some("R163"));
        assert_eq!(soundex("Rupert").as_deref(), Some("R163"));
        assert_eq!(soundex("Tymczak").as_deref(), Some("T522"));
        assert_eq!(soundex("Pfister").as_deref(), Some("P236"));
        assert_eq!(soundex("Ashcraft").as_deref(), Some("A261"));
        assert_eq!(soundex("Lee").as_deref(), Some("L000"));
        assert_eq!(soundex("123"), None);
    }

    #[test]
    fn metaphone_groups_spelling_variants() {
        assert_eq!(metaphone("Smith").as_deref(), Some("SM0"));
        assert_eq!(metaphone("Smith"), metaphone("Smyth"));
        assert_eq!(metaphone("Knight").as_deref(), Some("NT"));
        assert_eq!(metaphone("Phillip").as_deref(), Some("FLP"));
    }

    #[test]
    fn sounds_like_compares_codes() {
        assert_eq!(
            sounds_like(&Value::text("Robert"), &Value::text("Rupert"), &[]).unwrap(),
            Some(Value::Bool(true))
        );
        assert_eq!(
            sounds_like(&Value::text("Robert"), &Value::text("Smith"), &[]).unwrap(),
            Some(Value::Bool(false))
        );
    }
}
