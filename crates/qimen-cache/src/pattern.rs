//! Redis-style glob matching for key patterns.
//!
//! The fallback store uses the same matching rules Redis applies to
//! `SCAN MATCH`, so `del_pattern` removes the same keys in either backing mode:
//!
//! - `*` matches any run of bytes, including none
//! - `?` matches exactly one byte
//! - `[abc]`, `[a-z]` match one byte from a set or range; `[^a]` / `[!a]` negate
//! - `\x` matches `x` literally

/// Returns true if `key` matches the glob `pattern`.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    matches(pattern.as_bytes(), key.as_bytes())
}

fn matches(pattern: &[u8], text: &[u8]) -> bool {
    let mut p = 0;
    let mut t = 0;
    // Pattern position after the last `*` and the text position it resumes from.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            if pattern[p] == b'*' {
                backtrack = Some((p + 1, t));
                p += 1;
                continue;
            }
            if let Some(next) = match_one(pattern, p, text[t]) {
                p = next;
                t += 1;
                continue;
            }
        }

        match backtrack {
            Some((star_p, star_t)) => {
                p = star_p;
                t = star_t + 1;
                backtrack = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Match a single pattern token starting at `p` against `c`.
///
/// Returns the index of the next token on success.
fn match_one(pattern: &[u8], p: usize, c: u8) -> Option<usize> {
    match pattern[p] {
        b'?' => Some(p + 1),
        b'\\' if p + 1 < pattern.len() => (pattern[p + 1] == c).then_some(p + 2),
        b'[' => {
            let (matched, next) = match_class(pattern, p + 1, c);
            matched.then_some(next)
        }
        literal => (literal == c).then_some(p + 1),
    }
}

/// Evaluate a `[...]` class whose body starts at `start`.
///
/// An unterminated class extends to the end of the pattern.
fn match_class(pattern: &[u8], start: usize, c: u8) -> (bool, usize) {
    let mut i = start;
    let negate = matches!(pattern.get(i), Some(b'^') | Some(b'!'));
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() {
        match pattern[i] {
            b']' => {
                i += 1;
                return (matched != negate, i);
            }
            b'\\' if i + 1 < pattern.len() => {
                if pattern[i + 1] == c {
                    matched = true;
                }
                i += 2;
            }
            low if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' => {
                let high = pattern[i + 2];
                let (low, high) = if low <= high { (low, high) } else { (high, low) };
                if (low..=high).contains(&c) {
                    matched = true;
                }
                i += 3;
            }
            literal => {
                if literal == c {
                    matched = true;
                }
                i += 1;
            }
        }
    }

    (matched != negate, i)
}
