//! Glob matching with Redis `MATCH` semantics.
//!
//! Supported syntax:
//! - `*`: any run of characters, including none
//! - `?`: exactly one character
//! - `[abc]`, `[a-z]`, `[^abc]`: character classes (ranges may be reversed)
//! - `\x`: literal `x`
//!
//! Malformed patterns never fail: an unterminated class simply ends with the
//! pattern, a trailing `\` matches a literal backslash.

enum Step {
    Star,
    Char { matched: bool, width: usize },
}

/// Returns true if `key` matches the glob `pattern`.
pub fn matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    // Position right after the last `*` and the key index it is currently absorbing up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        if p < pattern.len() {
            match step(&pattern, p, key[k]) {
                Step::Star => {
                    p += 1;
                    backtrack = Some((p, k));
                    continue;
                }
                Step::Char { matched: true, width } => {
                    p += width;
                    k += 1;
                    continue;
                }
                Step::Char { matched: false, .. } => {}
            }
        }

        match backtrack {
            Some((star_p, star_k)) => {
                backtrack = Some((star_p, star_k + 1));
                p = star_p;
                k = star_k + 1;
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

fn step(pattern: &[char], p: usize, ch: char) -> Step {
    match pattern[p] {
        '*' => Step::Star,
        '?' => Step::Char { matched: true, width: 1 },
        '[' => {
            let (matched, width) = class(&pattern[p + 1..], ch);
            Step::Char { matched, width: width + 1 }
        }
        '\\' if p + 1 < pattern.len() => Step::Char {
            matched: pattern[p + 1] == ch,
            width: 2,
        },
        c => Step::Char { matched: c == ch, width: 1 },
    }
}

/// Matches `ch` against the class body that follows `[`.
/// Returns the result and the number of chars consumed, closing `]` included.
fn class(body: &[char], ch: char) -> (bool, usize) {
    let negate = body.first() == Some(&'^');
    let mut i = usize::from(negate);
    let mut matched = false;

    while i < body.len() {
        match body[i] {
            '\\' if i + 1 < body.len() => {
                matched |= body[i + 1] == ch;
                i += 2;
            }
            ']' => return (matched != negate, i + 1),
            start if i + 2 < body.len() && body[i + 1] == '-' => {
                let end = body[i + 2];
                let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
                matched |= (lo..=hi).contains(&ch);
                i += 3;
            }
            c => {
                matched |= c == ch;
                i += 1;
            }
        }
    }

    (matched != negate, i)
}
