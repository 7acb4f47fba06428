/**
 * Fractional Indexing
 *
 * Base-62 keys that sort lexicographically and always admit another key
 * between any two neighbours. Place order within an itinerary day is the
 * order of these keys, so reordering one place never rewrites its siblings.
 *
 * A key is a non-empty string of digits `0-9A-Za-z` that does not end in
 * `0` (a trailing zero would leave no room directly below the key).
 */

use thiserror::Error;

const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: usize = 62;
const ZERO: u8 = b'0';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FractionalIndexError {
    #[error("Invalid fractional index {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("Fractional index {lower:?} is not below {upper:?}")]
    OutOfOrder { lower: String, upper: String },
}

fn digit_value(digit: u8) -> usize {
    DIGITS.iter().position(|d| *d == digit).unwrap_or(0)
}

/// Check that `key` is a well-formed index
pub fn validate_key(key: &str) -> Result<(), FractionalIndexError> {
    let invalid = |reason| FractionalIndexError::InvalidKey {
        key: key.to_string(),
        reason,
    };
    if key.is_empty() {
        return Err(invalid("empty"));
    }
    if !key.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(invalid("non base-62 digit"));
    }
    if key.as_bytes().last() == Some(&ZERO) {
        return Err(invalid("trailing zero"));
    }
    Ok(())
}

/// Key strictly between `lower` and `upper`; `None` leaves that side open
pub fn key_between(lower: Option<&str>, upper: Option<&str>) -> Result<String, FractionalIndexError> {
    if let Some(key) = lower {
        validate_key(key)?;
    }
    if let Some(key) = upper {
        validate_key(key)?;
    }
    if let (Some(a), Some(b)) = (lower, upper) {
        if a >= b {
            return Err(FractionalIndexError::OutOfOrder {
                lower: a.to_string(),
                upper: b.to_string(),
            });
        }
    }

    let key = midpoint(lower.unwrap_or("").as_bytes(), upper.map(str::as_bytes));
    Ok(key.into_iter().map(char::from).collect())
}

/// `count` ascending keys, all above `lower`
pub fn keys_after(lower: Option<&str>, count: usize) -> Result<Vec<String>, FractionalIndexError> {
    let mut keys: Vec<String> = Vec::with_capacity(count);
    for _ in 0..count {
        let previous = keys.last().map(String::as_str).or(lower);
        let next = key_between(previous, None)?;
        keys.push(next);
    }
    Ok(keys)
}

// `a` may be empty (zero); `b` of `None` is one past the largest key.
fn midpoint(a: &[u8], b: Option<&[u8]>) -> Vec<u8> {
    if let Some(b) = b {
        let mut shared = 0;
        while shared < b.len() && a.get(shared).copied().unwrap_or(ZERO) == b[shared] {
            shared += 1;
        }
        if shared > 0 {
            let mut key = b[..shared].to_vec();
            key.extend(midpoint(a.get(shared..).unwrap_or(&[]), Some(&b[shared..])));
            return key;
        }
    }

    let digit_a = a.first().map(|d| digit_value(*d)).unwrap_or(0);
    let digit_b = b.and_then(|b| b.first()).map(|d| digit_value(*d)).unwrap_or(BASE);

    if digit_b.saturating_sub(digit_a) > 1 {
        vec![DIGITS[(digit_a + digit_b + 1) / 2]]
    } else if let Some(b) = b.filter(|b| b.len() > 1) {
        b[..1].to_vec()
    } else {
        let mut key = vec![DIGITS[digit_a]];
        key.extend(midpoint(a.get(1..).unwrap_or(&[]), None));
        key
    }
}
