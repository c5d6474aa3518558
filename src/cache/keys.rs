// Cache key construction and key pattern matching
// Author: kelexine (https://github.com/kelexine)

use crate::error::{CacheError, Result};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Keys longer than this are replaced by a digest.
pub const MAX_KEY_LEN: usize = 200;

/// Join a namespace and parts into a `ns:a:b` key.
///
/// Over-long keys collapse to `ns:<sha256>` so they stay valid for every
/// backend.
pub fn build_key(namespace: &str, parts: &[&str]) -> String {
    let mut key = String::from(namespace);
    for part in parts {
        key.push(':');
        key.push_str(part);
    }

    if key.len() > MAX_KEY_LEN {
        return format!("{}:{}", namespace, digest(key.as_bytes()));
    }
    key
}

/// Derive a key from arbitrary call arguments by hashing their JSON form.
pub fn hashed_key<T: Serialize + ?Sized>(namespace: &str, args: &T) -> Result<String> {
    let encoded = serde_json::to_vec(args)?;
    Ok(format!("{}:{}", namespace, digest(&encoded)))
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Convert a `*`/`?` glob into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut regex_str = String::with_capacity(pattern.len() * 2 + 2);
    regex_str.push('^');

    for c in pattern.chars() {
        match c {
            '*' => regex_str.push_str(".*"),
            '?' => regex_str.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' | '\\' => {
                regex_str.push('\\');
                regex_str.push(c);
            }
            _ => regex_str.push(c),
        }
    }

    regex_str.push('$');
    Regex::new(&regex_str).map_err(|e| CacheError::InvalidPattern(format!("{}: {}", pattern, e)))
}
