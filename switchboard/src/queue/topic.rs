//! Topic exchange routing rules.
//!
//! RabbitMQ does the actual routing. The consumer uses these rules to
//! reject malformed binding patterns before touching the broker and to
//! report which of its bindings a delivery matched.

use thiserror::Error;
use tracing::warn;

/// AMQP short strings are limited to 255 bytes.
pub const MAX_TOPIC_LEN: usize = 255;

/// Why a routing key or binding pattern was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("empty")]
    Empty,

    #[error("{0} bytes exceeds the {} byte limit", MAX_TOPIC_LEN)]
    TooLong(usize),
}

/// Check a binding pattern.
///
/// A `*` or `#` sharing a segment with other characters (`log.*x`) is not a
/// wildcard; the broker matches it as a literal word, so it is accepted with
/// a warning.
pub fn validate_pattern(pattern: &str) -> Result<(), TopicError> {
    if pattern.is_empty() {
        return Err(TopicError::Empty);
    }
    if pattern.len() > MAX_TOPIC_LEN {
        return Err(TopicError::TooLong(pattern.len()));
    }
    for segment in pattern.split('.') {
        if segment.len() > 1 && (segment.contains('*') || segment.contains('#')) {
            warn!(pattern, segment, "topic_literal_wildcard_segment");
        }
    }
    Ok(())
}

/// Check a routing key used for publishing.
pub fn validate_routing_key(key: &str) -> Result<(), TopicError> {
    if key.len() > MAX_TOPIC_LEN {
        return Err(TopicError::TooLong(key.len()));
    }
    Ok(())
}

/// Whether `key` is routed to a binding with `pattern`.
///
/// `*` matches exactly one segment, `#` matches zero or more.
pub fn matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    match_segments(&pattern, &key)
}

fn match_segments(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.split_first(), key.split_first()) {
        (None, None) => true,
        (Some((&"#", rest)), _) => {
            match_segments(rest, key) || (!key.is_empty() && match_segments(pattern, &key[1..]))
        }
        (Some((&"*", rest)), Some((_, key_rest))) => match_segments(rest, key_rest),
        (Some((segment, rest)), Some((word, key_rest))) if segment == word => {
            match_segments(rest, key_rest)
        }
        _ => false,
    }
}

/// Patterns among `patterns` that route `key`.
pub fn matching<'a>(patterns: &'a [String], key: &'a str) -> impl Iterator<Item = &'a str> {
    patterns
        .iter()
        .map(String::as_str)
        .filter(move |pattern| matches(pattern, key))
}
