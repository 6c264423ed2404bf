//! Log sanitization for clinical values and identifiers.
//!
//! Formatted log lines pass through [`SanitizingMakeWriter`] before they
//! reach the sink. It redacts:
//! - raw clinical feature values written as `column=value` or `column: value`
//!   (`chol=240`, `thalach: 150`)
//! - identifiers a caller might attach to a session: UUIDs, MRNs, SSN-like
//!   numbers, email addresses, phone numbers
//!
//! Aggregate fields such as `label`, `risk` or row counts are left alone.
//!
//! Call sites should still avoid logging raw observations; this is the
//! backstop. Input is capped (`PULSEWATCH_SANITIZE_MAX_BYTES`, default
//! 16 KiB) so a runaway log line cannot stall the writer.

use regex::{Regex, RegexSet};
use std::sync::OnceLock;
use tracing_subscriber::fmt::MakeWriter;

use crate::domain::FEATURE_COLUMNS;

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

const DEFAULT_SANITIZE_MAX_BYTES: usize = 16 * 1024;

struct Rule {
    regex: Regex,
    replacement: &'static str,
}

struct Patterns {
    any: RegexSet,
    rules: Vec<Rule>,
}

fn max_sanitize_bytes() -> usize {
    std::env::var("PULSEWATCH_SANITIZE_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_SANITIZE_MAX_BYTES)
}

fn truncate_to_char_boundary(input: &str, max_bytes: usize) -> (&str, bool) {
    if input.len() <= max_bytes {
        return (input, false);
    }
    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| {
        // Feature values, keyed by record column name. `$1` keeps the key and separator.
        let feature_values = format!(
            r"(?i)\b((?:{})\s*[=:]\s*)-?[0-9]+(?:\.[0-9]+)?",
            FEATURE_COLUMNS.join("|")
        );

        let sources: Vec<(String, &'static str)> = vec![
            (feature_values, "${1}[REDACTED]"),
            (
                r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}".into(),
                "[REDACTED-UUID]",
            ),
            (r"\bMRN[:\s]?\d{6,10}\b".into(), "[REDACTED-MRN]"),
            (r"\b\d{3}-\d{2}-\d{4}\b".into(), "[REDACTED-SSN]"),
            (
                r"(?i)\b[a-z0-9](?:[a-z0-9._%+-]{0,62}[a-z0-9])?@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}\b".into(),
                "[REDACTED-EMAIL]",
            ),
            (
                r"\b(?:\+?1[-.\s]?)?\(?[0-9]{3}\)?[-.\s][0-9]{3}[-.\s][0-9]{4}\b".into(),
                "[REDACTED-PHONE]",
            ),
        ];

        // Patterns are compile-time constants; failure here is a programming error.
        let any = RegexSet::new(sources.iter().map(|(p, _)| p.as_str())).expect("Valid regex set");
        let rules = sources
            .iter()
            .map(|(p, replacement)| Rule {
                regex: Regex::new(p).expect("Valid regex"),
                replacement,
            })
            .collect();

        Patterns { any, rules }
    })
}

/// Redact clinical values and identifiers from `input`.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_with_limit(input, max_sanitize_bytes())
}

fn sanitize_with_limit(input: &str, max_bytes: usize) -> String {
    let patterns = patterns();
    let (prefix, truncated) = truncate_to_char_boundary(input, max_bytes);

    let mut result = prefix.to_string();
    for idx in patterns.any.matches(prefix).into_iter() {
        let rule = &patterns.rules[idx];
        result = rule.regex.replace_all(&result, rule.replacement).into_owned();
    }

    if truncated {
        result.push_str(" [TRUNCATED]");
    }
    result
}

/// Check whether `input` would be altered by [`sanitize`].
#[must_use]
pub fn contains_sensitive(input: &str) -> bool {
    let (prefix, _) = truncate_to_char_boundary(input, max_sanitize_bytes());
    patterns().any.is_match(prefix)
}

/// A `tracing_subscriber` writer wrapper that sanitizes each formatted line
/// before it is written to the underlying sink.
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

/// Line-buffering writer produced by [`SanitizingMakeWriter`].
pub struct SanitizingWriter<W: std::io::Write> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W: std::io::Write> SanitizingWriter<W> {
    fn write_sanitized(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let text = String::from_utf8_lossy(bytes);
        self.inner.write_all(sanitize(&text).as_bytes())
    }

    fn flush_lines(&mut self) -> std::io::Result<()> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.write_sanitized(&line)?;
        }
        Ok(())
    }
}

impl<W: std::io::Write> std::io::Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        // A line with no newline in sight: sanitize what we have rather than buffer forever.
        if self.buffer.len() > max_sanitize_bytes().saturating_mul(2) {
            let pending = std::mem::take(&mut self.buffer);
            self.write_sanitized(&pending)?;
            self.inner.write_all(b"\n")?;
            return Ok(buf.len());
        }

        self.flush_lines()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_lines()?;
        if !self.buffer.is_empty() {
            let pending = std::mem::take(&mut self.buffer);
            self.write_sanitized(&pending)?;
        }
        self.inner.flush()
    }
}

impl<W: std::io::Write> Drop for SanitizingWriter<W> {
    fn drop(&mut self) {
        let _ = std::io::Write::flush(self);
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter {
            inner: self.inner.make_writer(),
            buffer: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_redacts_feature_values() {
        let out = sanitize("assessing chol=240 thalach: 150 oldpeak=2.3");
        assert_eq!(
            out,
            "assessing chol=[REDACTED] thalach: [REDACTED] oldpeak=[REDACTED]"
        );
    }

    #[test]
    fn test_keeps_aggregate_fields() {
        let line = "Assessment complete: label=1 risk=High rows=12";
        assert_eq!(sanitize(line), line);
        assert!(!contains_sensitive(line));
    }

    #[test]
    fn test_redacts_identifiers() {
        let out = sanitize("session 550e8400-e29b-41d4-a716-446655440000 MRN:12345678 nurse@hospital.org");
        assert!(out.contains("[REDACTED-UUID]"));
        assert!(out.contains("[REDACTED-MRN]"));
        assert!(out.contains("[REDACTED-EMAIL]"));
        assert!(!out.contains("550e8400"));
    }

    #[test]
    fn test_truncates_large_inputs() {
        let out = sanitize_with_limit("prefix age=70 and more text", 10);
        assert!(out.ends_with("[TRUNCATED]"));
    }

    #[test]
    fn test_writer_sanitizes_per_line() {
        let mut sink = Vec::new();
        {
            let mut writer = SanitizingWriter {
                inner: &mut sink,
                buffer: Vec::new(),
            };
            writer.write_all(b"age=45 ").expect("Should write");
            writer.write_all(b"label=0\nsecond").expect("Should write");
        }
        assert_eq!(
            String::from_utf8(sink).expect("Should be utf8"),
            "age=[REDACTED] label=0\nsecond"
        );
    }
}
