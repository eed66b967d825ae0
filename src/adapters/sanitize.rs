//! Log sanitization utilities for PII filtering.
//!
//! String-based redaction applied to log output before it reaches disk or
//! stdout: patient codes, medical record numbers, email addresses and phone
//! numbers. The primary protection is keeping PII out of logging calls in
//! the first place; this layer catches what slips through.
//!
//! `sanitize()` enforces a maximum input size to bound the cost of scanning
//! maliciously large log lines.

use regex::Regex;
use std::sync::OnceLock;
use tracing_subscriber::fmt::MakeWriter;

static PII_PATTERNS: OnceLock<Vec<PiiPattern>> = OnceLock::new();

/// Maximum number of bytes to sanitize per call.
const SANITIZE_MAX_BYTES: usize = 16 * 1024;

struct PiiPattern {
    regex: Regex,
    replacement: &'static str,
}

fn patterns() -> &'static Vec<PiiPattern> {
    PII_PATTERNS.get_or_init(|| {
        let compile = |pattern: &str, replacement: &'static str| PiiPattern {
            regex: Regex::new(pattern).expect("static PII pattern must compile"),
            replacement,
        };
        vec![
            // External patient codes, e.g. PAT-0042
            compile(r"(?i)\bPAT-?\d{3,}\b", "[PATIENT_CODE]"),
            // Medical record numbers, e.g. MRN 123456 / MRN-123456
            compile(r"(?i)\bMRN[-: ]?\d{4,}\b", "[MRN]"),
            // Email addresses
            compile(
                r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
                "[EMAIL]",
            ),
            // Labeled phone numbers; an unanchored digit pattern would eat
            // log timestamps.
            compile(r"(?i)\b(phone\s*[:=]\s*)\+?\d[\d\s().-]{5,}\d", "$1[PHONE]"),
        ]
    })
}

fn truncate_to_char_boundary(input: &str, max_bytes: usize) -> (&str, bool) {
    if input.len() <= max_bytes {
        return (input, false);
    }
    let mut end = max_bytes.min(input.len());
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

/// Redact PII patterns from `input`.
#[must_use]
pub fn sanitize(input: &str) -> String {
    let (slice, truncated) = truncate_to_char_boundary(input, SANITIZE_MAX_BYTES);

    let mut output = slice.to_string();
    for pattern in patterns() {
        output = pattern
            .regex
            .replace_all(&output, pattern.replacement)
            .into_owned();
    }
    if truncated {
        output.push_str("…[TRUNCATED]");
    }
    output
}

/// A `MakeWriter` wrapper that sanitizes every log line before writing.
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    /// Wrap an existing writer factory.
    pub fn new(inner: M) -> Self {
        Self { inner }
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
        }
    }
}

/// Writer that applies [`sanitize`] to each buffer before forwarding.
pub struct SanitizingWriter<W> {
    inner: W,
}

impl<W: std::io::Write> std::io::Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let clean = sanitize(&text);
        self.inner.write_all(clean.as_bytes())?;
        // Report the original length so callers never see a short write.
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_code_redacted() {
        let clean = sanitize("registered patient PAT-0042 today");
        assert!(!clean.contains("PAT-0042"));
        assert!(clean.contains("[PATIENT_CODE]"));
    }

    #[test]
    fn test_mrn_and_email_redacted() {
        let clean = sanitize("MRN 123456 reachable at alex@example.org");
        assert!(clean.contains("[MRN]"));
        assert!(clean.contains("[EMAIL]"));
        assert!(!clean.contains("example.org"));
    }

    #[test]
    fn test_plain_text_and_timestamps_untouched() {
        let message = "2026-08-05T12:34:56Z prediction PNEUMONIA at confidence 0.88";
        assert_eq!(sanitize(message), message);
    }

    #[test]
    fn test_labeled_phone_redacted() {
        let clean = sanitize("contact phone: +1 (555) 010-0199 on file");
        assert!(clean.contains("phone: [PHONE]"));
        assert!(!clean.contains("555"));
    }

    #[test]
    fn test_oversized_input_truncates_on_char_boundary() {
        let input = "é".repeat(SANITIZE_MAX_BYTES); // 2 bytes each
        let clean = sanitize(&input);
        assert!(clean.ends_with("…[TRUNCATED]"));
    }
}
