//! Log redaction for identifiers and signing material.
//!
//! Requests carry clinical values only, but upstream callers sometimes pass
//! identifiers in free-text fields, and the signing tool handles private
//! seeds. Every formatted log line passes through [`redact`] before it reaches
//! the sink.
//!
//! Redaction is line-based and capped at `PARTUS_REDACT_MAX_BYTES`
//! (default 16 KiB) per line.

use std::sync::OnceLock;

use regex::{Regex, RegexSet};
use tracing_subscriber::fmt::MakeWriter;

const DEFAULT_MAX_BYTES: usize = 16 * 1024;

struct Rules {
    set: RegexSet,
    rules: Vec<(Regex, &'static str)>,
}

static RULES: OnceLock<Option<Rules>> = OnceLock::new();

const PATTERNS: &[(&str, &str)] = &[
    (
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        "[REDACTED-UUID]",
    ),
    (r"\bMRN[:\s]?\d{6,10}\b", "[REDACTED-MRN]"),
    (
        r"(?i)\b[a-z0-9][a-z0-9._%+-]{0,62}@(?:[a-z0-9-]{1,63}\.)+[a-z]{2,}\b",
        "[REDACTED-EMAIL]",
    ),
    (
        r"(?i)\b(?:seed|private[_-]?key|secret|signing[_-]?key)\b\s*[:=]\s*[A-Za-z0-9+/]{32,}={0,2}",
        "[REDACTED-SECRET]",
    ),
    (r"\b[0-9a-fA-F]{64,}\b", "[REDACTED-KEY]"),
];

fn rules() -> Option<&'static Rules> {
    RULES
        .get_or_init(|| {
            let set = RegexSet::new(PATTERNS.iter().map(|(p, _)| *p)).ok()?;
            let rules = PATTERNS
                .iter()
                .map(|(p, r)| Regex::new(p).map(|re| (re, *r)))
                .collect::<Result<Vec<_>, _>>()
                .ok()?;
            Some(Rules { set, rules })
        })
        .as_ref()
}

fn max_bytes() -> usize {
    std::env::var("PARTUS_REDACT_MAX_BYTES")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_MAX_BYTES)
}

fn truncate(input: &str, max: usize) -> (&str, bool) {
    if input.len() <= max {
        return (input, false);
    }
    let mut end = max;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

/// Replace identifiers and key material in one log line.
#[must_use]
pub fn redact(input: &str) -> String {
    redact_with_limit(input, max_bytes())
}

fn redact_with_limit(input: &str, max: usize) -> String {
    let (prefix, truncated) = truncate(input, max);
    let mut out = match rules() {
        Some(rules) => {
            let mut line = prefix.to_string();
            for idx in rules.set.matches(prefix).into_iter() {
                let (re, replacement) = &rules.rules[idx];
                line = re.replace_all(&line, *replacement).into_owned();
            }
            line
        }
        // Patterns are static; this only happens if the regex engine rejects them.
        None => "[REDACTION UNAVAILABLE]".to_string(),
    };
    if truncated {
        out.push_str(" [TRUNCATED]");
    }
    out
}

/// `MakeWriter` wrapper that redacts each formatted line.
#[derive(Debug, Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
}

impl<M> RedactingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

pub struct RedactingWriter<W: std::io::Write> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W: std::io::Write> RedactingWriter<W> {
    fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        let text = String::from_utf8_lossy(line);
        self.inner.write_all(redact(&text).as_bytes())
    }

    fn drain_lines(&mut self) -> std::io::Result<()> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.write_line(&line)?;
        }
        Ok(())
    }
}

impl<W: std::io::Write> std::io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() > max_bytes().saturating_mul(2) {
            let pending = std::mem::take(&mut self.buffer);
            self.write_line(&pending)?;
            self.inner.write_all(b"\n")?;
            return Ok(buf.len());
        }
        self.drain_lines()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.drain_lines()?;
        if !self.buffer.is_empty() {
            let pending = std::mem::take(&mut self.buffer);
            self.write_line(&pending)?;
        }
        self.inner.flush()
    }
}

impl<W: std::io::Write> Drop for RedactingWriter<W> {
    fn drop(&mut self) {
        let _ = std::io::Write::flush(self);
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
            buffer: Vec::new(),
        }
    }
}
