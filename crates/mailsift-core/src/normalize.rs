//! Message body normalization: markup extraction, boilerplate stripping and
//! chunking.
//!
//! The heuristics live behind [`CleanStrategy`] so they can be swapped
//! without touching the pipeline. [`DefaultStrategy`] is regex based and
//! best-effort: it may over- or under-strip unusual mail.
//!
//! ```rust
//! use mailsift_core::normalize::Normalizer;
//!
//! let normalizer = Normalizer::new(1000).unwrap();
//! let chunks = normalizer.normalize(Some("Hi Alice\n\n--\nBob"));
//! assert_eq!(chunks, vec!["Hi Alice".to_string()]);
//! assert!(normalizer.normalize(None).is_empty());
//! ```

use anyhow::{Context, Result};
use regex::Regex;

use crate::chunk::chunk_text;
use crate::html;
use crate::models::{ProcessedMessage, RawMessage};

/// Chunk size used when nothing else is configured.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 1000;

/// Pluggable cleaning heuristics.
pub trait CleanStrategy: Send + Sync {
    /// Whether `text` should go through markup extraction.
    fn is_markup(&self, text: &str) -> bool;

    /// Readable text of a markup body. Empty when nothing is extractable.
    fn extract_markup(&self, html: &str) -> String;

    /// Remove quoting, signatures and other mail noise from plain text.
    fn strip_boilerplate(&self, text: &str) -> String;
}

/// Regex-driven heuristics for typical email bodies.
pub struct DefaultStrategy {
    tag: Regex,
    many_newlines: Regex,
    many_spaces: Regex,
    signature: Regex,
    reply_header: Regex,
    url: Regex,
}

impl DefaultStrategy {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tag: compile(r"</?[a-zA-Z][a-zA-Z0-9]*(\s[^<>]*)?/?>")?,
            many_newlines: compile(r"\n{3,}")?,
            many_spaces: compile(r" {2,}")?,
            signature: compile(r"(?m)^--+[ \t]*$")?,
            reply_header: compile(r"On\s.*?\swrote:")?,
            url: compile(r"https?://\S+")?,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("Invalid pattern: {}", pattern))
}

impl CleanStrategy for DefaultStrategy {
    fn is_markup(&self, text: &str) -> bool {
        self.tag.is_match(text)
    }

    fn extract_markup(&self, markup: &str) -> String {
        let main = html::extract_main_text(markup);
        if !main.trim().is_empty() {
            return main;
        }
        html::strip_markup(markup)
    }

    fn strip_boilerplate(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n");
        let text = self.many_newlines.replace_all(&text, "\n\n");
        let mut text = self.many_spaces.replace_all(&text, " ").into_owned();

        if let Some(m) = self.signature.find(&text) {
            text.truncate(m.start());
        }
        if let Some(m) = self.reply_header.find(&text) {
            text.truncate(m.start());
        }

        let text = self.url.replace_all(&text, "[URL]");
        text.trim().to_string()
    }
}

/// Turns raw bodies into bounded chunks.
pub struct Normalizer<S: CleanStrategy = DefaultStrategy> {
    strategy: S,
    max_chunk_chars: usize,
}

impl Normalizer<DefaultStrategy> {
    pub fn new(max_chunk_chars: usize) -> Result<Self> {
        Ok(Self::with_strategy(DefaultStrategy::new()?, max_chunk_chars))
    }
}

impl<S: CleanStrategy> Normalizer<S> {
    pub fn with_strategy(strategy: S, max_chunk_chars: usize) -> Self {
        Self {
            strategy,
            max_chunk_chars: max_chunk_chars.max(1),
        }
    }

    pub fn max_chunk_chars(&self) -> usize {
        self.max_chunk_chars
    }

    /// Cleaned text of a body, before chunking.
    ///
    /// Bodies containing NUL bytes are treated as binary and yield `""`.
    pub fn clean(&self, raw: &str) -> String {
        if raw.contains('\0') || raw.trim().is_empty() {
            return String::new();
        }
        let text = if self.strategy.is_markup(raw) {
            self.strategy.extract_markup(raw)
        } else {
            raw.to_string()
        };
        self.strategy.strip_boilerplate(&text)
    }

    /// Clean and chunk a body. `None` and empty input give no chunks.
    pub fn normalize(&self, raw: Option<&str>) -> Vec<String> {
        match raw {
            Some(body) => chunk_text(&self.clean(body), self.max_chunk_chars),
            None => Vec::new(),
        }
    }

    /// Like [`normalize`](Self::normalize) for undecoded bytes. Invalid UTF-8
    /// is treated as the empty string.
    pub fn normalize_bytes(&self, raw: &[u8]) -> Vec<String> {
        match std::str::from_utf8(raw) {
            Ok(body) => self.normalize(Some(body)),
            Err(_) => Vec::new(),
        }
    }

    pub fn process(&self, message: &RawMessage) -> ProcessedMessage {
        ProcessedMessage {
            message_id: message.id.clone(),
            chunks: self.normalize(Some(&message.body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(DEFAULT_MAX_CHUNK_CHARS).unwrap()
    }

    #[test]
    fn test_reply_and_signature_removed() {
        let body = "Hi Alice\n\nThanks.\n\nOn Wed wrote:\n> old stuff\n\n--\nBob\nbob@x.com";
        let chunks = normalizer().normalize(Some(body));
        let joined = chunks.join("\n");
        assert!(joined.contains("Hi Alice"));
        assert!(joined.contains("Thanks"));
        assert!(!joined.contains("old stuff"));
        assert!(!joined.contains("bob@x.com"));
    }

    #[test]
    fn test_html_body_extracted() {
        let body = "<html><body><p>Dear Team</p><p>Revenue up 15%</p></body></html>";
        let chunks = normalizer().normalize(Some(body));
        let joined = chunks.join("\n");
        assert!(joined.contains("Dear Team"));
        assert!(joined.contains("Revenue up 15%"));
        let tag = Regex::new(r"<\s*[a-zA-Z]+[^>]*>").unwrap();
        assert!(!tag.is_match(&joined));
    }

    #[test]
    fn test_html_falls_back_to_all_text() {
        let body = "<html><body><header>Only chrome here</header></body></html>";
        assert_eq!(normalizer().clean(body), "Only chrome here");
    }

    #[test]
    fn test_empty_inputs() {
        let n = normalizer();
        assert!(n.normalize(None).is_empty());
        assert!(n.normalize(Some("")).is_empty());
        assert!(n.normalize(Some("  \n\n\t")).is_empty());
        assert!(n.normalize(Some("<html><body></body></html>")).is_empty());
    }

    #[test]
    fn test_binary_bodies_are_empty() {
        let n = normalizer();
        assert!(n.normalize(Some("abc\0def")).is_empty());
        assert!(n.normalize_bytes(&[0xff, 0xfe, 0x41]).is_empty());
        assert_eq!(n.normalize_bytes(b"plain words"), vec!["plain words".to_string()]);
    }

    #[test]
    fn test_whitespace_collapsed() {
        let cleaned = normalizer().clean("a    b\n\n\n\n\nc");
        assert_eq!(cleaned, "a b\n\nc");
    }

    #[test]
    fn test_urls_replaced() {
        let cleaned = normalizer().clean("See https://example.com/x?y=1 and http://a.b now");
        assert_eq!(cleaned, "See [URL] and [URL] now");
    }

    #[test]
    fn test_signature_needs_own_line() {
        let cleaned = normalizer().clean("range 1--2 is fine\nkeep this");
        assert_eq!(cleaned, "range 1--2 is fine\nkeep this");
        let cleaned = normalizer().clean("body\n-- \nsig");
        assert_eq!(cleaned, "body");
    }

    #[test]
    fn test_plain_text_with_angle_brackets_not_markup() {
        let n = normalizer();
        assert!(!n.strategy.is_markup("x < y and y > z"));
        assert!(n.strategy.is_markup("<p>hi</p>"));
        assert!(n.strategy.is_markup("line<br/>break"));
        assert!(!n.strategy.is_markup("Bob <bob@example.com>"));
        assert_eq!(n.clean("x < y and y > z"), "x < y and y > z");
    }

    #[test]
    fn test_chunks_bounded() {
        let n = Normalizer::new(100).unwrap();
        let body = "word ".repeat(500);
        let chunks = n.normalize(Some(&body));
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn test_process_keeps_message_id() {
        let msg = RawMessage {
            id: "42".to_string(),
            subject: "s".to_string(),
            sender: "a@b".to_string(),
            recipient: "c@d".to_string(),
            date: String::new(),
            body: "Hello there".to_string(),
        };
        let processed = normalizer().process(&msg);
        assert_eq!(processed.message_id, "42");
        assert_eq!(processed.chunks, vec!["Hello there".to_string()]);
    }

    struct UpperOnly;

    impl CleanStrategy for UpperOnly {
        fn is_markup(&self, _text: &str) -> bool {
            false
        }
        fn extract_markup(&self, html: &str) -> String {
            html.to_string()
        }
        fn strip_boilerplate(&self, text: &str) -> String {
            text.to_uppercase()
        }
    }

    #[test]
    fn test_custom_strategy() {
        let n = Normalizer::with_strategy(UpperOnly, 1000);
        assert_eq!(n.normalize(Some("abc")), vec!["ABC".to_string()]);
    }
}
