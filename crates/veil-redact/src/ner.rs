//! Stage-2 contextual NER redaction.
//!
//! Wraps an abstract [`NerClient`] with the chunking and span-replacement
//! logic the provider needs:
//! - cheap pre-filter probe over the head of the text
//! - chunking at a UTF-8 byte cap, preferring newline boundaries
//! - entity-type allowlist filtering
//! - span replacement in descending begin-offset order
//!
//! Replacing spans back-to-front is a correctness requirement, not an
//! optimization: replacements change lengths, and a front-to-back splice
//! would invalidate every later offset.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use veil_types::errors::VeilError;
use veil_types::redaction::{PiiEntity, RedactionSummary};
use veil_types::traits::NerClient;

/// Maximum UTF-8 byte size submitted to the provider per call, for both the
/// pre-filter probe and each detection chunk.
pub const MAX_CHUNK_BYTES: usize = 4_500;

/// Language code sent to the provider.
const LANGUAGE: &str = "en";

/// Stage-2 redactor: drives a [`NerClient`] over arbitrarily long text.
///
/// The client is shared across concurrent requests; the redactor itself
/// holds no per-request state.
pub struct NerRedactor {
    client: Arc<dyn NerClient>,
    allowed_types: BTreeSet<String>,
}

impl NerRedactor {
    /// Create a redactor restricted to the given entity categories.
    pub fn new<I, S>(client: Arc<dyn NerClient>, allowed_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client,
            allowed_types: allowed_types.into_iter().map(Into::into).collect(),
        }
    }

    /// Redact PII entity spans from `text`.
    ///
    /// Provider failures propagate; no retries happen at this layer. A
    /// provider response that cannot be interpreted leaves the affected
    /// chunk unchanged rather than half-processed.
    pub async fn redact_text(&self, text: &str) -> Result<(String, RedactionSummary), VeilError> {
        if text.is_empty() {
            return Ok((String::new(), RedactionSummary::new()));
        }

        // Pre-filter on the head of the text. No labels means no second
        // round trip.
        let probe = head_bytes(text, MAX_CHUNK_BYTES);
        let labels = self.client.contains_pii(probe, LANGUAGE).await?;
        if labels.is_empty() {
            return Ok((text.to_string(), RedactionSummary::new()));
        }

        let chunks = split_chunks(text, MAX_CHUNK_BYTES);
        let mut summary = RedactionSummary::new();
        let mut redacted = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let entities = self.client.detect_pii(chunk, LANGUAGE).await?;
            let (masked, part) = apply_spans(chunk, &entities, &self.allowed_types);
            summary.absorb(part);
            redacted.push(masked);
        }

        Ok((redacted.join("\n"), summary))
    }
}

/// Largest prefix of `text` that fits in `max` bytes without splitting a
/// character.
fn head_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Split `text` into chunks of at most `max` UTF-8 bytes, preferring
/// newline boundaries. Chunks are rejoined with `\n` after redaction, so a
/// chunk never carries a trailing newline of its own.
fn split_chunks(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.split('\n') {
        if line.len() > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            split_oversize_line(line, max, &mut chunks);
            continue;
        }

        let needed = if current.is_empty() {
            line.len()
        } else {
            current.len() + 1 + line.len()
        };
        if needed > max && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split a single line that exceeds the byte cap at character boundaries.
fn split_oversize_line(line: &str, max: usize, chunks: &mut Vec<String>) {
    let mut rest = line;
    while rest.len() > max {
        let split = byte_safe_split(rest, max);
        chunks.push(rest[..split].to_string());
        rest = &rest[split..];
    }
    chunks.push(rest.to_string());
}

/// Largest character boundary in `text` not exceeding `max` bytes.
fn byte_safe_split(text: &str, max: usize) -> usize {
    let mut split = max;
    while split > 0 && !text.is_char_boundary(split) {
        split -= 1;
    }
    split
}

/// Replace allowlisted entity spans in `chunk` with `[REDACTED:<TYPE>]`.
///
/// Spans are validated before any mutation: an out-of-bounds, inverted, or
/// mid-character offset means the provider response cannot be trusted, and
/// the whole chunk passes through unchanged. Valid spans are applied in
/// descending begin-offset order; spans overlapping an already-replaced
/// region are skipped.
fn apply_spans(
    chunk: &str,
    entities: &[PiiEntity],
    allowed_types: &BTreeSet<String>,
) -> (String, RedactionSummary) {
    let mut summary = RedactionSummary::new();
    let mut spans: Vec<&PiiEntity> = entities
        .iter()
        .filter(|entity| allowed_types.contains(&entity.entity_type))
        .collect();
    if spans.is_empty() {
        return (chunk.to_string(), summary);
    }

    for span in &spans {
        let valid = span.begin_offset < span.end_offset
            && span.end_offset <= chunk.len()
            && chunk.is_char_boundary(span.begin_offset)
            && chunk.is_char_boundary(span.end_offset);
        if !valid {
            warn!(
                entity_type = %span.entity_type,
                begin = span.begin_offset,
                end = span.end_offset,
                "unusable entity span from NER provider, leaving chunk unchanged"
            );
            return (chunk.to_string(), summary);
        }
    }

    spans.sort_by(|a, b| b.begin_offset.cmp(&a.begin_offset));

    let mut masked = chunk.to_string();
    let mut last_begin = chunk.len();
    for span in spans {
        if span.end_offset > last_begin {
            continue;
        }
        masked.replace_range(
            span.begin_offset..span.end_offset,
            &format!("[REDACTED:{}]", span.entity_type),
        );
        summary.record(1, &span.entity_type);
        last_begin = span.begin_offset;
    }

    (masked, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // ── Mock NER client ───────────────────────────────────────

    /// Replays canned labels/entities and records every call.
    struct MockNerClient {
        labels: Vec<String>,
        entities: Vec<PiiEntity>,
        contains_calls: AtomicUsize,
        detect_calls: AtomicUsize,
        detect_inputs: Mutex<Vec<String>>,
    }

    impl MockNerClient {
        fn new(labels: Vec<&str>, entities: Vec<PiiEntity>) -> Self {
            Self {
                labels: labels.into_iter().map(String::from).collect(),
                entities,
                contains_calls: AtomicUsize::new(0),
                detect_calls: AtomicUsize::new(0),
                detect_inputs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NerClient for MockNerClient {
        async fn contains_pii(
            &self,
            _text: &str,
            _language: &str,
        ) -> Result<Vec<String>, VeilError> {
            self.contains_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.labels.clone())
        }

        async fn detect_pii(
            &self,
            text: &str,
            _language: &str,
        ) -> Result<Vec<PiiEntity>, VeilError> {
            self.detect_calls.fetch_add(1, Ordering::SeqCst);
            self.detect_inputs.lock().unwrap().push(text.to_string());
            Ok(self.entities.clone())
        }
    }

    struct FailingNerClient;

    #[async_trait]
    impl NerClient for FailingNerClient {
        async fn contains_pii(
            &self,
            _text: &str,
            _language: &str,
        ) -> Result<Vec<String>, VeilError> {
            Err(VeilError::Ner("provider unavailable".to_string()))
        }

        async fn detect_pii(
            &self,
            _text: &str,
            _language: &str,
        ) -> Result<Vec<PiiEntity>, VeilError> {
            Err(VeilError::Ner("provider unavailable".to_string()))
        }
    }

    fn entity(entity_type: &str, begin: usize, end: usize) -> PiiEntity {
        PiiEntity {
            entity_type: entity_type.to_string(),
            begin_offset: begin,
            end_offset: end,
        }
    }

    fn redactor(client: Arc<dyn NerClient>) -> NerRedactor {
        NerRedactor::new(client, crate::profile::DEFAULT_ENTITY_TYPES.iter().copied())
    }

    // ── Pre-filter ────────────────────────────────────────────

    #[tokio::test]
    async fn test_no_labels_short_circuits_detection() {
        let client = Arc::new(MockNerClient::new(vec![], vec![]));
        let redactor = redactor(client.clone());

        let (masked, summary) = redactor.redact_text("Alice went home").await.unwrap();
        assert_eq!(masked, "Alice went home");
        assert!(summary.is_empty());
        assert_eq!(client.contains_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.detect_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_probe_failure_propagates() {
        let redactor = redactor(Arc::new(FailingNerClient));
        let err = redactor.redact_text("anything").await.unwrap_err();
        assert!(matches!(err, VeilError::Ner(_)));
    }

    // ── Span replacement ──────────────────────────────────────

    #[tokio::test]
    async fn test_spans_replaced_with_type_markers() {
        let text = "Alice met Bob";
        let client = Arc::new(MockNerClient::new(
            vec!["NAME"],
            vec![entity("NAME", 0, 5), entity("NAME", 10, 13)],
        ));
        let redactor = redactor(client);

        let (masked, summary) = redactor.redact_text(text).await.unwrap();
        assert_eq!(masked, "[REDACTED:NAME] met [REDACTED:NAME]");
        assert_eq!(summary.count, 2);
        assert!(summary.types.contains("NAME"));
    }

    #[tokio::test]
    async fn test_reverse_order_survives_length_changes() {
        // The replacement marker is much longer than either span. A
        // front-to-back implementation would shift the second span into the
        // middle of the first marker.
        let text = "ip 10.0.0.1 user bob";
        let client = Arc::new(MockNerClient::new(
            vec!["IP_ADDRESS", "USERNAME"],
            vec![entity("IP_ADDRESS", 3, 11), entity("USERNAME", 17, 20)],
        ));
        let redactor = redactor(client);

        let (masked, _) = redactor.redact_text(text).await.unwrap();
        assert_eq!(masked, "ip [REDACTED:IP_ADDRESS] user [REDACTED:USERNAME]");
    }

    #[tokio::test]
    async fn test_allowlist_filters_entity_types() {
        let text = "Alice met Bob";
        let client = Arc::new(MockNerClient::new(
            vec!["NAME"],
            vec![entity("NAME", 0, 5), entity("CUSTOM_TYPE", 10, 13)],
        ));
        let redactor = NerRedactor::new(client, ["NAME"]);

        let (masked, summary) = redactor.redact_text(text).await.unwrap();
        assert_eq!(masked, "[REDACTED:NAME] met Bob");
        assert_eq!(summary.count, 1);
        assert!(!summary.types.contains("CUSTOM_TYPE"));
    }

    #[tokio::test]
    async fn test_invalid_span_leaves_chunk_unchanged() {
        let text = "Alice met Bob";
        let client = Arc::new(MockNerClient::new(
            vec!["NAME"],
            vec![entity("NAME", 0, 5), entity("NAME", 10, 99)],
        ));
        let redactor = redactor(client);

        let (masked, summary) = redactor.redact_text(text).await.unwrap();
        assert_eq!(masked, text);
        assert!(summary.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_spans_applied_once() {
        let text = "Alice Smith called";
        let client = Arc::new(MockNerClient::new(
            vec!["NAME"],
            vec![entity("NAME", 0, 11), entity("NAME", 6, 11)],
        ));
        let redactor = redactor(client);

        let (masked, summary) = redactor.redact_text(text).await.unwrap();
        assert_eq!(masked, "Alice [REDACTED:NAME] called");
        assert_eq!(summary.count, 1);
    }

    // ── Chunking ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_long_text_is_chunked_and_rejoined() {
        // 46 lines x 100 ASCII characters, newline-joined: two chunks.
        let line = "x".repeat(100);
        let text = vec![line; 46].join("\n");
        assert!(text.len() > MAX_CHUNK_BYTES);

        let client = Arc::new(MockNerClient::new(vec!["NAME"], vec![]));
        let redactor = redactor(client.clone());

        let (masked, summary) = redactor.redact_text(&text).await.unwrap();
        assert!(client.detect_calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(masked, text);
        assert!(summary.is_empty());

        for input in client.detect_inputs.lock().unwrap().iter() {
            assert!(input.len() <= MAX_CHUNK_BYTES);
        }
    }

    #[test]
    fn test_split_prefers_newline_boundaries() {
        let text = format!("{}\n{}\n{}", "a".repeat(30), "b".repeat(30), "c".repeat(30));
        let chunks = split_chunks(&text, 70);
        assert_eq!(chunks, vec![format!("{}\n{}", "a".repeat(30), "b".repeat(30)), "c".repeat(30)]);
    }

    #[test]
    fn test_oversize_line_split_at_byte_cap() {
        let line = "y".repeat(25);
        let chunks = split_chunks(&line, 10);
        assert_eq!(chunks, vec!["y".repeat(10), "y".repeat(10), "y".repeat(5)]);
    }

    #[test]
    fn test_split_never_breaks_characters() {
        // Three-byte characters that never align with the cap.
        let line = "€".repeat(20);
        let chunks = split_chunks(&line, 10);
        for chunk in &chunks {
            assert!(chunk.len() <= 10);
            assert_eq!(chunk.len() % 3, 0);
        }
        assert_eq!(chunks.concat(), line);
    }

    #[test]
    fn test_blank_lines_survive_round_trip() {
        let text = "first\n\nthird\n";
        let chunks = split_chunks(text, 100);
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn test_head_bytes_respects_char_boundary() {
        let text = format!("{}€tail", "a".repeat(4_499));
        let head = head_bytes(&text, MAX_CHUNK_BYTES);
        assert_eq!(head.len(), 4_499);
    }
}
