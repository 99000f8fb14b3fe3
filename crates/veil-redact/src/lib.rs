/// PII redaction engine for the veil proxy.
///
/// Two stages, composed by the middleware layer:
/// - **Pattern engine** (`patterns`, `walker`): deterministic regex matching
///   and masking for cards, IBANs, SSNs, emails, and phones, plus a
///   recursive walker over JSON-shaped data
/// - **NER wrapper** (`ner`): chunking, cheap pre-filter, and span-based
///   replacement driven by a contextual PII detection provider
/// - **Profile registry** (`profile`): named compliance profiles selecting
///   which stages and entity categories are active
pub mod ner;
pub mod patterns;
pub mod profile;
pub mod walker;

pub use ner::{NerRedactor, MAX_CHUNK_BYTES};
pub use patterns::PatternEngine;
pub use profile::{get_profile, ComplianceProfile, DEFAULT_ENTITY_TYPES};
