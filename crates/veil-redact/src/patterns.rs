//! Stage-1 deterministic pattern engine.
//!
//! Masks payment-card numbers, IBANs, US SSNs, email addresses, and
//! international phone numbers. Patterns are compiled once at construction
//! and applied in a fixed order with global replacement; each pattern
//! observes the output of the previous one, so the order is part of the
//! observable behavior and must not change.
//!
//! A mask function may decline a match (Luhn failure, IBAN shorter than 15
//! characters, phone with fewer than 8 digits). Declined matches are left
//! untouched and are not counted, so the summary never reports false
//! positives.

use regex::Regex;

use veil_types::redaction::RedactionSummary;

/// A single stage-1 pattern: category tag, compiled regex, and mask function.
struct PiiPattern {
    /// Category tag recorded in the redaction summary (e.g. "credit_card").
    tag: &'static str,
    /// Compiled regex for matching candidates.
    regex: Regex,
    /// Computes the replacement. `None` declines the match, leaving the text
    /// untouched and unreported.
    mask: fn(&str) -> Option<String>,
}

/// Deterministic matcher and masker for the fixed stage-1 pattern set.
///
/// Compiles all regexes once at construction time. The engine is read-only
/// after that and safe to share across concurrent requests; it never fails
/// at runtime.
pub struct PatternEngine {
    patterns: Vec<PiiPattern>,
}

impl PatternEngine {
    /// Create an engine with the built-in pattern table.
    pub fn new() -> Self {
        let patterns = vec![
            // Four groups of four digits, optionally separated by a dash or
            // a space. Only Luhn-valid 16-digit runs are masked.
            PiiPattern {
                tag: "credit_card",
                regex: compile_regex(r"\b\d{4}[ \-]?\d{4}[ \-]?\d{4}[ \-]?\d{4}\b"),
                mask: mask_credit_card,
            },
            // Two uppercase letters, two digits, then 4-30 uppercase
            // alphanumerics. Candidates shorter than 15 characters total are
            // left untouched.
            PiiPattern {
                tag: "iban",
                regex: compile_regex(r"\b[A-Z]{2}\d{2}[A-Z0-9]{4,30}\b"),
                mask: mask_iban,
            },
            // US Social Security Number, DDD-DD-DDDD.
            PiiPattern {
                tag: "ssn",
                regex: compile_regex(r"\b\d{3}-\d{2}-\d{4}\b"),
                mask: mask_ssn,
            },
            // RFC-simplified email: local part, '@', domain with a TLD of at
            // least two letters.
            PiiPattern {
                tag: "email",
                regex: compile_regex(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b"),
                mask: mask_email,
            },
            // '+', 1-3 country digits, then 8 or more digits interleaved
            // with space, dot, or dash separators.
            PiiPattern {
                tag: "phone",
                regex: compile_regex(r"\+\d{1,3}(?:[ .\-]?\d){8,}\b"),
                mask: mask_phone,
            },
        ];

        Self { patterns }
    }

    /// Apply every pattern to `input` in table order with global replacement.
    ///
    /// Returns the masked string and a summary of what changed. The count is
    /// the exact number of replacements made; a tag appears in the summary
    /// only when its mask changed at least one value.
    pub fn redact_string(&self, input: &str) -> (String, RedactionSummary) {
        let mut summary = RedactionSummary::new();
        let mut text = input.to_string();

        for pattern in &self.patterns {
            let mut replaced = 0usize;
            let masked = pattern
                .regex
                .replace_all(&text, |caps: &regex::Captures<'_>| {
                    let matched = &caps[0];
                    match (pattern.mask)(matched) {
                        Some(mask) => {
                            replaced += 1;
                            mask
                        }
                        None => matched.to_string(),
                    }
                })
                .into_owned();
            text = masked;
            summary.record(replaced, pattern.tag);
        }

        (text, summary)
    }
}

impl Default for PatternEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile a regex pattern, panicking on invalid patterns.
///
/// Only called from `PatternEngine::new()`; a panic here is a bug in the
/// pattern table, not a runtime failure.
fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid PII pattern '{pattern}': {e}"))
}

/// Mask a card-number candidate.
///
/// Strips separators and accepts only Luhn-valid 16-digit runs. The mask
/// keeps the separator style of the original and its last four digits:
/// `****<sep>****<sep>****<sep><last4>`.
fn mask_credit_card(matched: &str) -> Option<String> {
    let digits: String = matched.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 16 || !luhn_valid(&digits) {
        return None;
    }

    let sep = if matched.contains('-') {
        "-"
    } else if matched.contains(' ') {
        " "
    } else {
        ""
    };
    Some(format!("****{sep}****{sep}****{sep}{}", &digits[12..]))
}

/// Mask an IBAN candidate of at least 15 characters: first four characters,
/// `****`, last four characters.
fn mask_iban(matched: &str) -> Option<String> {
    if matched.len() < 15 {
        return None;
    }
    Some(format!(
        "{}****{}",
        &matched[..4],
        &matched[matched.len() - 4..]
    ))
}

/// Mask an SSN. Always `***-**-****`.
fn mask_ssn(_matched: &str) -> Option<String> {
    Some("***-**-****".to_string())
}

/// Mask an email address: first character of the local part, `***@`, domain.
fn mask_email(matched: &str) -> Option<String> {
    let (local, domain) = matched.split_once('@')?;
    let first = local.chars().next()?;
    Some(format!("{first}***@{domain}"))
}

/// Mask a phone number with at least 8 digits: `+`, first two digits,
/// `***`, last two digits.
fn mask_phone(matched: &str) -> Option<String> {
    let digits: String = matched.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 8 {
        return None;
    }
    Some(format!(
        "+{}***{}",
        &digits[..2],
        &digits[digits.len() - 2..]
    ))
}

/// Luhn mod-10 checksum over an all-digit string.
fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, ch) in digits.chars().rev().enumerate() {
        let Some(digit) = ch.to_digit(10) else {
            return false;
        };
        sum += if i % 2 == 1 {
            let doubled = digit * 2;
            if doubled > 9 {
                doubled - 9
            } else {
                doubled
            }
        } else {
            digit
        };
    }
    sum % 10 == 0
}
