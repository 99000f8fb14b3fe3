//! Compliance profile registry.
//!
//! A profile selects which redaction stages run and which stage-2 entity
//! categories may be replaced. Profiles are a fixed, named set defined at
//! startup; this is not a policy engine.

use tracing::warn;

/// Stage-2 entity categories replaced when a profile does not restrict them.
///
/// Categories already covered by the stage-1 patterns are deliberately
/// absent.
pub const DEFAULT_ENTITY_TYPES: &[&str] = &[
    "NAME",
    "ADDRESS",
    "DATE_TIME",
    "AGE",
    "USERNAME",
    "PASSWORD",
    "IP_ADDRESS",
    "BANK_ACCOUNT_NUMBER",
    "PASSPORT_NUMBER",
    "DRIVER_ID",
    "AWS_ACCESS_KEY",
    "MAC_ADDRESS",
];

/// A named, immutable compliance configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceProfile {
    /// Profile name as selected by configuration.
    pub name: &'static str,
    /// Whether stage-1 pattern redaction runs.
    pub stage1: bool,
    /// Whether stage-2 NER redaction runs. Additionally gated by the
    /// `comprehend_enabled` runtime flag at proxy construction.
    pub stage2: bool,
    /// Restriction of stage-2 entity categories. `None` means all of
    /// [`DEFAULT_ENTITY_TYPES`].
    pub entity_types: Option<&'static [&'static str]>,
}

impl ComplianceProfile {
    /// Entity categories stage 2 may replace under this profile.
    pub fn ner_entity_types(&self) -> &'static [&'static str] {
        self.entity_types.unwrap_or(DEFAULT_ENTITY_TYPES)
    }
}

/// GDPR: both stages, restricted to identity-centric categories.
pub static GDPR: ComplianceProfile = ComplianceProfile {
    name: "GDPR",
    stage1: true,
    stage2: true,
    entity_types: Some(&[
        "NAME",
        "ADDRESS",
        "DATE_TIME",
        "PASSPORT_NUMBER",
        "DRIVER_ID",
    ]),
};

/// DORA: deterministic patterns only.
pub static DORA: ComplianceProfile = ComplianceProfile {
    name: "DORA",
    stage1: true,
    stage2: false,
    entity_types: None,
};

/// PCI DSS: deterministic patterns only.
pub static PCI_DSS: ComplianceProfile = ComplianceProfile {
    name: "PCI_DSS",
    stage1: true,
    stage2: false,
    entity_types: None,
};

/// full: both stages, all default stage-2 categories.
pub static FULL: ComplianceProfile = ComplianceProfile {
    name: "full",
    stage1: true,
    stage2: true,
    entity_types: None,
};

/// Look up a profile by name. Total: unknown names warn and fall back to
/// GDPR so a typo in configuration degrades to the strictest default
/// instead of refusing to start.
pub fn get_profile(name: &str) -> &'static ComplianceProfile {
    match name {
        "GDPR" => &GDPR,
        "DORA" => &DORA,
        "PCI_DSS" => &PCI_DSS,
        "full" => &FULL,
        other => {
            warn!(profile = %other, "Unknown compliance profile, falling back to GDPR");
            &GDPR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_profiles_resolve() {
        assert_eq!(get_profile("GDPR").name, "GDPR");
        assert_eq!(get_profile("DORA").name, "DORA");
        assert_eq!(get_profile("PCI_DSS").name, "PCI_DSS");
        assert_eq!(get_profile("full").name, "full");
    }

    #[test]
    fn test_unknown_profile_falls_back_to_gdpr() {
        assert_eq!(get_profile("WAT").name, "GDPR");
        // Matching is case-sensitive; lowercase is the unknown path.
        assert_eq!(get_profile("gdpr").name, "GDPR");
    }

    #[test]
    fn test_stage_flags() {
        assert!(get_profile("GDPR").stage1 && get_profile("GDPR").stage2);
        assert!(get_profile("DORA").stage1 && !get_profile("DORA").stage2);
        assert!(get_profile("PCI_DSS").stage1 && !get_profile("PCI_DSS").stage2);
        assert!(get_profile("full").stage1 && get_profile("full").stage2);
    }

    #[test]
    fn test_gdpr_restricts_entity_types() {
        let types = get_profile("GDPR").ner_entity_types();
        assert_eq!(types.len(), 5);
        assert!(types.contains(&"NAME"));
        assert!(types.contains(&"PASSPORT_NUMBER"));
        assert!(!types.contains(&"IP_ADDRESS"));
    }

    #[test]
    fn test_full_uses_all_defaults() {
        assert_eq!(get_profile("full").ner_entity_types(), DEFAULT_ENTITY_TYPES);
    }

    #[test]
    fn test_default_types_exclude_stage1_categories() {
        for stage1_tag in ["CREDIT_DEBIT_NUMBER", "EMAIL", "PHONE", "SSN", "INTERNATIONAL_BANK_ACCOUNT_NUMBER"] {
            assert!(!DEFAULT_ENTITY_TYPES.contains(&stage1_tag));
        }
    }
}
