//! Detection tables
//!
//! Ordered `(category, severity, matcher)` rows evaluated uniformly by the
//! safety filter. Adding a category means adding a row.

use super::{Severity, ViolationKind};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a PHI category's severity scales with the compliance level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhiTier {
    /// Direct identifiers (SSN, email, phone, street address)
    Critical,
    /// Strong quasi-identifiers (names, dates, record and plan numbers)
    High,
    Other,
}

/// HIPAA Safe Harbor identifier families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhiCategory {
    Names,
    Addresses,
    Dates,
    SpecificDates,
    Phone,
    Fax,
    Email,
    Ssn,
    Mrn,
    HealthPlan,
    AccountNumbers,
    Certificates,
    Vehicles,
    Devices,
    Urls,
    IpAddresses,
    Biometric,
    Photos,
}

impl PhiCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhiCategory::Names => "names",
            PhiCategory::Addresses => "addresses",
            PhiCategory::Dates => "dates",
            PhiCategory::SpecificDates => "specific_dates",
            PhiCategory::Phone => "phone",
            PhiCategory::Fax => "fax",
            PhiCategory::Email => "email",
            PhiCategory::Ssn => "ssn",
            PhiCategory::Mrn => "mrn",
            PhiCategory::HealthPlan => "health_plan",
            PhiCategory::AccountNumbers => "account_numbers",
            PhiCategory::Certificates => "certificates",
            PhiCategory::Vehicles => "vehicles",
            PhiCategory::Devices => "devices",
            PhiCategory::Urls => "urls",
            PhiCategory::IpAddresses => "ip_addresses",
            PhiCategory::Biometric => "biometric",
            PhiCategory::Photos => "photos",
        }
    }

    pub fn tier(&self) -> PhiTier {
        match self {
            PhiCategory::Ssn | PhiCategory::Email | PhiCategory::Phone | PhiCategory::Addresses => {
                PhiTier::Critical
            }
            PhiCategory::Names | PhiCategory::Dates | PhiCategory::Mrn | PhiCategory::HealthPlan => {
                PhiTier::High
            }
            _ => PhiTier::Other,
        }
    }

    /// Human-readable label used in violation descriptions
    pub fn label(&self) -> &'static str {
        match self {
            PhiCategory::Names => "name",
            PhiCategory::Addresses => "street address",
            PhiCategory::Dates => "date",
            PhiCategory::SpecificDates => "birth, admission or appointment date",
            PhiCategory::Phone => "phone number",
            PhiCategory::Fax => "fax number",
            PhiCategory::Email => "email address",
            PhiCategory::Ssn => "social security number",
            PhiCategory::Mrn => "medical record number",
            PhiCategory::HealthPlan => "health plan beneficiary number",
            PhiCategory::AccountNumbers => "account number",
            PhiCategory::Certificates => "certificate or license number",
            PhiCategory::Vehicles => "vehicle identifier",
            PhiCategory::Devices => "device identifier",
            PhiCategory::Urls => "web URL",
            PhiCategory::IpAddresses => "IP address",
            PhiCategory::Biometric => "biometric identifier",
            PhiCategory::Photos => "full-face photograph reference",
        }
    }

    /// Remediation hints shown to the caller
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            PhiCategory::Names => &["Use \"the patient\" or \"the individual\" instead", "Remove specific names"],
            PhiCategory::Dates => &["Use relative dates like \"last month\" or \"recently\"", "Remove specific dates"],
            PhiCategory::Phone => &["Remove phone numbers", "Use \"contact information on file\""],
            PhiCategory::Email => &["Remove email addresses", "Refer to \"patient portal\" instead"],
            PhiCategory::Ssn => &["Never include SSN in communications", "Use patient ID instead"],
            PhiCategory::Addresses => &["Use general area like \"local clinic\" instead", "Remove specific addresses"],
            PhiCategory::Mrn => &["Use \"patient record\" instead of specific numbers", "Remove medical record numbers"],
            _ => &["Remove or mask sensitive information"],
        }
    }
}

/// One PHI detector row
pub struct PhiRule {
    pub category: PhiCategory,
    regex: Regex,
    accept: Option<fn(&Captures) -> bool>,
}

impl PhiRule {
    /// Whether any accepted match exists in `content`
    pub fn matches(&self, content: &str) -> bool {
        match self.accept {
            None => self.regex.is_match(content),
            Some(accept) => self.regex.captures_iter(content).any(|caps| accept(&caps)),
        }
    }
}

/// One inappropriate-content or security detector row
pub struct ContentRule {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub description: &'static str,
    pub suggestions: &'static [&'static str],
    regex: Regex,
}

impl ContentRule {
    pub fn matches(&self, content: &str) -> bool {
        self.regex.is_match(content)
    }
}

/// All compiled detection tables
pub struct PatternTables {
    pub phi: Vec<PhiRule>,
    pub inappropriate: Vec<ContentRule>,
    pub security: Vec<ContentRule>,
    medical_terms: Regex,
}

/// Clinical vocabulary; two distinct hits mark a medical context
pub const MEDICAL_TERMS: [&str; 27] = [
    "patient", "diagnosis", "treatment", "medication", "prescription", "surgery",
    "clinic", "hospital", "doctor", "physician", "nurse", "medical", "health",
    "condition", "symptom", "procedure", "appointment", "visit", "consultation",
    "test", "lab", "result", "chart", "record", "history", "allergy", "insurance",
];

/// Distinct medical-context terms required before content counts as clinical
pub const MEDICAL_CONTEXT_MIN_TERMS: usize = 2;

const PHONE: &str = r"(?:\+?1[-.\s]?)?\(?([0-9]{3})\)?[-.\s]?([0-9]{3})[-.\s]?([0-9]{4})\b";

static TABLES: Lazy<Result<PatternTables, regex::Error>> = Lazy::new(PatternTables::compile);

/// Shared compiled tables, or the compile error that disabled them
pub fn tables() -> Result<&'static PatternTables, String> {
    TABLES.as_ref().map_err(|e| e.to_string())
}

/// Area 000/666/9xx, group 00 and serial 0000 are never issued
fn plausible_ssn(caps: &Captures) -> bool {
    let area = &caps[1];
    let group = &caps[2];
    let serial = &caps[3];
    area != "000" && area != "666" && !area.starts_with('9') && group != "00" && serial != "0000"
}

impl PatternTables {
    fn compile() -> Result<Self, regex::Error> {
        let phi_row = |category, pattern: &str| -> Result<PhiRule, regex::Error> {
            Ok(PhiRule {
                category,
                regex: Regex::new(pattern)?,
                accept: None,
            })
        };

        let phi = vec![
            phi_row(PhiCategory::Names, r"(?i)\b(?:mr|mrs|ms|dr|doctor|patient|client)\s+[a-z]{2,}\b")?,
            phi_row(
                PhiCategory::Addresses,
                r"(?i)\b\d+\s+[a-z\s]+(?:street|st|avenue|ave|road|rd|lane|ln|drive|dr|court|ct|boulevard|blvd)\b",
            )?,
            phi_row(
                PhiCategory::Dates,
                r"\b(?:0?[1-9]|1[0-2])[-/](?:0?[1-9]|[12]\d|3[01])[-/](?:19|20)\d{2}\b",
            )?,
            phi_row(
                PhiCategory::SpecificDates,
                r"(?i)\b(?:birth|born|dob|date of birth|admission|discharge|appointment)\s*:?\s*(?:0?[1-9]|1[0-2])[-/](?:0?[1-9]|[12]\d|3[01])[-/](?:19|20)?\d{2,4}\b",
            )?,
            phi_row(PhiCategory::Phone, &format!(r"\b{}", PHONE))?,
            phi_row(PhiCategory::Fax, &format!(r"(?i)\bfax\s*:?\s*{}", PHONE))?,
            phi_row(PhiCategory::Email, r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")?,
            PhiRule {
                category: PhiCategory::Ssn,
                regex: Regex::new(r"\b(\d{3})[-.]?(\d{2})[-.]?(\d{4})\b")?,
                accept: Some(plausible_ssn),
            },
            phi_row(
                PhiCategory::Mrn,
                r"(?i)\b(?:mrn|medical record|patient id|chart number)\s*:?\s*[a-z0-9]+\b",
            )?,
            phi_row(
                PhiCategory::HealthPlan,
                r"(?i)\b(?:policy|member|beneficiary|subscriber)\s*(?:number|id|#)\s*:?\s*[a-z0-9]+\b",
            )?,
            phi_row(
                PhiCategory::AccountNumbers,
                r"(?i)\b(?:account|acct)\s*(?:number|#)\s*:?\s*[a-z0-9]+\b",
            )?,
            phi_row(
                PhiCategory::Certificates,
                r"(?i)\b(?:license|certificate|permit)\s*(?:number|#)\s*:?\s*[a-z0-9]+\b",
            )?,
            phi_row(
                PhiCategory::Vehicles,
                r"(?i)\b(?:license plate|vin|vehicle identification)\s*:?\s*[a-z0-9]+\b",
            )?,
            phi_row(
                PhiCategory::Devices,
                r"(?i)\b(?:device|serial)\s*(?:number|#|id)\s*:?\s*[a-z0-9]+\b",
            )?,
            phi_row(PhiCategory::Urls, r"(?i)\bhttps?://[a-z0-9.-]+\.[a-z]{2,}(?:/\S*)?")?,
            phi_row(
                PhiCategory::IpAddresses,
                r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b",
            )?,
            phi_row(
                PhiCategory::Biometric,
                r"(?i)\b(?:fingerprint|voiceprint|retina|iris|biometric)\s*(?:scan|data|id|identifier)\b",
            )?,
            phi_row(
                PhiCategory::Photos,
                r"(?i)\b(?:photo|photograph|image|picture)\s*(?:of|showing)\s*(?:face|patient|individual)\b",
            )?,
        ];

        const LANGUAGE_HINTS: &[&str] = &["Use professional language", "Consider alternative phrasing"];
        const INCLUSIVE_HINTS: &[&str] = &["Use inclusive language", "Focus on medical facts only"];
        const SQL_HINTS: &[&str] = &["Remove SQL-like syntax", "Use plain language"];
        const SCRIPT_HINTS: &[&str] = &["Remove HTML/JavaScript code", "Use plain text only"];

        let inappropriate = vec![
            ContentRule {
                kind: ViolationKind::InappropriateContent,
                severity: Severity::Low,
                description: "Inappropriate language detected",
                suggestions: LANGUAGE_HINTS,
                regex: Regex::new(r"(?i)\b(?:damn|hell|crap)\b")?,
            },
            ContentRule {
                kind: ViolationKind::InappropriateContent,
                severity: Severity::Medium,
                description: "Inappropriate language detected",
                suggestions: LANGUAGE_HINTS,
                regex: Regex::new(r"(?i)\b(?:fuck|shit|asshole|bitch)\b")?,
            },
            ContentRule {
                kind: ViolationKind::InappropriateContent,
                severity: Severity::High,
                description: "Potentially discriminatory language detected",
                suggestions: INCLUSIVE_HINTS,
                regex: Regex::new(
                    r"(?i)\b(?:race|ethnicity|religion|gender|sexual orientation)\s+(?:based|discrimination)\b",
                )?,
            },
        ];

        let security = vec![
            ContentRule {
                kind: ViolationKind::SecurityRisk,
                severity: Severity::Critical,
                description: "Potential SQL injection attempt detected",
                suggestions: SQL_HINTS,
                regex: Regex::new(
                    r"(?i)\b(?:select\s+.+?\s+from|insert\s+into|update\s+\w+\s+set|delete\s+from|drop\s+(?:table|database)|union\s+(?:all\s+)?select)\b",
                )?,
            },
            ContentRule {
                kind: ViolationKind::SecurityRisk,
                severity: Severity::Critical,
                description: "Potential SQL injection attempt detected",
                suggestions: SQL_HINTS,
                regex: Regex::new(r#"(?i)\b(?:or|and)\s+['"]?\d+['"]?\s*=\s*['"]?\d+['"]?"#)?,
            },
            ContentRule {
                kind: ViolationKind::SecurityRisk,
                severity: Severity::Critical,
                description: "Potential script injection detected",
                suggestions: SCRIPT_HINTS,
                regex: Regex::new(r"(?is)<script[^>]*>.*?</script>")?,
            },
            ContentRule {
                kind: ViolationKind::SecurityRisk,
                severity: Severity::Critical,
                description: "Potential script injection detected",
                suggestions: SCRIPT_HINTS,
                regex: Regex::new(r"(?i)javascript:")?,
            },
            ContentRule {
                kind: ViolationKind::SecurityRisk,
                severity: Severity::Critical,
                description: "Potential script injection detected",
                suggestions: SCRIPT_HINTS,
                regex: Regex::new(r"(?i)\bon[a-z]+\s*=")?,
            },
        ];

        let medical_terms = Regex::new(&format!(r"(?i)\b(?:{})\b", MEDICAL_TERMS.join("|")))?;

        Ok(Self {
            phi,
            inappropriate,
            security,
            medical_terms,
        })
    }

    /// Number of distinct clinical terms present
    pub fn medical_term_count(&self, content: &str) -> usize {
        self.medical_terms
            .find_iter(content)
            .map(|m| m.as_str().to_lowercase())
            .collect::<HashSet<_>>()
            .len()
    }
}
