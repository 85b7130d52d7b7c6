//! Content safety filter
//!
//! Scans text for PHI, inappropriate language and injection payloads, scores
//! it, and decides pass/fail against a compliance level.

pub mod patterns;

use crate::error::GovernanceError;
use crate::registry::UseCase;
use patterns::{tables, PhiCategory, PhiTier, MEDICAL_CONTEXT_MIN_TERMS};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Strictness applied to a safety decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceLevel {
    None,
    #[default]
    Standard,
    Strict,
    Audit,
}

impl ComplianceLevel {
    /// Minimum score required to pass
    pub fn threshold(&self) -> f64 {
        match self {
            ComplianceLevel::None => 0.5,
            ComplianceLevel::Standard => 0.8,
            ComplianceLevel::Strict | ComplianceLevel::Audit => 0.95,
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, ComplianceLevel::Strict | ComplianceLevel::Audit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn deduction(&self) -> f64 {
        match self {
            Severity::Critical => 0.4,
            Severity::High => 0.3,
            Severity::Medium => 0.2,
            Severity::Low => 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    PhiDetected,
    InappropriateContent,
    SecurityRisk,
}

/// Overall classification of a piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyCategory {
    Safe,
    PhiDetected,
    InappropriateContent,
    PotentialHarm,
    PrivacyViolation,
    SecurityRisk,
}

/// One detector hit. Matched text is never retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyViolation {
    pub kind: ViolationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phi_category: Option<PhiCategory>,
    pub severity: Severity,
    pub description: String,
    pub suggestions: Vec<String>,
}

/// Full result of scanning one piece of content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyAssessment {
    pub safe: bool,
    pub score: f64,
    pub confidence: f64,
    pub category: SafetyCategory,
    pub contains_phi: bool,
    /// Distinct PHI categories found, in table order
    pub phi_types: Vec<PhiCategory>,
    pub medical_context: bool,
    pub violations: Vec<SafetyViolation>,
    pub suggestions: Vec<String>,
}

impl SafetyAssessment {
    /// One description per violation, in detection order
    pub fn reasons(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.description.clone()).collect()
    }
}

/// Short form returned by `SafetyFilter::check`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyCheckResult {
    pub safe: bool,
    pub score: f64,
    #[serde(rename = "containsPHI")]
    pub contains_phi: bool,
    pub reasons: Vec<String>,
}

/// Minimal verdict from `SafetyFilter::quick_check`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickSafetyResult {
    pub safe: bool,
    pub score: f64,
    #[serde(rename = "containsPHI")]
    pub contains_phi: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SafetyFilter {
    default_level: ComplianceLevel,
}

impl SafetyFilter {
    pub fn new(default_level: ComplianceLevel) -> Self {
        Self { default_level }
    }

    pub fn default_level(&self) -> ComplianceLevel {
        self.default_level
    }

    /// Scan `content` and score it under `level`
    pub fn assess(&self, content: &str, level: ComplianceLevel) -> Result<SafetyAssessment, GovernanceError> {
        let tables = tables().map_err(|e| {
            warn!("Safety pattern tables unavailable: {}", e);
            GovernanceError::SafetyCheckFailed(e)
        })?;

        let mut violations = Vec::new();

        for rule in &tables.phi {
            if rule.matches(content) {
                violations.push(SafetyViolation {
                    kind: ViolationKind::PhiDetected,
                    phi_category: Some(rule.category),
                    severity: phi_severity(rule.category.tier(), level),
                    description: format!("Potential PHI detected: {}", rule.category.label()),
                    suggestions: owned(rule.category.suggestions()),
                });
            }
        }

        for rule in tables.inappropriate.iter().chain(tables.security.iter()) {
            if rule.matches(content) {
                violations.push(SafetyViolation {
                    kind: rule.kind,
                    phi_category: None,
                    severity: rule.severity,
                    description: rule.description.to_string(),
                    suggestions: owned(rule.suggestions),
                });
            }
        }

        let phi_types: Vec<PhiCategory> = violations.iter().filter_map(|v| v.phi_category).collect();
        let contains_phi = !phi_types.is_empty();
        let medical_context = tables.medical_term_count(content) >= MEDICAL_CONTEXT_MIN_TERMS;
        let score = score(&violations, contains_phi, medical_context, level);
        let confidence = confidence(content.chars().count(), violations.len());
        let category = categorize(&violations);

        let mut suggestions: Vec<String> = Vec::new();
        for s in violations.iter().flat_map(|v| v.suggestions.iter()) {
            if !suggestions.contains(s) {
                suggestions.push(s.clone());
            }
        }

        let mut assessment = SafetyAssessment {
            safe: false,
            score,
            confidence,
            category,
            contains_phi,
            phi_types,
            medical_context,
            violations,
            suggestions,
        };
        assessment.safe = is_safe(&assessment, level);

        debug!(
            "Safety assessment: safe={} score={:.2} violations={} level={:?}",
            assessment.safe,
            assessment.score,
            assessment.violations.len(),
            level
        );

        Ok(assessment)
    }

    /// Assessment reduced to what the pipeline and the safety endpoint expose
    pub fn check(
        &self,
        content: &str,
        context: Option<UseCase>,
        level: Option<ComplianceLevel>,
    ) -> Result<SafetyCheckResult, GovernanceError> {
        let level = level.unwrap_or(self.default_level);
        if let Some(context) = context {
            debug!("Safety check for use case {}", context.as_str());
        }
        let assessment = self.assess(content, level)?;
        Ok(SafetyCheckResult {
            safe: assessment.safe,
            score: assessment.score,
            contains_phi: assessment.contains_phi,
            reasons: assessment.reasons(),
        })
    }

    /// Check that never errors; failures are reported as unsafe PHI.
    /// Defaults to standard whatever the filter's own level is.
    pub fn quick_check(&self, content: &str, level: Option<ComplianceLevel>) -> QuickSafetyResult {
        match self.assess(content, level.unwrap_or(ComplianceLevel::Standard)) {
            Ok(a) => QuickSafetyResult {
                safe: a.safe,
                score: a.score,
                contains_phi: a.contains_phi,
            },
            Err(_) => QuickSafetyResult {
                safe: false,
                score: 0.0,
                contains_phi: true,
            },
        }
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn phi_severity(tier: PhiTier, level: ComplianceLevel) -> Severity {
    match (level.is_strict(), tier) {
        (true, PhiTier::Critical) => Severity::Critical,
        (true, _) => Severity::High,
        (false, PhiTier::Critical) => Severity::High,
        (false, PhiTier::High) => Severity::Medium,
        (false, PhiTier::Other) => Severity::Low,
    }
}

fn score(violations: &[SafetyViolation], contains_phi: bool, medical_context: bool, level: ComplianceLevel) -> f64 {
    let mut score = 1.0;
    for v in violations {
        score -= v.severity.deduction();
    }
    if contains_phi && medical_context {
        score -= 0.2;
    }
    if level.is_strict() {
        if contains_phi {
            score -= 0.3;
        }
        if !violations.is_empty() {
            score -= 0.1;
        }
    }
    f64::clamp(score, 0.0, 1.0)
}

fn confidence(chars: usize, violation_count: usize) -> f64 {
    let mut confidence = 0.8;
    if chars > 100 {
        confidence += 0.1;
    }
    if chars > 500 {
        confidence += 0.05;
    }
    if violation_count > 5 {
        confidence -= 0.1;
    }
    if violation_count > 10 {
        confidence -= 0.2;
    }
    f64::clamp(confidence, 0.5, 1.0)
}

fn categorize(violations: &[SafetyViolation]) -> SafetyCategory {
    if violations.iter().any(|v| v.kind == ViolationKind::PhiDetected) {
        return SafetyCategory::PhiDetected;
    }
    if let Some(critical) = violations.iter().find(|v| v.severity == Severity::Critical) {
        return if critical.kind == ViolationKind::SecurityRisk {
            SafetyCategory::SecurityRisk
        } else {
            SafetyCategory::PotentialHarm
        };
    }
    if violations.iter().any(|v| v.kind == ViolationKind::InappropriateContent) {
        return SafetyCategory::InappropriateContent;
    }
    if !violations.is_empty() {
        return SafetyCategory::PrivacyViolation;
    }
    SafetyCategory::Safe
}

/// PHI fails unless compliance is off; any critical hit always fails
pub fn is_safe(assessment: &SafetyAssessment, level: ComplianceLevel) -> bool {
    if assessment.contains_phi && level != ComplianceLevel::None {
        return false;
    }
    if assessment.violations.iter().any(|v| v.severity == Severity::Critical) {
        return false;
    }
    assessment.score >= level.threshold()
}
