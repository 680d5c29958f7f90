use serde::{Deserialize, Serialize};

/// Identifier of a loan in the external loan repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(pub u64);

impl std::fmt::Display for LoanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a customer in the external customer directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub u64);

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tenant (company) whose GL configuration applies to a request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new("default")
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a suggestion proposes to associate the transaction with.
///
/// Loan-based engines point at a specific loan; pattern-based engines point at
/// a GL account code. Deduplication works on this identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TargetId {
    Loan(LoanId),
    Account(String),
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loan(id) => write!(f, "loan:{id}"),
            Self::Account(code) => write!(f, "account:{code}"),
        }
    }
}

impl std::str::FromStr for TargetId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(id) = s.strip_prefix("loan:") {
            return id
                .parse::<u64>()
                .map(|n| Self::Loan(LoanId(n)))
                .map_err(|e| format!("invalid loan id '{id}': {e}"));
        }
        if let Some(code) = s.strip_prefix("account:") {
            if code.is_empty() {
                return Err("empty account code".to_string());
            }
            return Ok(Self::Account(code.to_string()));
        }
        Err(format!("unrecognised target id '{s}'"))
    }
}

/// Transaction mode supplied by the caller
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Auto,
    Disbursement,
    Payment,
}

impl std::fmt::Display for MatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Disbursement => write!(f, "disbursement"),
            Self::Payment => write!(f, "payment"),
        }
    }
}

/// How a candidate was detected. The tag drives the method bonus and part of
/// the data-quality factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ExactPhoneMatch,
    ExactIdMatch,
    PartialIdMatch,
    NameSimilarity,
    LicensePlateExact,
    LicensePlateNormalized,
    LicensePlateTransliterated,
    LoanDisbursementPattern,
    RecurringPatternExact,
    RecurringPatternPartial,
}

impl MatchMethod {
    /// Stable tag used in configuration tables and API output
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactPhoneMatch => "exact_phone_match",
            Self::ExactIdMatch => "exact_id_match",
            Self::PartialIdMatch => "partial_id_match",
            Self::NameSimilarity => "name_similarity",
            Self::LicensePlateExact => "license_plate_exact",
            Self::LicensePlateNormalized => "license_plate_normalized",
            Self::LicensePlateTransliterated => "license_plate_transliterated",
            Self::LoanDisbursementPattern => "loan_disbursement_pattern",
            Self::RecurringPatternExact => "recurring_pattern_exact",
            Self::RecurringPatternPartial => "recurring_pattern_partial",
        }
    }
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence tier used for UI styling and caller auto-accept policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    VeryLow,
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    #[must_use]
    pub fn from_percentage(percentage: u8) -> Self {
        if percentage >= 85 {
            Self::High
        } else if percentage >= 70 {
            Self::Medium
        } else if percentage >= 50 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }

    /// Hex color hint for presentation layers
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Self::High => "#28a745",
            Self::Medium => "#ffc107",
            Self::Low => "#fd7e14",
            Self::VeryLow => "#dc3545",
        }
    }

    /// Icon name hint for presentation layers
    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::High => "target",
            Self::Medium => "check",
            Self::Low => "warning",
            Self::VeryLow => "question",
        }
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::VeryLow => write!(f, "very_low"),
        }
    }
}
