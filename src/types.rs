//! Shared types for study-wizard
//!
//! Wizard step identifiers, status enums, and the decimal encoding used for
//! on-chain amounts and identifiers.

use serde::{Deserialize, Serialize};

/// One of the four ordered wizard steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    /// Escrow creation (funds the study)
    Escrow,

    /// Registry publication (public study metadata)
    Registry,

    /// Eligibility criteria
    Criteria,

    /// Milestone setup
    Milestones,
}

impl WizardStep {
    /// All steps in execution order
    pub const ALL: [WizardStep; 4] = [
        WizardStep::Escrow,
        WizardStep::Registry,
        WizardStep::Criteria,
        WizardStep::Milestones,
    ];

    /// Position of the step in the wizard (0-based)
    pub fn index(self) -> usize {
        match self {
            WizardStep::Escrow => 0,
            WizardStep::Registry => 1,
            WizardStep::Criteria => 2,
            WizardStep::Milestones => 3,
        }
    }

    /// Steps whose ids must be recorded before this step can be built or indexed
    pub fn dependencies(self) -> &'static [WizardStep] {
        match self {
            WizardStep::Escrow => &[],
            WizardStep::Registry => &[WizardStep::Escrow],
            WizardStep::Criteria => &[WizardStep::Escrow, WizardStep::Registry],
            WizardStep::Milestones => &[
                WizardStep::Escrow,
                WizardStep::Registry,
                WizardStep::Criteria,
            ],
        }
    }

    /// The step after this one, if any
    pub fn next(self) -> Option<WizardStep> {
        WizardStep::ALL.get(self.index() + 1).copied()
    }

    /// Database / CLI string representation
    pub fn as_str(self) -> &'static str {
        match self {
            WizardStep::Escrow => "escrow",
            WizardStep::Registry => "registry",
            WizardStep::Criteria => "criteria",
            WizardStep::Milestones => "milestones",
        }
    }
}

impl std::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WizardStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "escrow" => Ok(WizardStep::Escrow),
            "registry" => Ok(WizardStep::Registry),
            "criteria" => Ok(WizardStep::Criteria),
            "milestones" => Ok(WizardStep::Milestones),
            _ => Err(format!(
                "Invalid step '{}'. Valid options: escrow, registry, criteria, milestones",
                s
            )),
        }
    }
}

/// Coarse status of a step slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    Built,
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::NotStarted => write!(f, "Not started"),
            StepStatus::Built => write!(f, "Built"),
            StepStatus::AwaitingConfirmation => write!(f, "Awaiting confirmation"),
            StepStatus::Confirmed => write!(f, "Confirmed"),
            StepStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Why a step attempt ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Step input was rejected by the transaction builder
    Validation,

    /// Target contract is not deployed on the session's chain
    Configuration,

    /// The wallet owner declined to sign
    Rejected,

    /// The transaction was mined but execution reverted
    Reverted,

    /// The receipt did not have the expected event layout
    Extraction,

    /// The index refused the record (ordering or duplicate conflict)
    IndexConflict,

    /// The transaction was not sent by the session owner
    Unauthorized,
}

impl FailureKind {
    /// Convert to database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Configuration => "configuration",
            FailureKind::Rejected => "rejected",
            FailureKind::Reverted => "reverted",
            FailureKind::Extraction => "extraction",
            FailureKind::IndexConflict => "index_conflict",
            FailureKind::Unauthorized => "unauthorized",
        }
    }

    /// Parse from database string
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "validation" => Some(FailureKind::Validation),
            "configuration" => Some(FailureKind::Configuration),
            "rejected" => Some(FailureKind::Rejected),
            "reverted" => Some(FailureKind::Reverted),
            "extraction" => Some(FailureKind::Extraction),
            "index_conflict" => Some(FailureKind::IndexConflict),
            "unauthorized" => Some(FailureKind::Unauthorized),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,

    /// `{ "success": bool, "data" | "error" }` JSON envelope
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!(
                "Invalid output format '{}'. Valid options: text, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a `U256` from a decimal string or a `0x`-prefixed hex string
pub fn parse_u256(s: &str) -> Result<alloy_primitives::U256, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex_digits) => alloy_primitives::U256::from_str_radix(hex_digits, 16),
        None => alloy_primitives::U256::from_str_radix(s, 10),
    };
    parsed.map_err(|e| format!("Invalid integer '{}': {}", s, e))
}

/// Serde adapter encoding `U256` as a decimal string
///
/// Amounts and on-chain ids cross JSON and SQLite as decimal strings so that
/// values above 2^53 survive consumers that parse numbers as doubles.
/// Deserialization also accepts hex strings and plain JSON integers.
pub mod decimal {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    fn from_raw<E: serde::de::Error>(raw: Raw) -> Result<U256, E> {
        match raw {
            Raw::Text(s) => super::parse_u256(&s).map_err(E::custom),
            Raw::Number(n) => Ok(U256::from(n)),
        }
    }

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        from_raw(Raw::deserialize(deserializer)?)
    }

    /// `Option<U256>` variant
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<U256>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_some(&v.to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<U256>, D::Error> {
            Option::<Raw>::deserialize(deserializer)?
                .map(from_raw)
                .transpose()
        }
    }

    /// `Vec<U256>` variant
    pub mod vec {
        use super::*;
        use serde::ser::SerializeSeq;

        pub fn serialize<S: Serializer>(values: &[U256], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for v in values {
                seq.serialize_element(&v.to_string())?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<U256>, D::Error> {
            Vec::<Raw>::deserialize(deserializer)?
                .into_iter()
                .map(from_raw)
                .collect()
        }
    }
}
