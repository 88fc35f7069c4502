//! Contract ABI definitions and encoding
//!
//! The StudyEscrow and StudyRegistry contracts are external collaborators with
//! a fixed ABI, declared here with `sol!`. This module also carries the
//! function and event fragments the wizard displays and decoding of revert
//! data.

use alloy_primitives::{Address, FixedBytes, B256, U256};
use alloy_sol_types::{sol, Panic, Revert, SolCall, SolError, SolEvent};
use serde::{Deserialize, Serialize};

use crate::types::decimal;

sol! {
    // StudyEscrow
    function createStudyEscrow(string title, uint256 totalFunding, uint256 maxParticipants);
    function addMilestones(
        uint256 escrowId,
        uint256 studyId,
        string[] descriptions,
        uint256[] rewards,
        uint8[] kinds
    );
    event EscrowCreated(uint256 indexed escrowId, address indexed researcher, uint256 totalFunding);
    event MilestoneCreated(uint256 indexed milestoneId, uint256 indexed escrowId, uint256 reward);

    // StudyRegistry
    function publishStudy(uint256 escrowId, string title, string description);
    function setStudyCriteria(
        uint256 studyId,
        uint256 escrowId,
        uint256 minAge,
        uint256 maxAge,
        bytes32[] diagnosisHashes
    );
    event StudyPublished(uint256 indexed studyId, uint256 indexed escrowId, address indexed researcher);
    event StudyCriteriaSet(uint256 indexed studyId, uint256 indexed escrowId, bytes32 criteriaHash);
}

/// A named, typed function parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbiParam {
    pub name: &'static str,
    pub kind: &'static str,
}

const fn param(name: &'static str, kind: &'static str) -> AbiParam {
    AbiParam { name, kind }
}

/// Function fragment
///
/// Signature and selector come from the `sol!` call types; the parameter
/// list names the arguments for display and for the wallet's JSON ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionAbi {
    pub name: &'static str,
    pub inputs: &'static [AbiParam],
    pub payable: bool,
    signature: &'static str,
    selector: [u8; 4],
}

impl FunctionAbi {
    /// Canonical signature, e.g. `publishStudy(uint256,string,string)`
    pub fn signature(&self) -> &'static str {
        self.signature
    }

    /// First four bytes of the keccak-256 hash of the signature
    pub fn selector(&self) -> FixedBytes<4> {
        FixedBytes(self.selector)
    }

    /// JSON ABI item, as a wallet expects it
    pub fn to_json(&self) -> serde_json::Value {
        let inputs: Vec<_> = self
            .inputs
            .iter()
            .map(|p| serde_json::json!({ "name": p.name, "type": p.kind }))
            .collect();
        serde_json::json!({
            "type": "function",
            "name": self.name,
            "inputs": inputs,
            "outputs": [],
            "stateMutability": if self.payable { "payable" } else { "nonpayable" },
        })
    }
}

/// Event fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventAbi {
    pub name: &'static str,
    signature: &'static str,
    topic: B256,
}

impl EventAbi {
    pub fn signature(&self) -> &'static str {
        self.signature
    }

    /// `topic[0]` of every log emitted for this event
    pub fn topic(&self) -> B256 {
        self.topic
    }
}

pub const CREATE_STUDY_ESCROW: FunctionAbi = FunctionAbi {
    name: "createStudyEscrow",
    inputs: &[
        param("title", "string"),
        param("totalFunding", "uint256"),
        param("maxParticipants", "uint256"),
    ],
    payable: true,
    signature: createStudyEscrowCall::SIGNATURE,
    selector: createStudyEscrowCall::SELECTOR,
};

pub const ADD_MILESTONES: FunctionAbi = FunctionAbi {
    name: "addMilestones",
    inputs: &[
        param("escrowId", "uint256"),
        param("studyId", "uint256"),
        param("descriptions", "string[]"),
        param("rewards", "uint256[]"),
        param("kinds", "uint8[]"),
    ],
    payable: false,
    signature: addMilestonesCall::SIGNATURE,
    selector: addMilestonesCall::SELECTOR,
};

pub const PUBLISH_STUDY: FunctionAbi = FunctionAbi {
    name: "publishStudy",
    inputs: &[
        param("escrowId", "uint256"),
        param("title", "string"),
        param("description", "string"),
    ],
    payable: false,
    signature: publishStudyCall::SIGNATURE,
    selector: publishStudyCall::SELECTOR,
};

pub const SET_STUDY_CRITERIA: FunctionAbi = FunctionAbi {
    name: "setStudyCriteria",
    inputs: &[
        param("studyId", "uint256"),
        param("escrowId", "uint256"),
        param("minAge", "uint256"),
        param("maxAge", "uint256"),
        param("diagnosisHashes", "bytes32[]"),
    ],
    payable: false,
    signature: setStudyCriteriaCall::SIGNATURE,
    selector: setStudyCriteriaCall::SELECTOR,
};

pub const ESCROW_CREATED: EventAbi = EventAbi {
    name: "EscrowCreated",
    signature: EscrowCreated::SIGNATURE,
    topic: EscrowCreated::SIGNATURE_HASH,
};

pub const MILESTONE_CREATED: EventAbi = EventAbi {
    name: "MilestoneCreated",
    signature: MilestoneCreated::SIGNATURE,
    topic: MilestoneCreated::SIGNATURE_HASH,
};

pub const STUDY_PUBLISHED: EventAbi = EventAbi {
    name: "StudyPublished",
    signature: StudyPublished::SIGNATURE,
    topic: StudyPublished::SIGNATURE_HASH,
};

pub const STUDY_CRITERIA_SET: EventAbi = EventAbi {
    name: "StudyCriteriaSet",
    signature: StudyCriteriaSet::SIGNATURE,
    topic: StudyCriteriaSet::SIGNATURE_HASH,
};

/// A typed call argument, as shown to the user before signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AbiValue {
    Uint(#[serde(with = "decimal")] U256),
    Address(Address),
    Bytes32(B256),
    String(String),
    Array(Vec<AbiValue>),
}

impl std::fmt::Display for AbiValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbiValue::Uint(v) => write!(f, "{}", v),
            AbiValue::Address(a) => write!(f, "{}", a),
            AbiValue::Bytes32(b) => write!(f, "{}", b),
            AbiValue::String(s) => write!(f, "{:?}", s),
            AbiValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Decode a human-readable reason from revert data
///
/// Handles `Error(string)` and `Panic(uint256)`; custom errors are reported by
/// selector so they can at least be matched against the contract ABI.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let selector = data.get(..4)?;

    if let Ok(revert) = Revert::abi_decode(data, true) {
        return Some(revert.reason);
    }
    if let Ok(panic) = Panic::abi_decode(data, true) {
        return Some(format!("panic code 0x{:x}", panic.code));
    }

    Some(format!("custom error 0x{}", hex::encode(selector)))
}
