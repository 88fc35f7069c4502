//! Tests for contract ABI fragments, calldata layout and revert decoding

use alloy_primitives::{keccak256, Address, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use study_wizard::contracts::abi::{
    decode_revert_reason, publishStudyCall, setStudyCriteriaCall, FunctionAbi, ADD_MILESTONES,
    CREATE_STUDY_ESCROW, ESCROW_CREATED, MILESTONE_CREATED, PUBLISH_STUDY, SET_STUDY_CRITERIA,
    STUDY_CRITERIA_SET, STUDY_PUBLISHED,
};

sol! {
    function transfer(address to, uint256 amount);
    event Transfer(address indexed from, address indexed to, uint256 value);
}

fn word(n: u64) -> [u8; 32] {
    U256::from(n).to_be_bytes::<32>()
}

#[test]
fn test_erc20_selector_and_topic() {
    assert_eq!(hex::encode(transferCall::SELECTOR), "a9059cbb");
    assert_eq!(
        hex::encode(Transfer::SIGNATURE_HASH),
        "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
    );

    let to = Address::repeat_byte(0x01);
    let data = transferCall {
        to,
        amount: U256::from(1000),
    }
    .abi_encode();

    assert_eq!(data.len(), 4 + 64);
    assert_eq!(&data[4 + 12..36], to.as_slice());
    assert_eq!(&data[36..68], &word(1000));
}

#[test]
fn test_fragments_match_parameter_lists() {
    for function in [
        CREATE_STUDY_ESCROW,
        PUBLISH_STUDY,
        SET_STUDY_CRITERIA,
        ADD_MILESTONES,
    ] {
        let kinds: Vec<&str> = function.inputs.iter().map(|p| p.kind).collect();
        let expected = format!("{}({})", function.name, kinds.join(","));
        assert_eq!(function.signature(), expected);
        assert_eq!(
            function.selector().as_slice(),
            &keccak256(expected.as_bytes())[..4]
        );
    }
}

#[test]
fn test_event_topics_are_signature_hashes() {
    assert_eq!(
        ESCROW_CREATED.signature(),
        "EscrowCreated(uint256,address,uint256)"
    );
    assert_eq!(
        STUDY_PUBLISHED.signature(),
        "StudyPublished(uint256,uint256,address)"
    );
    assert_eq!(
        STUDY_CRITERIA_SET.signature(),
        "StudyCriteriaSet(uint256,uint256,bytes32)"
    );
    assert_eq!(
        MILESTONE_CREATED.signature(),
        "MilestoneCreated(uint256,uint256,uint256)"
    );

    for event in [ESCROW_CREATED, STUDY_PUBLISHED, STUDY_CRITERIA_SET, MILESTONE_CREATED] {
        assert_eq!(event.topic(), keccak256(event.signature().as_bytes()));
    }
}

#[test]
fn test_publish_study_calldata_layout() {
    let data = publishStudyCall {
        escrowId: U256::from(42),
        title: "abc".to_string(),
        description: String::new(),
    }
    .abi_encode();

    let body = &data[4..];
    assert_eq!(&data[..4], PUBLISH_STUDY.selector().as_slice());
    assert_eq!(&body[..32], &word(42));
    // Offsets of the two strings, then "abc" padded to one word, then the empty string
    assert_eq!(&body[32..64], &word(0x60));
    assert_eq!(&body[64..96], &word(0xa0));
    assert_eq!(&body[96..128], &word(3));
    assert_eq!(&body[128..131], b"abc");
    assert_eq!(&body[160..192], &word(0));
    assert_eq!(body.len(), 32 * 6);
}

#[test]
fn test_criteria_calldata_carries_hash_array() {
    let hash = keccak256(b"E11.9");
    let data = setStudyCriteriaCall {
        studyId: U256::from(7),
        escrowId: U256::from(42),
        minAge: U256::from(18),
        maxAge: U256::from(65),
        diagnosisHashes: vec![hash],
    }
    .abi_encode();

    let body = &data[4..];
    assert_eq!(&body[128..160], &word(0xa0));
    assert_eq!(&body[160..192], &word(1));
    assert_eq!(&body[192..224], hash.as_slice());
}

#[test]
fn test_function_json_abi() {
    let json = PUBLISH_STUDY.to_json();

    assert_eq!(json["type"], "function");
    assert_eq!(json["name"], "publishStudy");
    assert_eq!(json["stateMutability"], "nonpayable");
    assert_eq!(json["inputs"][0]["type"], "uint256");

    let escrow: FunctionAbi = CREATE_STUDY_ESCROW;
    assert_eq!(escrow.to_json()["stateMutability"], "payable");
}

#[test]
fn test_decode_error_string_revert() {
    let mut data = hex::decode("08c379a0").unwrap();
    data.extend_from_slice(&word(0x20));
    data.extend_from_slice(&word(11));
    let mut text = b"Not allowed".to_vec();
    text.resize(32, 0);
    data.extend_from_slice(&text);

    assert_eq!(decode_revert_reason(&data).as_deref(), Some("Not allowed"));
}

#[test]
fn test_decode_panic_and_custom_errors() {
    let mut panic = hex::decode("4e487b71").unwrap();
    panic.extend_from_slice(&word(0x11));
    assert_eq!(
        decode_revert_reason(&panic).as_deref(),
        Some("panic code 0x11")
    );

    let custom = hex::decode("deadbeef").unwrap();
    assert_eq!(
        decode_revert_reason(&custom).as_deref(),
        Some("custom error 0xdeadbeef")
    );

    assert_eq!(decode_revert_reason(&[0x01]), None);
}
