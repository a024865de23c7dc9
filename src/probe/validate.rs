use log::debug;
use serde::{Deserialize, Serialize};

use crate::probe::icmp::EchoRequest;
use crate::probe::reply::EchoReply;

/// Per-field outcome of checking an echo reply against its request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub identifier_valid: bool,
    pub sequence_valid: bool,
    pub data_valid: bool,
    /// Fields that did not match, in check order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<FieldMismatch>,
}

impl Validation {
    /// All three fields matched
    pub fn is_valid_response(&self) -> bool {
        self.identifier_valid && self.sequence_valid && self.data_valid
    }
}

/// Which echo reply field failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyField {
    Sequence,
    Identifier,
    Data,
}

impl ReplyField {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sequence => "SequenceNumber",
            Self::Identifier => "Identifier",
            Self::Data => "RawData",
        }
    }
}

/// Expected and received values for one mismatched field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMismatch {
    pub field: ReplyField,
    pub expected: String,
    pub actual: String,
}

/// An echo reply together with its single validation verdict
#[derive(Debug, Clone)]
pub struct ValidatedReply {
    pub reply: EchoReply,
    pub validation: Validation,
}

impl ValidatedReply {
    pub fn is_valid_response(&self) -> bool {
        self.validation.is_valid_response()
    }
}

/// Check a reply against the request that produced it.
///
/// Sequence, identifier and payload are compared independently and every
/// comparison is recorded, so a failed reply reports all fields that differ.
pub fn validate(original: &EchoRequest, reply: EchoReply) -> ValidatedReply {
    let mut mismatches = Vec::new();

    let sequence_valid = check(
        &mut mismatches,
        ReplyField::Sequence,
        original.sequence(),
        reply.sequence(),
    );
    let identifier_valid = check(
        &mut mismatches,
        ReplyField::Identifier,
        original.identifier(),
        reply.identifier(),
    );
    let data_valid = check(
        &mut mismatches,
        ReplyField::Data,
        original.payload(),
        reply.data().as_str(),
    );

    ValidatedReply {
        reply,
        validation: Validation {
            identifier_valid,
            sequence_valid,
            data_valid,
            mismatches,
        },
    }
}

fn check<T>(mismatches: &mut Vec<FieldMismatch>, field: ReplyField, expected: T, actual: T) -> bool
where
    T: PartialEq + ToString,
{
    debug!(
        "{} expected={} actual={}",
        field.label(),
        expected.to_string(),
        actual.to_string()
    );
    if expected == actual {
        return true;
    }
    mismatches.push(FieldMismatch {
        field,
        expected: expected.to_string(),
        actual: actual.to_string(),
    });
    false
}
