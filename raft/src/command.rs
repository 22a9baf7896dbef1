//! Encoding of operator command lines into journal payloads.
//!
//! A line such as `set temperature 22` becomes the JSON document
//! `{"action":"set","args":["temperature","22"]}`. The NO_OP sentinel carries
//! no `args` key at all, which keeps its bytes distinct from any encoded line.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NO_OP: &str = "NO_OP";

const NO_OP_PAYLOAD: &[u8] = br#"{"action":"NO_OP"}"#;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("empty command line")]
    EmptyInput,

    #[error("malformed command payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Command {
    pub fn into_parts(self) -> (String, Vec<String>) {
        (self.action, self.args)
    }
}

pub fn encode(line: &str) -> Result<Vec<u8>, CodecError> {
    let mut tokens = line.split_whitespace();
    let action = tokens.next().ok_or(CodecError::EmptyInput)?;
    let command = Command {
        action: action.to_owned(),
        args: tokens.map(str::to_owned).collect(),
    };
    Ok(serde_json::to_vec(&command)?)
}

pub fn encode_no_op() -> Vec<u8> {
    NO_OP_PAYLOAD.to_vec()
}

/// True only for the exact sentinel bytes, not for a user line `NO_OP`.
pub fn is_no_op(payload: &[u8]) -> bool {
    payload == NO_OP_PAYLOAD
}

pub fn decode(payload: &[u8]) -> Result<Command, CodecError> {
    Ok(serde_json::from_slice(payload)?)
}
