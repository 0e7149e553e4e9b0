//! Structured inter-agent messages embedded in agent output.
//!
//! An agent publishes a message by emitting a line of the form
//!
//! ```text
//! @@agent-message {"to": "ui-designer", "type": "request", "content": {...}}
//! ```
//!
//! Each envelope is validated as a whole. Anything that fails to parse is
//! quarantined and never partially applied.

use crate::orchestration::bus::{Message, MessageKind, Recipient};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Line prefix that marks a message envelope.
pub const ENVELOPE_PREFIX: &str = "@@agent-message";

/// Wire form of a message published by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageEnvelope {
    /// Recipient agent name, or `*` for everyone.
    pub to: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: Value,
}

impl MessageEnvelope {
    /// Turn the envelope into a bus message sent by `from`.
    pub fn into_message(self, from: &str) -> Message {
        Message::new(from, Recipient::parse(&self.to), self.kind, self.content)
    }
}

/// An envelope line that was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarantinedEnvelope {
    /// 1-based line number within the output.
    pub line: usize,
    pub reason: String,
}

/// Envelopes found in one agent output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedEnvelopes {
    pub valid: Vec<MessageEnvelope>,
    pub quarantined: Vec<QuarantinedEnvelope>,
}

impl ExtractedEnvelopes {
    pub fn is_empty(&self) -> bool {
        self.valid.is_empty() && self.quarantined.is_empty()
    }
}

/// Scan `output` for envelope lines.
pub fn extract_envelopes(output: &str) -> ExtractedEnvelopes {
    let mut extracted = ExtractedEnvelopes::default();

    for (index, line) in output.lines().enumerate() {
        let Some(body) = line.trim_start().strip_prefix(ENVELOPE_PREFIX) else {
            continue;
        };

        match parse_envelope(body) {
            Ok(envelope) => extracted.valid.push(envelope),
            Err(reason) => extracted.quarantined.push(QuarantinedEnvelope {
                line: index + 1,
                reason,
            }),
        }
    }

    extracted
}

fn parse_envelope(body: &str) -> std::result::Result<MessageEnvelope, String> {
    let body = body.trim();
    if body.is_empty() {
        return Err("empty envelope".to_string());
    }
    let envelope: MessageEnvelope = serde_json::from_str(body).map_err(|e| e.to_string())?;
    if envelope.to.trim().is_empty() {
        return Err("empty recipient".to_string());
    }
    Ok(envelope)
}

/// Instructions appended to system prompts when communication is enabled.
pub fn protocol_instructions() -> String {
    format!(
        "To send a message to another agent, emit a single line:\n\
         {} {{\"to\": \"<agent-name or *>\", \"type\": \"data|request|response|broadcast\", \"content\": <json>}}\n\
         Use \"*\" with type \"broadcast\" to address every agent. Lines that are not valid JSON are discarded.",
        ENVELOPE_PREFIX
    )
}
