//! Record data structures
//!
//! A [`Record`] is one chat turn as persisted in `chat.jsonl`. Compaction
//! metadata is kept as the raw JSON that was found on disk and validated
//! through accessors, so a malformed marker degrades to "absent" instead of
//! making the whole line unreadable.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

/// Maximum number of bytes of a malformed line echoed into the log
const PREVIEW_BYTES: usize = 80;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// Lifecycle of a tool call part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ToolState {
    InputStreaming,
    InputAvailable,
    OutputAvailable,
    OutputError,
    /// A state written by a newer producer, kept verbatim and never terminal
    Other(String),
}

impl ToolState {
    pub fn as_str(&self) -> &str {
        match self {
            ToolState::InputStreaming => "input-streaming",
            ToolState::InputAvailable => "input-available",
            ToolState::OutputAvailable => "output-available",
            ToolState::OutputError => "output-error",
            ToolState::Other(state) => state,
        }
    }
}

impl From<String> for ToolState {
    fn from(state: String) -> Self {
        match state.as_str() {
            "input-streaming" => ToolState::InputStreaming,
            "input-available" => ToolState::InputAvailable,
            "output-available" => ToolState::OutputAvailable,
            "output-error" => ToolState::OutputError,
            _ => ToolState::Other(state),
        }
    }
}

impl From<ToolState> for String {
    fn from(state: ToolState) -> Self {
        match state {
            ToolState::Other(state) => state,
            known => known.as_str().to_string(),
        }
    }
}

/// Typed content fragment of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    File {
        #[serde(rename = "mediaType")]
        media_type: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    DynamicTool {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        state: ToolState,
        #[serde(default)]
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
    },
    /// Any part type this engine does not model, stored as found
    #[serde(untagged)]
    Other(Value),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Part::Reasoning { text: text.into() }
    }

    /// Whether this part carries content worth making durable.
    ///
    /// Tool calls only count once their output is available; replaying an
    /// unfinished call later produces invalid provider requests.
    pub fn is_commit_worthy(&self) -> bool {
        match self {
            Part::Text { text } | Part::Reasoning { text } => !text.is_empty(),
            Part::File { .. } => true,
            Part::DynamicTool { state, .. } => *state == ToolState::OutputAvailable,
            Part::Other(_) => false,
        }
    }
}

/// Why a compaction summary was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactedKind {
    /// Requested by the user (also the meaning of the legacy `true` flag)
    User,
    /// Triggered by the idle compaction scheduler
    Idle,
}

impl CompactedKind {
    /// Interpret a persisted `compacted` value
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(true) => Some(CompactedKind::User),
            Value::String(s) if s == "user" => Some(CompactedKind::User),
            Value::String(s) if s == "idle" => Some(CompactedKind::Idle),
            _ => None,
        }
    }

    pub fn to_value(self) -> Value {
        match self {
            CompactedKind::User => Value::String("user".to_string()),
            CompactedKind::Idle => Value::String("idle".to_string()),
        }
    }
}

/// Structured metadata attached to a record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// Position in the conversation; unique and strictly increasing
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_sequence"
    )]
    pub history_sequence: Option<u64>,

    /// Wall-clock milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compacted: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction_boundary: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction_epoch: Option<Value>,

    /// Typed summary payload written by the compaction executor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction_summary: Option<Value>,

    /// Transient stream error annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    /// Staging marker, only present on `partial.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,

    /// Fields this engine does not interpret (model, usage, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RecordMetadata {
    pub fn is_empty(&self) -> bool {
        *self == RecordMetadata::default()
    }

    pub fn compacted_kind(&self) -> Option<CompactedKind> {
        self.compacted.as_ref().and_then(CompactedKind::from_value)
    }

    /// The boundary flag as written, without checking the other conditions
    pub fn claims_boundary(&self) -> bool {
        matches!(self.compaction_boundary, Some(Value::Bool(true)))
    }

    /// The epoch, if it is a positive integer
    pub fn epoch(&self) -> Option<u64> {
        self.compaction_epoch
            .as_ref()
            .and_then(Value::as_u64)
            .filter(|epoch| *epoch > 0)
    }
}

/// One chat turn persisted to the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "RecordMetadata::is_empty")]
    pub metadata: RecordMetadata,
    #[serde(
        rename = "conversationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub conversation_id: Option<String>,
}

impl Record {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            parts: Vec::new(),
            metadata: RecordMetadata::default(),
            conversation_id: None,
        }
    }

    /// Create a user record with a single text part
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::User).with_part(Part::text(text))
    }

    /// Create an assistant record with a single text part
    pub fn assistant(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant).with_part(Part::text(text))
    }

    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.metadata.history_sequence = Some(sequence);
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.metadata.timestamp = Some(timestamp_ms);
        self
    }

    /// Stamp the current wall-clock time
    pub fn timestamped_now(self) -> Self {
        self.with_timestamp(chrono::Utc::now().timestamp_millis())
    }

    /// Mark this record as a compaction summary that opens a new epoch
    pub fn with_compaction_boundary(mut self, kind: CompactedKind, epoch: u64) -> Self {
        self.metadata.compacted = Some(kind.to_value());
        self.metadata.compaction_boundary = Some(Value::Bool(true));
        self.metadata.compaction_epoch = Some(Value::from(epoch));
        self
    }

    pub fn sequence(&self) -> Option<u64> {
        self.metadata.history_sequence
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.metadata.timestamp
    }

    /// Epoch of this record if it is a valid durable compaction boundary
    pub fn boundary_epoch(&self) -> Option<u64> {
        if self.role != Role::Assistant || !self.metadata.claims_boundary() {
            return None;
        }
        self.metadata.compacted_kind()?;
        self.metadata.epoch()
    }

    pub fn is_compaction_boundary(&self) -> bool {
        self.boundary_epoch().is_some()
    }

    /// Why a record flagged as a boundary is not a valid one
    pub fn boundary_defect(&self) -> Option<&'static str> {
        if !self.metadata.claims_boundary() {
            return None;
        }
        if self.role != Role::Assistant {
            Some("boundary on a non-assistant record")
        } else if self.metadata.compacted_kind().is_none() {
            Some("boundary without a valid compacted marker")
        } else if self.metadata.epoch().is_none() {
            Some("boundary without a positive compaction epoch")
        } else {
            None
        }
    }

    /// Approximate token cost of the serialized record (~4 bytes per token)
    pub fn approx_tokens(&self) -> usize {
        serde_json::to_string(self)
            .map(|json| json.len().div_ceil(4))
            .unwrap_or(1)
            .max(1)
    }
}

/// Accept any JSON for `historySequence`, keeping only non-negative integers
fn lenient_sequence<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_u64))
}

/// Parse one log line, logging and discarding anything malformed
pub fn parse_line(line: &[u8]) -> Option<Record> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Record>(trimmed) {
        Ok(record) => Some(record),
        Err(e) => {
            let preview = String::from_utf8_lossy(&trimmed[..trimmed.len().min(PREVIEW_BYTES)]);
            warn!("Skipping malformed history line: {} - line: {}", e, preview);
            None
        }
    }
}

/// Serialize a record as one JSONL line including the trailing newline
pub fn to_line(record: &Record) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_json_shape() {
        let record = Record::assistant("m1", "hello")
            .with_sequence(4)
            .with_timestamp(1_700_000_000_000);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "m1",
                "role": "assistant",
                "parts": [{"type": "text", "text": "hello"}],
                "metadata": {"historySequence": 4, "timestamp": 1_700_000_000_000i64}
            })
        );
    }

    #[test]
    fn test_parse_line_keeps_unknown_metadata() {
        let line = br#"{"id":"a","role":"assistant","parts":[],"metadata":{"historySequence":1,"model":"claude"}}"#;
        let record = parse_line(line).unwrap();
        assert_eq!(record.metadata.extra.get("model"), Some(&json!("claude")));
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["metadata"]["model"], json!("claude"));
    }

    #[test]
    fn test_parse_line_rejects_garbage() {
        assert!(parse_line(b"{not json").is_none());
        assert!(parse_line(b"   ").is_none());
        assert!(parse_line(br#"{"id":"a"}"#).is_none());
    }

    #[test]
    fn test_invalid_sequence_is_dropped_not_fatal() {
        let line = br#"{"id":"a","role":"user","parts":[],"metadata":{"historySequence":-3}}"#;
        let record = parse_line(line).unwrap();
        assert_eq!(record.sequence(), None);
    }

    #[test]
    fn test_valid_boundary() {
        let record = Record::assistant("s", "summary").with_compaction_boundary(CompactedKind::Idle, 2);
        assert_eq!(record.boundary_epoch(), Some(2));
        assert_eq!(record.boundary_defect(), None);
    }

    #[test]
    fn test_legacy_compacted_flag_counts() {
        let mut record = Record::assistant("s", "summary");
        record.metadata.compacted = Some(json!(true));
        record.metadata.compaction_boundary = Some(json!(true));
        record.metadata.compaction_epoch = Some(json!(1));
        assert!(record.is_compaction_boundary());
    }

    #[test]
    fn test_malformed_boundaries_are_not_boundaries() {
        let mut zero_epoch =
            Record::assistant("s", "summary").with_compaction_boundary(CompactedKind::User, 1);
        zero_epoch.metadata.compaction_epoch = Some(json!(0));
        assert!(!zero_epoch.is_compaction_boundary());
        assert!(zero_epoch.boundary_defect().is_some());

        let mut bad_kind =
            Record::assistant("s", "summary").with_compaction_boundary(CompactedKind::User, 1);
        bad_kind.metadata.compacted = Some(json!("sometimes"));
        assert!(!bad_kind.is_compaction_boundary());

        let user_role =
            Record::user("s", "summary").with_compaction_boundary(CompactedKind::User, 1);
        assert!(!user_role.is_compaction_boundary());

        let mut fractional =
            Record::assistant("s", "summary").with_compaction_boundary(CompactedKind::User, 1);
        fractional.metadata.compaction_epoch = Some(json!(1.5));
        assert!(!fractional.is_compaction_boundary());
    }

    #[test]
    fn test_commit_worthy_parts() {
        assert!(Part::text("x").is_commit_worthy());
        assert!(!Part::text("").is_commit_worthy());
        assert!(!Part::reasoning("").is_commit_worthy());
        let pending = Part::DynamicTool {
            tool_call_id: "t1".into(),
            tool_name: "bash".into(),
            state: ToolState::InputAvailable,
            input: json!({"cmd": "ls"}),
            output: None,
        };
        assert!(!pending.is_commit_worthy());
        let done = Part::DynamicTool {
            tool_call_id: "t1".into(),
            tool_name: "bash".into(),
            state: ToolState::OutputAvailable,
            input: json!({"cmd": "ls"}),
            output: Some(json!("file.txt")),
        };
        assert!(done.is_commit_worthy());
    }

    #[test]
    fn test_unknown_parts_and_tool_states_survive() {
        let line = br#"{"id":"a1","role":"assistant","parts":[{"type":"step-start"},{"type":"dynamic-tool","toolCallId":"t1","toolName":"bash","state":"approval-requested","input":{}},{"type":"text","text":"hi"}],"metadata":{"historySequence":1}}"#;
        let record = parse_line(line).unwrap();
        assert_eq!(record.parts.len(), 3);
        assert_eq!(record.parts[0], Part::Other(json!({"type": "step-start"})));
        assert!(matches!(
            &record.parts[1],
            Part::DynamicTool { state: ToolState::Other(s), .. } if s == "approval-requested"
        ));
        assert!(!record.parts[0].is_commit_worthy());
        assert!(!record.parts[1].is_commit_worthy());

        let original: Value = serde_json::from_slice(line).unwrap();
        let written: Value = serde_json::from_slice(&to_line(&record).unwrap()).unwrap();
        assert_eq!(written, original);
    }

    #[test]
    fn test_approx_tokens_grows_with_content() {
        let small = Record::user("a", "hi");
        let large = Record::user("a", "hi".repeat(400));
        assert!(small.approx_tokens() >= 1);
        assert!(large.approx_tokens() > small.approx_tokens() + 100);
    }
}
