use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed piece of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentSegment {
    #[serde(rename = "text")]
    Text { text: String },
    /// A tool invocation requested by the model. `name` is the fully-qualified
    /// `<server>__<tool>` name as the provider sent it.
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// The answer to the invocation `tool_use_id`. `content` is the raw item list
    /// returned by the tool server; `text` is its flattened plain-text summary.
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: Vec<serde_json::Value>,
        text: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentSegment {
    pub fn text(text: impl Into<String>) -> Self {
        ContentSegment::Text { text: text.into() }
    }

    /// Wrap raw tool output, deriving the text summary from its text items.
    pub fn tool_result(tool_use_id: impl Into<String>, content: Vec<serde_json::Value>) -> Self {
        let text = flatten_text(&content);
        ContentSegment::ToolResult {
            tool_use_id: tool_use_id.into(),
            content,
            text,
            is_error: false,
        }
    }

    /// A synthetic result carrying an error message back to the model.
    pub fn error_result(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        ContentSegment::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: vec![serde_json::json!({ "type": "text", "text": message })],
            text: message,
            is_error: true,
        }
    }

    /// Identifier of the invocation, if this is one.
    pub fn invocation_id(&self) -> Option<&str> {
        match self {
            ContentSegment::ToolUse { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Back-reference of the result, if this is one.
    pub fn result_ref(&self) -> Option<&str> {
        match self {
            ContentSegment::ToolResult { tool_use_id, .. } => Some(tool_use_id),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ContentSegment::Text { .. })
    }
}

/// Concatenate every plain-text item of a tool result, trimmed.
pub fn flatten_text(content: &[serde_json::Value]) -> String {
    let mut out = String::new();
    for item in content {
        if item["type"] == "text"
            && let Some(text) = item["text"].as_str()
        {
            out.push_str(text);
            out.push(' ');
        }
    }
    out.trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentSegment>,
}

impl Turn {
    pub fn new(role: Role, content: Vec<ContentSegment>) -> Self {
        Self { role, content }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentSegment::text(text)])
    }

    /// A `tool` turn holding exactly one result segment.
    pub fn tool(result: ContentSegment) -> Self {
        debug_assert!(result.result_ref().is_some(), "tool turns hold results only");
        Self::new(Role::Tool, vec![result])
    }

    /// All text segments joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|segment| match segment {
                ContentSegment::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_text(&self) -> bool {
        self.content.iter().any(ContentSegment::is_text)
    }

    pub fn invocations(&self) -> impl Iterator<Item = &ContentSegment> {
        self.content.iter().filter(|s| s.invocation_id().is_some())
    }
}

/// Ordered conversation log for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    /// Append a turn. Every result it carries must answer an invocation that is
    /// already in the transcript.
    pub fn push(&mut self, turn: Turn) {
        debug_assert!(
            turn.content
                .iter()
                .filter_map(ContentSegment::result_ref)
                .all(|id| self.has_invocation(id)),
            "tool result appended before its invocation"
        );
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    fn has_invocation(&self, id: &str) -> bool {
        self.turns
            .iter()
            .flat_map(|t| t.content.iter())
            .any(|s| s.invocation_id() == Some(id))
    }

    /// True when every result answers an invocation from an earlier turn and no
    /// invocation has been answered more than once.
    pub fn is_well_paired(&self) -> bool {
        let mut issued: HashSet<&str> = HashSet::new();
        let mut answered: HashSet<&str> = HashSet::new();
        for turn in &self.turns {
            for segment in &turn.content {
                if let Some(id) = segment.result_ref()
                    && (!issued.contains(id) || !answered.insert(id))
                {
                    return false;
                }
            }
            issued.extend(turn.content.iter().filter_map(ContentSegment::invocation_id));
        }
        true
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invocation(id: &str) -> ContentSegment {
        ContentSegment::ToolUse {
            id: id.to_string(),
            name: "fs__read".to_string(),
            input: json!({ "path": "/tmp" }),
        }
    }

    #[test]
    fn test_flatten_text_joins_text_items_and_trims() {
        let content = vec![
            json!({ "type": "text", "text": "first" }),
            json!({ "type": "image", "data": "aGVsbG8=", "mimeType": "image/png" }),
            json!({ "type": "text", "text": "second" }),
        ];
        assert_eq!(flatten_text(&content), "first second");
        assert_eq!(flatten_text(&[]), "");
    }

    #[test]
    fn test_error_result_carries_message_in_text() {
        let segment = ContentSegment::error_result("call_1", "Error calling tool read: boom");
        match segment {
            ContentSegment::ToolResult {
                tool_use_id,
                text,
                is_error,
                content,
            } => {
                assert_eq!(tool_use_id, "call_1");
                assert_eq!(text, "Error calling tool read: boom");
                assert!(is_error);
                assert_eq!(content[0]["text"], "Error calling tool read: boom");
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[test]
    fn test_segment_serializes_with_type_tag() {
        let value = serde_json::to_value(invocation("call_1")).unwrap();
        assert_eq!(value["type"], "tool_use");
        assert_eq!(value["id"], "call_1");

        let value = serde_json::to_value(ContentSegment::text("hi")).unwrap();
        assert_eq!(value, json!({ "type": "text", "text": "hi" }));
    }

    #[test]
    fn test_turn_text_skips_tool_segments() {
        let turn = Turn::new(
            Role::Assistant,
            vec![ContentSegment::text("let me look"), invocation("call_1")],
        );
        assert_eq!(turn.text(), "let me look");
        assert!(turn.has_text());
        assert_eq!(turn.invocations().count(), 1);
    }

    #[test]
    fn test_well_paired_transcript() {
        let mut transcript = Transcript::new();
        transcript.push(Turn::user_text("list files"));
        transcript.push(Turn::new(Role::Assistant, vec![invocation("call_1")]));
        transcript.push(Turn::tool(ContentSegment::tool_result(
            "call_1",
            vec![json!({ "type": "text", "text": "a.txt" })],
        )));
        assert!(transcript.is_well_paired());
        assert_eq!(transcript.len(), 3);
    }

    #[test]
    fn test_duplicate_result_is_not_well_paired() {
        let transcript = Transcript::from_turns(vec![
            Turn::new(Role::Assistant, vec![invocation("call_1")]),
            Turn::tool(ContentSegment::tool_result("call_1", vec![])),
            Turn::tool(ContentSegment::tool_result("call_1", vec![])),
        ]);
        assert!(!transcript.is_well_paired());
    }

    #[test]
    fn test_result_before_invocation_is_not_well_paired() {
        let transcript = Transcript::from_turns(vec![
            Turn::tool(ContentSegment::tool_result("call_1", vec![])),
            Turn::new(Role::Assistant, vec![invocation("call_1")]),
        ]);
        assert!(!transcript.is_well_paired());
    }

    #[test]
    fn test_transcript_round_trips_as_plain_array() {
        let transcript = Transcript::from_turns(vec![Turn::user_text("hello")]);
        let value = serde_json::to_value(&transcript).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["role"], "user");
        let back: Transcript = serde_json::from_value(value).unwrap();
        assert_eq!(back, transcript);
    }
}
