use std::collections::HashSet;

use mcphost_common::{ContentSegment, Role, Transcript, Turn};

/// Keep the last `window` turns, then drop any invocation whose result fell
/// outside the window and any result whose invocation did.
///
/// Assistant turns emptied by this are removed. Other turns are removed only if
/// repair emptied them; a turn that arrived empty stays.
pub fn prune(transcript: &Transcript, window: usize) -> Transcript {
    if transcript.len() <= window {
        return transcript.clone();
    }
    Transcript::from_turns(repair(&transcript.turns()[transcript.len() - window..]))
}

/// Copy `turns` with every unpaired invocation and result removed, using the
/// same turn-keeping rules as [`prune`].
pub fn repair(turns: &[Turn]) -> Vec<Turn> {
    let invocations: HashSet<&str> = turns
        .iter()
        .flat_map(|turn| turn.content.iter())
        .filter_map(ContentSegment::invocation_id)
        .collect();
    let answered: HashSet<&str> = turns
        .iter()
        .flat_map(|turn| turn.content.iter())
        .filter_map(ContentSegment::result_ref)
        .collect();

    let mut repaired = Vec::with_capacity(turns.len());
    for turn in turns {
        let content: Vec<ContentSegment> = turn
            .content
            .iter()
            .filter(|segment| match segment {
                ContentSegment::ToolUse { id, .. } => answered.contains(id.as_str()),
                ContentSegment::ToolResult { tool_use_id, .. } => {
                    invocations.contains(tool_use_id.as_str())
                }
                ContentSegment::Text { .. } => true,
            })
            .cloned()
            .collect();

        let keep = match turn.role {
            Role::Assistant => !content.is_empty(),
            Role::User | Role::Tool => !content.is_empty() || turn.content.is_empty(),
        };
        if keep {
            repaired.push(Turn::new(turn.role, content));
        }
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invocation(id: &str) -> ContentSegment {
        ContentSegment::ToolUse {
            id: id.to_string(),
            name: "fs__read".to_string(),
            input: json!({}),
        }
    }

    fn result(id: &str) -> Turn {
        Turn::tool(ContentSegment::tool_result(
            id,
            vec![json!({ "type": "text", "text": "ok" })],
        ))
    }

    fn assistant(content: Vec<ContentSegment>) -> Turn {
        Turn::new(Role::Assistant, content)
    }

    /// user, assistant(call_1), tool(call_1), assistant(text),
    /// user, assistant(call_2), tool(call_2)
    fn sample() -> Transcript {
        Transcript::from_turns(vec![
            Turn::user_text("read a"),
            assistant(vec![invocation("call_1")]),
            result("call_1"),
            assistant(vec![ContentSegment::text("a says ok")]),
            Turn::user_text("read b"),
            assistant(vec![ContentSegment::text("reading"), invocation("call_2")]),
            result("call_2"),
        ])
    }

    #[test]
    fn short_transcript_is_untouched() {
        let transcript = sample();
        assert_eq!(prune(&transcript, 7), transcript);
        assert_eq!(prune(&transcript, 100), transcript);
    }

    #[test]
    fn orphaned_result_is_dropped() {
        // window starts at tool(call_1); its invocation is gone
        let pruned = prune(&sample(), 5);
        assert_eq!(pruned.len(), 4);
        assert_eq!(pruned.turns()[0].role, Role::Assistant);
        assert!(pruned.is_well_paired());
    }

    #[test]
    fn invocation_without_result_is_stripped() {
        let transcript = Transcript::from_turns(vec![
            Turn::user_text("go"),
            assistant(vec![ContentSegment::text("trying"), invocation("call_1")]),
            Turn::user_text("never mind"),
            assistant(vec![invocation("call_2")]),
        ]);
        let pruned = prune(&transcript, 3);
        let turns = pruned.turns();
        // assistant keeps its text, loses the unanswered call
        assert_eq!(turns[0].content, vec![ContentSegment::text("trying")]);
        // the call-only assistant turn is emptied and removed
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].text(), "never mind");
    }

    #[test]
    fn empty_user_turn_survives() {
        let transcript = Transcript::from_turns(vec![
            Turn::user_text("one"),
            Turn::new(Role::User, vec![]),
            assistant(vec![ContentSegment::text("two")]),
        ]);
        let pruned = prune(&transcript, 2);
        assert_eq!(pruned.len(), 2);
        assert!(pruned.turns()[0].content.is_empty());
    }

    #[test]
    fn zero_window_empties_transcript() {
        assert!(prune(&sample(), 0).is_empty());
    }

    #[test]
    fn pruning_is_idempotent_and_bounded() {
        let transcript = sample();
        for window in 0..=transcript.len() + 1 {
            let once = prune(&transcript, window);
            assert!(once.len() <= window);
            assert!(once.is_well_paired(), "window {window}");
            assert_eq!(prune(&once, window), once, "window {window}");
        }
    }

    #[test]
    fn repair_keeps_paired_history_whole() {
        let transcript = Transcript::from_turns(vec![
            Turn::user_text("go"),
            assistant(vec![invocation("call_1"), invocation("call_2")]),
            result("call_2"),
        ]);

        let repaired = repair(transcript.turns());
        assert_eq!(repaired.len(), 3);
        assert_eq!(repaired[1].content.len(), 1);
        assert_eq!(repaired[1].content[0].invocation_id(), Some("call_2"));
        assert_eq!(repair(sample().turns()), sample().turns().to_vec());
    }
}
