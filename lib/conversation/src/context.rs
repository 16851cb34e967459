//! Model context construction.

use crate::message::{Message, MessageRole};
use parlance_ai::ChatMessage;

/// Number of past messages replayed into the model context.
pub const CONTEXT_WINDOW: usize = 20;

/// Builds the provider context for a new user message.
///
/// The result is the system instruction, then the last [`CONTEXT_WINDOW`]
/// user/assistant messages of `history` in order, then the new user message.
/// Tool-call records on past messages are not replayed.
#[must_use]
pub fn build_context(
    system_prompt: &str,
    history: &[Message],
    user_text: &str,
) -> Vec<ChatMessage> {
    let qualifying: Vec<&Message> = history
        .iter()
        .filter(|m| m.role.is_conversational())
        .collect();
    let window = &qualifying[qualifying.len().saturating_sub(CONTEXT_WINDOW)..];

    let mut context = Vec::with_capacity(window.len() + 2);
    context.push(ChatMessage::system(system_prompt));
    context.extend(window.iter().map(|m| match m.role {
        MessageRole::Assistant => ChatMessage::assistant(&m.content),
        _ => ChatMessage::user(&m.content),
    }));
    context.push(ChatMessage::user(user_text));
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlance_ai::ChatRole;

    fn history(turns: usize) -> Vec<Message> {
        (0..turns)
            .flat_map(|i| {
                [
                    Message::user(format!("question {i}")),
                    Message::assistant(format!("answer {i}")),
                ]
            })
            .collect()
    }

    #[test]
    fn short_history_is_replayed_whole() {
        let context = build_context("sys", &history(2), "next");

        assert_eq!(context.len(), 6);
        assert_eq!(context[0].role, ChatRole::System);
        assert_eq!(context[1].content.as_deref(), Some("question 0"));
        assert_eq!(context[4].role, ChatRole::Assistant);
        assert_eq!(context[5].content.as_deref(), Some("next"));
    }

    #[test]
    fn long_history_is_windowed_to_most_recent() {
        for turns in [10, 11, 50] {
            let context = build_context("sys", &history(turns), "next");
            assert_eq!(context.len(), CONTEXT_WINDOW + 2);

            let first_replayed = format!("question {}", turns - CONTEXT_WINDOW / 2);
            assert_eq!(context[1].content.as_deref(), Some(first_replayed.as_str()));
            let last_replayed = format!("answer {}", turns - 1);
            assert_eq!(
                context[CONTEXT_WINDOW].content.as_deref(),
                Some(last_replayed.as_str())
            );
        }
    }

    #[test]
    fn non_conversational_roles_are_excluded() {
        let mut past = history(1);
        past.insert(1, Message::new(MessageRole::System, "internal"));
        past.push(Message::new(MessageRole::Tool, "{}"));

        let context = build_context("sys", &past, "next");
        let contents: Vec<_> = context.iter().filter_map(|m| m.content.as_deref()).collect();
        assert_eq!(contents, vec!["sys", "question 0", "answer 0", "next"]);
    }
}
