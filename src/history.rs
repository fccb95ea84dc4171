//! Extensions to handle lists of conversation messages.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Drop messages that carry nothing the model could use. Order is preserved.
pub fn sanitize(messages: Vec<Message>) -> Vec<Message> {
    messages
        .into_iter()
        .filter(|m| !m.content.trim().is_empty())
        .collect()
}

/// Separate the request prompt (the trailing user message) from the history before it.
/// Returns `None` when the conversation does not end with a user message.
pub fn split_prompt(mut messages: Vec<Message>) -> Option<(Vec<Message>, String)> {
    match messages.last() {
        Some(Message {
            role: Role::User, ..
        }) => {
            let prompt = messages.pop()?.content;
            Some((messages, prompt))
        }
        _ => None,
    }
}

/// The last `window` messages.
pub fn recent(messages: &[Message], window: usize) -> &[Message] {
    let start = messages.len().saturating_sub(window);
    &messages[start..]
}

/// Join commentary fragments the way they are shown and persisted.
pub fn join_commentary(fragments: &[String]) -> String {
    fragments
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_is_last_user_message() {
        let messages = vec![
            Message::user("build a todo app"),
            Message::assistant("Done."),
            Message::user("make it blue"),
        ];
        let (history, prompt) = split_prompt(messages).unwrap();
        assert_eq!(prompt, "make it blue");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[test]
    fn no_prompt_after_assistant() {
        assert!(split_prompt(vec![Message::assistant("hi")]).is_none());
        assert!(split_prompt(Vec::new()).is_none());
    }

    #[test]
    fn sanitize_keeps_order_and_drops_blank() {
        let cleaned = sanitize(vec![
            Message::user("a"),
            Message::assistant("   "),
            Message::user("b"),
        ]);
        assert_eq!(cleaned, vec![Message::user("a"), Message::user("b")]);
    }

    #[test]
    fn recent_window() {
        let messages: Vec<Message> = (0..15).map(|i| Message::user(i.to_string())).collect();
        let tail = recent(&messages, 10);
        assert_eq!(tail.len(), 10);
        assert_eq!(tail[0].content, "5");
        assert_eq!(recent(&messages[..3], 10).len(), 3);
    }

    #[test]
    fn commentary_joined_with_blank_lines() {
        let joined = join_commentary(&[
            "I'll do it.".to_string(),
            String::new(),
            "Done.\n".to_string(),
        ]);
        assert_eq!(joined, "I'll do it.\n\nDone.");
    }
}
