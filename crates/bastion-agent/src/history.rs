//! Token-budget-bounded history eviction.
//!
//! Evicts from the front of the conversation in alternating user/assistant
//! pairs so the strict `user, assistant, user, assistant, ...` alternation
//! invariant the rest of the system depends on is never broken, and the
//! current turn (the last two messages) is never evicted.

use bastion_core::{ChatRole, Message};

/// Rough token estimate: JSON/code is denser than prose, so divide
/// character count by 3.5 rather than the usual ~4.
fn estimate_tokens(messages: &[Message]) -> usize {
    let chars: usize = messages.iter().map(|m| m.content.char_len()).sum();
    ((chars as f64) / 3.5).ceil() as usize
}

/// Trim `messages` in place while the token estimate exceeds `max_tokens`
/// and at least three messages remain. Returns `Some((removed, remaining,
/// new_estimate))` if any eviction happened, for the caller to log
/// `history_trimmed`.
pub fn trim_history(messages: &mut Vec<Message>, max_tokens: usize) -> Option<(usize, usize, usize)> {
    let before = messages.len();

    while estimate_tokens(messages) > max_tokens && messages.len() >= 3 {
        // The while condition guarantees at least 3 messages here, so the
        // current turn (the last two) is never touched by this remove.
        messages.remove(0);
        if messages.len() > 2 && messages[0].role == ChatRole::Assistant {
            messages.remove(0);
        }
    }

    let removed = before - messages.len();
    if removed == 0 {
        None
    } else {
        Some((removed, messages.len(), estimate_tokens(messages)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::ContentBlock;

    fn user(text: &str) -> Message {
        Message::user_text(text)
    }

    fn assistant(text: &str) -> Message {
        Message::assistant_blocks(vec![ContentBlock::text(text)])
    }

    #[test]
    fn no_trim_when_under_budget() {
        let mut history = vec![user("hi"), assistant("hello")];
        let result = trim_history(&mut history, 100_000);
        assert!(result.is_none());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn trims_preserving_alternation_and_tail() {
        let mut history: Vec<Message> = (0..10)
            .map(|i| {
                if i % 2 == 0 {
                    user(&"x".repeat(350))
                } else {
                    assistant(&"y".repeat(350))
                }
            })
            .collect();
        let original_tail = history[8..10].to_vec();

        let estimate_before = estimate_tokens(&history);
        assert!(estimate_before > 200);

        let result = trim_history(&mut history, 200);
        assert!(result.is_some());

        assert_eq!(history.len() % 2, 0);
        for i in 0..history.len() / 2 {
            assert_eq!(history[2 * i].role, ChatRole::User);
            assert_eq!(history[2 * i + 1].role, ChatRole::Assistant);
        }
        assert_eq!(&history[history.len() - 2..], &original_tail[..]);
    }

    #[test]
    fn never_evicts_below_two_messages() {
        let mut history = vec![user(&"x".repeat(10_000)), assistant(&"y".repeat(10_000))];
        let result = trim_history(&mut history, 1);
        assert!(result.is_none());
        assert_eq!(history.len(), 2);
    }
}
