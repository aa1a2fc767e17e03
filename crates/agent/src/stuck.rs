//! Repetition guard.
//!
//! Exact text equality only: a paraphrased loop is not detected.

use stepwise_core::message::Message;

/// Whether the most recent assistant reply repeats earlier ones.
///
/// Counts earlier assistant messages whose text equals the latest assistant
/// message's text and reports stuck once that count reaches `threshold`.
/// Empty replies (e.g. a bare tool-call request) never trigger it, and a
/// threshold of zero disables the guard.
pub fn is_stuck(messages: &[Message], threshold: usize) -> bool {
    if threshold == 0 {
        return false;
    }

    let mut replies = messages.iter().rev().filter(|m| m.is_assistant());
    let Some(latest) = replies.next() else {
        return false;
    };
    if latest.content.trim().is_empty() {
        return false;
    }

    replies.filter(|m| m.content == latest.content).count() >= threshold
}
