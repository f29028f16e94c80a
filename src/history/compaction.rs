//! History shortening.
//!
//! Pure functions over `Vec<Message>`. The caller obtains the summary text
//! (usually from a [`Summarizer`](super::Summarizer)) before collapsing.

use super::types::{Message, Role};

/// How aggressively a history is collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionMode {
    /// Summarize the oldest half, keeping tool call/result pairs together.
    Shorten,
    /// Drop everything with non-text content, then summarize all of it.
    ShortenWithoutMedia,
}

/// Index splitting `messages` into the part to summarize and the part to keep.
///
/// Starts at the midpoint and moves forward past tool results and assistant
/// turns that requested tools, so the kept tail never opens with a result
/// whose call was summarized away.
///
/// ```
/// use murmur::history::{Message, ToolCall};
/// use murmur::history::compaction::shorten_cut;
///
/// let msgs = vec![
///     Message::user("a"),
///     Message::assistant_with_tools("", vec![ToolCall::new("1", "think", "{}")]),
///     Message::tool_result("1", "ok"),
///     Message::assistant("b"),
/// ];
/// assert_eq!(shorten_cut(&msgs), 3);
/// ```
pub fn shorten_cut(messages: &[Message]) -> usize {
    let mut cut = messages.len() / 2;
    while cut < messages.len()
        && (messages[cut].role == Role::Tool || messages[cut].has_tool_calls())
    {
        cut += 1;
    }
    cut
}

/// Replace `messages[..cut]` with a single assistant message holding `summary`.
pub fn collapse(messages: Vec<Message>, cut: usize, summary: &str) -> Vec<Message> {
    let cut = cut.min(messages.len());
    let mut out = Vec::with_capacity(messages.len() - cut + 1);
    out.push(Message::assistant(summary));
    out.extend(messages.into_iter().skip(cut));
    out
}

/// Messages without images or other media.
pub fn text_only(messages: Vec<Message>) -> Vec<Message> {
    messages.into_iter().filter(|m| !m.has_media()).collect()
}

/// Render messages as a plain transcript for summarization.
pub fn transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        let body = match (&msg.refusal, msg.has_tool_calls()) {
            (Some(refusal), _) => refusal.clone(),
            (None, true) => {
                let names: Vec<&str> = msg
                    .tool_calls
                    .iter()
                    .flatten()
                    .map(|c| c.name.as_str())
                    .collect();
                format!("{} [called: {}]", msg.content, names.join(", "))
            }
            (None, false) => msg.content.clone(),
        };
        if body.trim().is_empty() {
            continue;
        }
        out.push_str(&format!("{}: {}\n", msg.role, body.trim()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ToolCall;

    fn chat(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(&format!("u{}", i))
                } else {
                    Message::assistant(&format!("a{}", i))
                }
            })
            .collect()
    }

    #[test]
    fn test_cut_is_midpoint_for_plain_chat() {
        assert_eq!(shorten_cut(&chat(6)), 3);
        assert_eq!(shorten_cut(&chat(5)), 2);
        assert_eq!(shorten_cut(&[]), 0);
    }

    #[test]
    fn test_cut_moves_past_tool_pairs() {
        let msgs = vec![
            Message::user("a"),
            Message::user("b"),
            Message::assistant_with_tools("", vec![ToolCall::new("1", "think", "{}")]),
            Message::tool_result("1", "x"),
            Message::tool_result("2", "y"),
            Message::assistant("c"),
        ];
        let cut = shorten_cut(&msgs);
        assert_eq!(cut, 5);
        assert_eq!(msgs[cut].role, Role::Assistant);
    }

    #[test]
    fn test_cut_may_consume_everything() {
        let msgs = vec![
            Message::user("a"),
            Message::assistant_with_tools("", vec![ToolCall::new("1", "think", "{}")]),
            Message::tool_result("1", "x"),
        ];
        assert_eq!(shorten_cut(&msgs), 3);
    }

    #[test]
    fn test_collapse_replaces_head() {
        let out = collapse(chat(6), 3, "summary");
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].role, Role::Assistant);
        assert_eq!(out[0].content, "summary");
        assert_eq!(out[1].content, "a3");
    }

    #[test]
    fn test_text_only_drops_media() {
        let msgs = vec![
            Message::user("pic").with_images(vec!["https://x/1.png".into()]),
            Message::user("words"),
        ];
        let out = text_only(msgs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "words");
    }

    #[test]
    fn test_transcript_format() {
        let msgs = vec![
            Message::user("hello"),
            Message::assistant_with_tools("", vec![ToolCall::new("1", "think", "{}")]),
            Message::tool_result("1", ""),
        ];
        let text = transcript(&msgs);
        assert_eq!(text, "user: hello\nassistant: [called: think]\n");
    }
}
