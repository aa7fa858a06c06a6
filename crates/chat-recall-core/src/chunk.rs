//! Sliding-window text chunker and chunk builders.
//!
//! Long assistant replies are split into fixed-size, overlapping windows so
//! that each embedded unit stays within the embedding model's useful range.
//! Each conversation additionally gets one *topic* chunk built from its name,
//! summary, and opening human turns.
//!
//! Lengths are counted in characters (Unicode scalar values), never bytes, so
//! a window never splits a UTF-8 sequence.
//!
//! # Example
//!
//! ```rust
//! use chat_recall_core::chunk::chunk_text;
//!
//! let text = "a".repeat(2000);
//! let chunks = chunk_text(&text, 500, 100);
//! assert_eq!(chunks.len(), 5);
//! assert_eq!(chunks[4].chars().count(), 400);
//! ```

use crate::models::{AssistantMessage, Chunk, ChunkMetadata, Conversation, Message, Sender};

/// Maximum characters per message chunk.
pub const MAX_CHUNK_CHARS: usize = 1600;

/// Characters shared between consecutive message chunks.
pub const CHUNK_OVERLAP: usize = 200;

/// Cap applied to each human message contributing to a topic chunk.
pub const TOPIC_MESSAGE_CHARS: usize = 800;

/// Number of opening human messages folded into a topic chunk.
const TOPIC_HUMAN_MESSAGES: usize = 2;

/// Split `text` into overlapping windows of at most `max_chars` characters.
///
/// Text that fits is returned whole (an empty string yields one empty
/// chunk). Otherwise a window of `max_chars` slides from position 0 by
/// `max_chars - overlap` until its start reaches the end of the text; the
/// last window is cut at the end of the text.
///
/// Requires `overlap < max_chars`.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    debug_assert!(overlap < max_chars, "overlap must be smaller than max_chars");

    // Byte offset of every char, plus the end of the string.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let len = bounds.len();
    bounds.push(text.len());

    if len <= max_chars {
        return vec![text.to_string()];
    }

    let step = max_chars.saturating_sub(overlap).max(1);
    let mut chunks = Vec::with_capacity(len / step + 1);
    let mut start = 0;
    while start < len {
        let end = (start + max_chars).min(len);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        start += step;
    }
    chunks
}

/// Identifier of a conversation's topic chunk.
pub fn topic_chunk_id(conversation_id: &str) -> String {
    format!("conv-{}", conversation_id)
}

/// Identifier of a message chunk. A message that fits in one window keeps
/// the bare `msg-<id>` form; windows of a split message get a `-c<i>` suffix.
pub fn message_chunk_id(message_id: &str, index: usize, total: usize) -> String {
    if total == 1 {
        format!("msg-{}", message_id)
    } else {
        format!("msg-{}-c{}", message_id, index)
    }
}

/// Build the topic chunk for a conversation.
///
/// The text joins the conversation name, its summary, and the first two
/// human messages (each capped to [`TOPIC_MESSAGE_CHARS`]) with blank lines.
/// Returns `None` when nothing but whitespace remains.
pub fn conversation_topic_chunk(conversation: &Conversation, messages: &[Message]) -> Option<Chunk> {
    let mut parts: Vec<String> = Vec::new();

    if let Some(name) = conversation.name.as_deref().filter(|n| !n.is_empty()) {
        parts.push(name.to_string());
    }
    if let Some(summary) = conversation.summary.as_deref().filter(|s| !s.is_empty()) {
        parts.push(summary.to_string());
    }

    let opening = messages
        .iter()
        .filter(|m| m.sender == Sender::Human)
        .take(TOPIC_HUMAN_MESSAGES);
    for message in opening {
        if let Some(text) = message.text.as_deref().filter(|t| !t.is_empty()) {
            parts.push(text.chars().take(TOPIC_MESSAGE_CHARS).collect());
        }
    }

    let text = parts.join("\n\n").trim().to_string();
    if text.is_empty() {
        return None;
    }

    Some(Chunk {
        id: topic_chunk_id(&conversation.id),
        text,
        metadata: ChunkMetadata {
            conversation_id: conversation.id.clone(),
            message_id: String::new(),
            sender: String::new(),
            conversation_name: conversation.name.clone().unwrap_or_default(),
            date: conversation.created_at.clone().unwrap_or_default(),
            source_id: conversation.source_id.clone(),
        },
    })
}

/// Build the chunks for one assistant message.
///
/// Returns nothing for human messages and for messages without text.
pub fn message_chunks(entry: &AssistantMessage, max_chars: usize, overlap: usize) -> Vec<Chunk> {
    let message = &entry.message;
    let text = match message.text.as_deref() {
        Some(t) if !t.is_empty() && message.sender == Sender::Assistant => t,
        _ => return Vec::new(),
    };

    let metadata = ChunkMetadata {
        conversation_id: message.conversation_id.clone(),
        message_id: message.id.clone(),
        sender: message.sender.to_string(),
        conversation_name: entry.conversation_name.clone().unwrap_or_default(),
        date: message.created_at.clone().unwrap_or_default(),
        source_id: entry.source_id.clone(),
    };

    let windows = chunk_text(text, max_chars, overlap);
    let total = windows.len();
    windows
        .into_iter()
        .enumerate()
        .map(|(i, window)| Chunk {
            id: message_chunk_id(&message.id, i, total),
            text: window,
            metadata: metadata.clone(),
        })
        .collect()
}
