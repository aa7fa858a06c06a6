//! Token-budgeted context assembly with citation headers.
//!
//! Each result becomes one block:
//!
//! ```text
//! [2] Conversation: Index fund investing (Mar 10, 2025)
//! Index funds offer broad diversification and low fees.
//! ```
//!
//! Blocks are packed in rank order. A block that would push the running
//! token estimate past the budget is skipped and packing continues with the
//! next one, so a smaller lower-ranked block can still fit. The citation
//! index is the result's position in the input, so skipped blocks leave gaps.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::models::SearchResult;

/// Default token budget for a context block.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 3000;

/// Characters of result text kept per block.
pub const MAX_BLOCK_TEXT_CHARS: usize = 1500;

/// Returned when no block fits (or there are no results).
pub const NO_CONTEXT: &str = "No relevant context found.";

const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Render a stored timestamp as `Mar 10, 2025`, or `None` if it does not
/// parse as RFC 3339, a naive ISO datetime, or a bare date.
pub fn display_date(raw: &str) -> Option<String> {
    let date = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.date()))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|dt| dt.date()))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()?;
    Some(date.format("%b %-d, %Y").to_string())
}

fn citation_header(index: usize, result: &SearchResult) -> String {
    let name = if result.conversation_name.is_empty() {
        "Untitled"
    } else {
        &result.conversation_name
    };
    let mut header = format!("[{}] Conversation: {}", index, name);
    if !result.created_at.is_empty() {
        let date = display_date(&result.created_at).unwrap_or_else(|| result.created_at.clone());
        header.push_str(&format!(" ({})", date));
    }
    header
}

/// Pack `results` into a context string of at most `max_tokens` estimated
/// tokens. Never empty: falls back to [`NO_CONTEXT`].
pub fn build_context(results: &[SearchResult], max_tokens: usize) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut used = 0;

    for (i, result) in results.iter().enumerate() {
        let text: String = result.text.chars().take(MAX_BLOCK_TEXT_CHARS).collect();
        let block = format!("{}\n{}", citation_header(i + 1, result), text);
        let tokens = estimate_tokens(&block);
        if used + tokens > max_tokens {
            tracing::debug!(rank = i + 1, tokens, used, max_tokens, "context block skipped");
            continue;
        }
        used += tokens;
        blocks.push(block);
    }

    if blocks.is_empty() {
        return NO_CONTEXT.to_string();
    }
    blocks.join(BLOCK_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, text: &str, created_at: &str) -> SearchResult {
        SearchResult {
            conversation_id: "c".into(),
            message_id: "m".into(),
            conversation_name: name.into(),
            text: text.into(),
            score: 0.1,
            source_id: "claude".into(),
            sender: "assistant".into(),
            created_at: created_at.into(),
        }
    }

    #[test]
    fn test_empty_results_give_sentinel() {
        assert_eq!(build_context(&[], DEFAULT_MAX_CONTEXT_TOKENS), NO_CONTEXT);
    }

    #[test]
    fn test_headers_and_dates() {
        let results = vec![
            result("Conv1", "text1", "2025-01-01"),
            result("", "text2", "2025-03-10T12:00:00Z"),
            result("Conv3", "text3", "last tuesday"),
            result("Conv4", "text4", ""),
        ];
        let ctx = build_context(&results, DEFAULT_MAX_CONTEXT_TOKENS);
        let blocks: Vec<&str> = ctx.split(BLOCK_SEPARATOR).collect();
        assert_eq!(
            blocks,
            vec![
                "[1] Conversation: Conv1 (Jan 1, 2025)\ntext1",
                "[2] Conversation: Untitled (Mar 10, 2025)\ntext2",
                "[3] Conversation: Conv3 (last tuesday)\ntext3",
                "[4] Conversation: Conv4\ntext4",
            ]
        );
    }

    #[test]
    fn test_display_date_formats() {
        assert_eq!(display_date("2024-11-20T18:30:00+02:00").as_deref(), Some("Nov 20, 2024"));
        assert_eq!(display_date("2025-03-10T12:00:00.123456").as_deref(), Some("Mar 10, 2025"));
        assert_eq!(display_date("2025-03-10 12:00:00").as_deref(), Some("Mar 10, 2025"));
        assert_eq!(display_date("2025-13-40"), None);
    }

    #[test]
    fn test_text_is_capped_per_block() {
        let long = "z".repeat(4000);
        let ctx = build_context(&[result("N", &long, "")], 10_000);
        assert_eq!(ctx, format!("[1] Conversation: N\n{}", "z".repeat(1500)));
    }

    #[test]
    fn test_oversized_block_is_skipped_and_packing_continues() {
        // Blocks cost 381, 31 and 381 tokens after the 1500-char cap.
        let results = vec![
            result("First", &"a".repeat(2000), ""),
            result("Second", &"b".repeat(100), ""),
            result("Third", &"c".repeat(2000), ""),
        ];
        // Room for first + second, but not for third.
        let ctx = build_context(&results, 420);
        assert!(ctx.starts_with("[1] Conversation: First"));
        assert!(ctx.contains("[2] Conversation: Second"));
        assert!(!ctx.contains("[3]"));

        // Oversized middle block is dropped; the third still fits.
        let results = vec![
            result("First", &"a".repeat(100), ""),
            result("Second", &"b".repeat(2000), ""),
            result("Third", &"c".repeat(100), ""),
        ];
        let ctx = build_context(&results, 100);
        let blocks: Vec<&str> = ctx.split(BLOCK_SEPARATOR).collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("[1] Conversation: First"));
        assert!(blocks[1].starts_with("[3] Conversation: Third"));
    }

    #[test]
    fn test_budget_is_never_exceeded() {
        let results: Vec<SearchResult> = (1..40)
            .map(|i| result("Conv", &"w".repeat(i * 97 % 1700), "2025-01-01"))
            .collect();
        for budget in [0, 5, 50, 400, 1000, 3000] {
            let ctx = build_context(&results, budget);
            if ctx == NO_CONTEXT {
                continue;
            }
            let total: usize = ctx.split(BLOCK_SEPARATOR).map(estimate_tokens).sum();
            assert!(total <= budget, "budget {} exceeded: {}", budget, total);
        }
    }

    #[test]
    fn test_nothing_fits_gives_sentinel() {
        let ctx = build_context(&[result("Conv", &"x".repeat(1000), "")], 10);
        assert_eq!(ctx, NO_CONTEXT);
    }
}
