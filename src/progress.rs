//! Embed progress reporting.
//!
//! Progress is written to **stderr** so stdout stays parseable for scripts.

use std::io::Write;

use chat_recall_core::index::EmbedProgress;

/// Human-friendly lines: `embed messages  1,024 / 5,310 chunks`.
pub struct StderrProgress;

impl EmbedProgress for StderrProgress {
    fn report(&self, done: usize, total: usize, label: &str) {
        let line = format!(
            "embed {}  {} / {} chunks\n",
            label,
            format_number(done as u64),
            format_number(total as u64)
        );
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl EmbedProgress for JsonProgress {
    fn report(&self, done: usize, total: usize, label: &str) {
        let obj = serde_json::json!({
            "event": "progress",
            "collection": label,
            "done": done,
            "total": total,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for `recall embed`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Option<std::sync::Arc<dyn EmbedProgress>> {
        match self {
            ProgressMode::Off => None,
            ProgressMode::Human => Some(std::sync::Arc::new(StderrProgress)),
            ProgressMode::Json => Some(std::sync::Arc::new(JsonProgress)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn off_mode_has_no_reporter() {
        assert!(ProgressMode::Off.reporter().is_none());
        assert!(ProgressMode::Json.reporter().is_some());
    }
}
