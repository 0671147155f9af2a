//! Output frame parser.
//!
//! Engines decorate each batch's output with borders and section headers.
//! [`FrameParser::parse`] strips that framing and keeps only the text inside
//! the first content region, and separately reports whether the completion
//! sentinel appeared anywhere in the output.
//!
//! Only the first region is captured: content after the first end marker is
//! ignored even if another start marker follows.

use crate::config::FrameConfig;

/// Parsed view of one batch's raw output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Content lines joined with `\n` and trimmed; empty when nothing was captured.
    pub payload: String,
    /// The completion sentinel occurred in the raw output.
    pub is_terminal: bool,
}

/// Stateless parser configured with the marker vocabulary of one engine.
#[derive(Debug, Clone)]
pub struct FrameParser {
    start_markers: Vec<String>,
    end_markers: Vec<String>,
    header_markers: Vec<String>,
    border_chars: Vec<char>,
    terminal_sentinel: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Before,
    Inside,
}

impl FrameParser {
    /// Build a parser from frame configuration.
    ///
    /// Blank marker strings are dropped so they cannot match every line.
    #[must_use]
    pub fn new(config: &FrameConfig) -> Self {
        let keep = |markers: &[String]| -> Vec<String> {
            markers
                .iter()
                .filter(|m| !m.trim().is_empty())
                .cloned()
                .collect()
        };

        Self {
            start_markers: keep(&config.start_markers),
            end_markers: keep(&config.end_markers),
            header_markers: keep(&config.header_markers),
            border_chars: config.border_chars.chars().collect(),
            terminal_sentinel: config.terminal_sentinel.clone(),
        }
    }

    /// Parser with explicit start/end markers and sentinel, default borders,
    /// and no header markers.
    #[must_use]
    pub fn with_markers(start: &str, end: &str, sentinel: &str) -> Self {
        let config = FrameConfig {
            start_markers: vec![start.to_owned()],
            end_markers: vec![end.to_owned()],
            header_markers: Vec::new(),
            terminal_sentinel: sentinel.to_owned(),
            ..FrameConfig::default()
        };
        Self::new(&config)
    }

    /// Split `raw_output` into payload and completion flag.
    ///
    /// Never fails: output without a start marker yields an empty payload.
    #[must_use]
    pub fn parse(&self, raw_output: &str) -> Frame {
        let mut region = Region::Before;
        let mut captured: Vec<&str> = Vec::new();

        for line in raw_output.lines() {
            match region {
                Region::Before => {
                    if self.is_start(line) {
                        region = Region::Inside;
                    }
                }
                Region::Inside => {
                    if self.is_end(line) {
                        break;
                    }
                    if self.is_start(line) || self.is_framing(line) {
                        continue;
                    }
                    captured.push(line);
                }
            }
        }

        Frame {
            payload: captured.join("\n").trim().to_owned(),
            is_terminal: self.is_terminal(raw_output),
        }
    }

    /// Whether the completion sentinel appears anywhere in `raw_output`.
    #[must_use]
    pub fn is_terminal(&self, raw_output: &str) -> bool {
        !self.terminal_sentinel.is_empty() && raw_output.contains(&self.terminal_sentinel)
    }

    fn is_start(&self, line: &str) -> bool {
        self.start_markers.iter().any(|m| line.contains(m.as_str()))
    }

    fn is_end(&self, line: &str) -> bool {
        self.end_markers.iter().any(|m| line.contains(m.as_str()))
    }

    fn is_framing(&self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return true;
        }
        if trimmed
            .chars()
            .all(|c| c.is_whitespace() || self.border_chars.contains(&c))
        {
            return true;
        }
        self.header_markers.iter().any(|m| line.contains(m.as_str()))
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(&FrameConfig::default())
    }
}
