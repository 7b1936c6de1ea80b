//! Deterministic text chunking.
//!
//! [`chunk`] slides a window over the input and cuts at the friendliest
//! separator near the target size: paragraph break first, then line break,
//! sentence end, word gap, and finally a hard cut. Consecutive chunks
//! overlap by a configurable amount so retrieval never loses context at a
//! boundary. The operation is pure - same text and config, same chunks -
//! and whitespace-only chunks are dropped with the ordinals closed up.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator preference, most desirable first. The implicit final entry is
/// the hard cut at the target size.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Chunking parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Target chunk size in bytes of UTF-8 text.
    pub target_chars: usize,
    /// Overlap carried from the end of one chunk into the next.
    pub overlap_chars: usize,
    /// How far around the target a separator may be picked.
    pub window_slack: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_chars: 500,
            overlap_chars: 50,
            window_slack: 50,
        }
    }
}

impl ChunkerConfig {
    pub fn with_target_chars(mut self, target: usize) -> Self {
        self.target_chars = target;
        self
    }

    pub fn with_overlap_chars(mut self, overlap: usize) -> Self {
        self.overlap_chars = overlap;
        self
    }

    pub fn with_window_slack(mut self, slack: usize) -> Self {
        self.window_slack = slack;
        self
    }

    /// Startup validation: the window must always make forward progress.
    pub fn validate(&self) -> Result<(), ChunkerError> {
        if self.target_chars == 0 {
            return Err(ChunkerError::ZeroTarget);
        }
        if self.overlap_chars >= self.target_chars {
            return Err(ChunkerError::OverlapTooLarge {
                overlap: self.overlap_chars,
                target: self.target_chars,
            });
        }
        if self.window_slack >= self.target_chars {
            return Err(ChunkerError::SlackTooLarge {
                slack: self.window_slack,
                target: self.target_chars,
            });
        }
        Ok(())
    }
}

/// Errors raised when validating a [`ChunkerConfig`]. Chunking itself is
/// total.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChunkerError {
    #[error("target_chars must be greater than zero")]
    ZeroTarget,
    #[error("overlap_chars ({overlap}) must be smaller than target_chars ({target})")]
    OverlapTooLarge { overlap: usize, target: usize },
    #[error("window_slack ({slack}) must be smaller than target_chars ({target})")]
    SlackTooLarge { slack: usize, target: usize },
}

/// One produced chunk, with its byte span in the source text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkPiece {
    /// 0-based position within the source; always contiguous.
    pub ordinal: u32,
    pub text: String,
    /// Byte offset (inclusive) in the source text.
    pub start: usize,
    /// Byte offset (exclusive) in the source text.
    pub end: usize,
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Split `text` into overlapping chunks per `cfg`.
pub fn chunk(text: &str, cfg: &ChunkerConfig) -> Vec<ChunkPiece> {
    let len = text.len();
    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < len {
        let hard_end = ceil_char_boundary(text, (start + cfg.target_chars).min(len));
        let mut cut = hard_end;

        if hard_end < len {
            let lo = ceil_char_boundary(
                text,
                (start + cfg.target_chars.saturating_sub(cfg.window_slack)).max(start + 1),
            );
            let hi = floor_char_boundary(text, (start + cfg.target_chars + cfg.window_slack).min(len));
            if lo < hi {
                for sep in SEPARATORS {
                    if let Some(pos) = text[lo..hi].rfind(sep) {
                        cut = lo + pos + sep.len();
                        break;
                    }
                }
            }
        }

        // Degenerate configs cannot stall the loop.
        if cut <= start {
            cut = hard_end.max(ceil_char_boundary(text, start + 1));
        }

        let piece = &text[start..cut];
        if !piece.trim().is_empty() {
            pieces.push((piece.to_string(), start, cut));
        }

        if cut >= len {
            break;
        }
        let next = floor_char_boundary(text, cut.saturating_sub(cfg.overlap_chars));
        start = if next > start { next } else { cut };
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(ordinal, (text, start, end))| ChunkPiece {
            ordinal: ordinal as u32,
            text,
            start,
            end,
        })
        .collect()
}
