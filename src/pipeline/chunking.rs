//! Greedy, order-preserving packing of extracted units into budget-bounded chunks.
//!
//! Highlights:
//!
//! - Budgets are measured either in characters or in `cl100k_base` tokens (`tiktoken-rs`).
//! - Consecutive units are joined with a newline while the joined text stays within budget.
//! - Units are never split unless a single unit alone exceeds the budget. Such a unit is cut at
//!   the longest prefix that fits, repeatedly, and the cut is logged at `warn`.
//! - Blank units add no text. They are still covered by the unit range of the chunk that spans
//!   them, so ranges stay contiguous.

use super::types::{ChunkingError, TextChunk};
use crate::extract::ExtractedUnit;
use std::sync::Arc;
use tiktoken_rs::cl100k_base;

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Size budget for a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkBudget {
    /// Maximum number of characters.
    Characters(usize),
    /// Maximum number of `cl100k_base` tokens.
    Tokens(usize),
}

impl ChunkBudget {
    /// Numeric limit regardless of unit.
    pub fn limit(&self) -> usize {
        match self {
            Self::Characters(limit) | Self::Tokens(limit) => *limit,
        }
    }

    /// Build the length function that matches this budget.
    pub(crate) fn counter(&self) -> Result<LengthCounter, ChunkingError> {
        match self {
            Self::Characters(_) => Ok(Arc::new(|segment: &str| segment.chars().count())),
            Self::Tokens(_) => {
                let encoding = cl100k_base()
                    .map_err(|error| ChunkingError::Tokenizer(error.to_string()))?;
                Ok(Arc::new(move |segment: &str| {
                    encoding.encode_ordinary(segment).len()
                }))
            }
        }
    }
}

/// Split units into chunks that respect `budget`.
///
/// Returns an empty vector when no unit carries text.
pub fn chunk_units(
    units: &[ExtractedUnit],
    budget: &ChunkBudget,
) -> Result<Vec<TextChunk>, ChunkingError> {
    if budget.limit() == 0 {
        return Err(ChunkingError::InvalidBudget);
    }
    let counter = budget.counter()?;
    Ok(chunk_units_with_counter(units, budget.limit(), &counter))
}

struct OpenChunk {
    text: String,
    first_unit: usize,
    last_unit: usize,
    starts_mid_unit: bool,
}

#[derive(Default)]
struct ChunkSequence {
    chunks: Vec<TextChunk>,
}

impl ChunkSequence {
    fn push(&mut self, open: OpenChunk) {
        self.chunks.push(TextChunk {
            sequence: self.chunks.len(),
            text: open.text,
            source_units: (open.first_unit, open.last_unit),
            starts_mid_unit: open.starts_mid_unit,
        });
    }
}

fn chunk_units_with_counter(
    units: &[ExtractedUnit],
    limit: usize,
    counter: &LengthCounter,
) -> Vec<TextChunk> {
    let mut sequence = ChunkSequence::default();
    let mut open: Option<OpenChunk> = None;
    let mut leading_blank: Option<usize> = None;

    for unit in units {
        if unit.text.is_empty() {
            match open.as_mut() {
                Some(current) => current.last_unit = unit.index,
                None => {
                    leading_blank.get_or_insert(unit.index);
                }
            }
            continue;
        }

        if let Some(mut current) = open.take() {
            let candidate = format!("{}\n{}", current.text, unit.text);
            if counter.as_ref()(&candidate) <= limit {
                current.text = candidate;
                current.last_unit = unit.index;
                open = Some(current);
                continue;
            }
            sequence.push(current);
        }

        let first_unit = leading_blank.take().unwrap_or(unit.index);
        if counter.as_ref()(&unit.text) <= limit {
            open = Some(OpenChunk {
                text: unit.text.clone(),
                first_unit,
                last_unit: unit.index,
                starts_mid_unit: false,
            });
            continue;
        }

        let mut pieces = split_to_budget(&unit.text, limit, counter);
        tracing::warn!(
            unit = unit.index,
            unit_chars = unit.text.chars().count(),
            limit,
            pieces = pieces.len(),
            "Unit exceeds chunk budget; hard-splitting"
        );
        let tail = pieces.pop();
        for (position, piece) in pieces.into_iter().enumerate() {
            sequence.push(OpenChunk {
                text: piece,
                first_unit: if position == 0 { first_unit } else { unit.index },
                last_unit: unit.index,
                starts_mid_unit: position > 0,
            });
        }
        open = tail.map(|text| OpenChunk {
            text,
            first_unit: unit.index,
            last_unit: unit.index,
            starts_mid_unit: true,
        });
    }

    if let Some(current) = open {
        sequence.push(current);
    }

    sequence.chunks
}

/// Cut `text` into consecutive pieces, each the longest prefix of the remainder within `limit`.
///
/// Every piece holds at least one character, even if that character alone measures over budget.
fn split_to_budget(text: &str, limit: usize, counter: &LengthCounter) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let end = longest_prefix_within(rest, limit, counter);
        pieces.push(rest[..end].to_string());
        rest = &rest[end..];
    }

    pieces
}

fn longest_prefix_within(text: &str, limit: usize, counter: &LengthCounter) -> usize {
    let ends: Vec<usize> = text
        .char_indices()
        .skip(1)
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();

    // Largest end whose prefix fits; prefix lengths grow with the end offset.
    let fitting = ends.partition_point(|&end| counter.as_ref()(&text[..end]) <= limit);
    if fitting == 0 {
        ends[0]
    } else {
        ends[fitting - 1]
    }
}
