//! Reassembly of per-chunk fragments into the document-level summary.

use super::types::{PipelineError, SummaryFragment, TextChunk};
use crate::extract::DocumentFormat;

/// Separator placed between fragments in the final body text.
pub const FRAGMENT_SEPARATOR: &str = "\n\n";

/// A heading plus the summary text it introduces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarySection {
    /// Source range label such as `Slides 1–3`.
    pub heading: String,
    /// Summary text for that range.
    pub text: String,
}

/// Concatenate fragment texts in chunk order, separated by a blank line.
///
/// Fragments may arrive in any order; they must cover every chunk exactly once.
pub fn aggregate(
    chunks: &[TextChunk],
    fragments: Vec<SummaryFragment>,
) -> Result<String, PipelineError> {
    let ordered = order_fragments(chunks, fragments)?;
    Ok(ordered
        .iter()
        .map(|fragment| fragment.text.trim())
        .collect::<Vec<_>>()
        .join(FRAGMENT_SEPARATOR))
}

/// Like [`aggregate`], but keeps one section per chunk labelled with its source range.
pub fn aggregate_sections(
    chunks: &[TextChunk],
    fragments: Vec<SummaryFragment>,
    format: DocumentFormat,
) -> Result<Vec<SummarySection>, PipelineError> {
    let ordered = order_fragments(chunks, fragments)?;
    Ok(chunks
        .iter()
        .zip(ordered)
        .map(|(chunk, fragment)| SummarySection {
            heading: range_label(format, chunk.source_units),
            text: fragment.text.trim().to_string(),
        })
        .collect())
}

/// Human label for an inclusive unit range.
pub fn range_label(format: DocumentFormat, (first, last): (usize, usize)) -> String {
    let noun = format.unit_label();
    if first == last {
        format!("{noun} {first}")
    } else {
        format!("{noun}s {first}\u{2013}{last}")
    }
}

fn order_fragments(
    chunks: &[TextChunk],
    mut fragments: Vec<SummaryFragment>,
) -> Result<Vec<SummaryFragment>, PipelineError> {
    if fragments.len() != chunks.len() {
        return Err(PipelineError::InternalInvariantViolation(format!(
            "expected {} summary fragments, got {}",
            chunks.len(),
            fragments.len()
        )));
    }

    fragments.sort_by_key(|fragment| fragment.sequence);
    for (chunk, fragment) in chunks.iter().zip(&fragments) {
        if chunk.sequence != fragment.sequence {
            return Err(PipelineError::InternalInvariantViolation(format!(
                "fragment sequence {} does not match chunk sequence {}",
                fragment.sequence, chunk.sequence
            )));
        }
    }

    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(ranges: &[(usize, usize)]) -> Vec<TextChunk> {
        ranges
            .iter()
            .enumerate()
            .map(|(sequence, range)| TextChunk {
                sequence,
                text: format!("chunk {sequence}"),
                source_units: *range,
                starts_mid_unit: false,
            })
            .collect()
    }

    fn fragment(sequence: usize, text: &str) -> SummaryFragment {
        SummaryFragment {
            sequence,
            text: text.into(),
        }
    }

    #[test]
    fn fragments_join_in_sequence_order() {
        let chunks = chunks(&[(1, 1), (2, 3), (4, 4)]);
        let fragments = vec![
            fragment(2, "Third."),
            fragment(0, " First.\n"),
            fragment(1, "Second."),
        ];

        let body = aggregate(&chunks, fragments).unwrap();

        assert_eq!(body, "First.\n\nSecond.\n\nThird.");
    }

    #[test]
    fn cardinality_mismatch_is_an_invariant_violation() {
        let chunks = chunks(&[(1, 1), (2, 2), (3, 3)]);
        let error = aggregate(&chunks, vec![fragment(0, "a"), fragment(1, "b")]).unwrap_err();
        assert!(matches!(error, PipelineError::InternalInvariantViolation(_)));

        let error = aggregate(&chunks[..1], vec![fragment(0, "a"), fragment(1, "b")]).unwrap_err();
        assert!(matches!(error, PipelineError::InternalInvariantViolation(_)));
    }

    #[test]
    fn duplicate_sequences_are_an_invariant_violation() {
        let chunks = chunks(&[(1, 1), (2, 2)]);
        let error = aggregate(&chunks, vec![fragment(0, "a"), fragment(0, "again")]).unwrap_err();
        assert!(matches!(error, PipelineError::InternalInvariantViolation(_)));
    }

    #[test]
    fn sections_are_labelled_with_source_ranges() {
        let chunks = chunks(&[(1, 2), (3, 3)]);
        let sections = aggregate_sections(
            &chunks,
            vec![fragment(1, "Later"), fragment(0, "Earlier")],
            DocumentFormat::SlideDeck,
        )
        .unwrap();

        assert_eq!(
            sections,
            vec![
                SummarySection {
                    heading: "Slides 1\u{2013}2".into(),
                    text: "Earlier".into()
                },
                SummarySection {
                    heading: "Slide 3".into(),
                    text: "Later".into()
                },
            ]
        );
        assert_eq!(range_label(DocumentFormat::Pdf, (4, 4)), "Page 4");
    }
}
