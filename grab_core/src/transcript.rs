//! Transcript merging. Glues together the per-chunk output of
//! an external transcription engine into one [`TranscriptResult`] whose
//! segment timestamps are relative to the *original* source file rather
//! than to each chunk, and whose text has the chunk overlap removed.

use serde::{Deserialize, Serialize};

use crate::chunker::ChunkInfo;

/// Up to this many trailing words of the already-merged text are considered
/// as candidate overlap with the next chunk.
const OVERLAP_WINDOW_WORDS: usize = 20;
/// Length of the word n-gram scanned for in the next chunk's text.
const OVERLAP_PHRASE_WORDS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub raw_text: String,
    pub segments: Vec<TranscriptSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub duration: f64,
}

/// Merges one [`TranscriptResult`] per chunk (in chunk order) into a single
/// result whose timestamps are relative to the un-chunked source.
///
/// For chunk *k* > 0, segments whose *original* start time falls inside the
/// overlap window are dropped — they also appear, already transcribed, at
/// the tail of chunk *k-1*. Raw text is concatenated with a fuzzy
/// de-overlap: the last up to [`OVERLAP_WINDOW_WORDS`] words of the text
/// merged so far are scanned, earliest-occurring word first, for a
/// [`OVERLAP_PHRASE_WORDS`]-word phrase that recurs in the next chunk's
/// text; if one is found, everything up through that phrase is skipped
/// before appending.
///
/// `chunks` and `results` must be the same length and in chunk order —
/// `results[k]` is the transcription of `chunks[k]`.
pub fn merge_transcripts(results: &[TranscriptResult], chunks: &[ChunkInfo]) -> TranscriptResult {
    assert_eq!(
        results.len(),
        chunks.len(),
        "merge_transcripts requires one transcript per chunk"
    );

    let overlap_seconds = chunks
        .iter()
        .zip(chunks.iter().skip(1))
        .map(|(prev, next)| (prev.end - next.start).max(0.0))
        .fold(0.0_f64, f64::max);

    let mut segments = Vec::new();
    let mut raw_text = String::new();
    let mut language = None;

    for (k, (result, chunk)) in results.iter().zip(chunks.iter()).enumerate() {
        if language.is_none() {
            language = result.language.clone();
        }

        for seg in &result.segments {
            if k > 0 && seg.start < overlap_seconds {
                continue;
            }
            segments.push(TranscriptSegment {
                start: seg.start + chunk.start,
                end: seg.end + chunk.start,
                text: seg.text.clone(),
            });
        }

        append_deduped(&mut raw_text, &result.raw_text);
    }

    let duration = chunks.last().map(|c| c.end).unwrap_or(0.0);

    TranscriptResult {
        raw_text,
        segments,
        language,
        duration,
    }
}

/// Appends `next` onto `merged`, skipping a leading run of `next` that
/// duplicates `merged`'s tail (the fuzzy text de-overlap).
fn append_deduped(merged: &mut String, next: &str) {
    if merged.is_empty() {
        merged.push_str(next);
        return;
    }

    let prev_words: Vec<&str> = merged.split_whitespace().collect();
    let tail_start = prev_words.len().saturating_sub(OVERLAP_WINDOW_WORDS);
    let tail = &prev_words[tail_start..];

    let next_words: Vec<&str> = next.split_whitespace().collect();
    let skip = find_phrase_skip(tail, &next_words);

    if !merged.ends_with(' ') && !merged.is_empty() {
        merged.push(' ');
    }
    merged.push_str(&next_words[skip..].join(" "));
}

/// Scans `tail`'s word n-grams earliest-first for a match in `next`; returns
/// how many leading words of `next` to skip (0 if no overlap is found).
fn find_phrase_skip(tail: &[&str], next: &[&str]) -> usize {
    if tail.len() < OVERLAP_PHRASE_WORDS || next.len() < OVERLAP_PHRASE_WORDS {
        return 0;
    }
    for start in 0..=(tail.len() - OVERLAP_PHRASE_WORDS) {
        let phrase = &tail[start..start + OVERLAP_PHRASE_WORDS];
        if let Some(pos) = find_subsequence(next, phrase) {
            return pos + OVERLAP_PHRASE_WORDS;
        }
    }
    0
}

fn find_subsequence(haystack: &[&str], needle: &[&str]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=(haystack.len() - needle.len())).find(|&start| {
        haystack[start..start + needle.len()]
            .iter()
            .zip(needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkStatus;
    use std::path::PathBuf;

    fn chunk(index: u32, start: f64, end: f64) -> ChunkInfo {
        ChunkInfo {
            index,
            file: PathBuf::from(format!("chunk_{:03}.m4a", index)),
            start,
            end,
            status: ChunkStatus::Pending,
        }
    }

    fn result(text: &str, segments: Vec<(f64, f64, &str)>) -> TranscriptResult {
        TranscriptResult {
            raw_text: text.to_string(),
            segments: segments
                .into_iter()
                .map(|(start, end, text)| TranscriptSegment {
                    start,
                    end,
                    text: text.to_string(),
                })
                .collect(),
            language: Some("en".to_string()),
            duration: segments_duration(text),
        }
    }

    fn segments_duration(_text: &str) -> f64 {
        0.0
    }

    /// Merging transcripts where each chunk's text
    /// starts with the overlap repeated yields a merged text with the
    /// overlap removed exactly once.
    #[test]
    fn overlapping_text_is_deduplicated_exactly_once() {
        let chunks = vec![chunk(1, 0.0, 600.0), chunk(2, 590.0, 1180.0)];
        let results = vec![
            result(
                "the quick brown fox jumps over the lazy dog",
                vec![(0.0, 5.0, "the quick brown fox jumps"), (5.0, 10.0, "over the lazy dog")],
            ),
            result(
                "the lazy dog runs away quickly",
                vec![(0.0, 5.0, "the lazy dog runs"), (5.0, 10.0, "away quickly")],
            ),
        ];

        let merged = merge_transcripts(&results, &chunks);
        assert_eq!(
            merged.raw_text,
            "the quick brown fox jumps over the lazy dog runs away quickly"
        );
    }

    #[test]
    fn segments_are_shifted_by_chunk_start_offset_and_overlap_is_discarded() {
        let chunks = vec![chunk(1, 0.0, 600.0), chunk(2, 590.0, 1180.0)];
        let overlap = 10.0;
        let results = vec![
            result("a b", vec![(595.0, 600.0, "tail of chunk one")]),
            result(
                "b c",
                vec![(5.0, 8.0, "duplicate of chunk one's tail"), (12.0, 15.0, "new material")],
            ),
        ];

        let merged = merge_transcripts(&results, &chunks);
        // the duplicate segment (original start 5.0 < overlap 10.0) is dropped
        assert_eq!(merged.segments.len(), 2);
        assert_eq!(merged.segments[0].start, 595.0);
        assert_eq!(merged.segments[1].start, 590.0 + 12.0);
        assert!(merged
            .segments
            .windows(2)
            .all(|w| w[0].start <= w[1].start));
        let _ = overlap;
    }

    #[test]
    fn no_overlap_found_just_concatenates() {
        let chunks = vec![chunk(1, 0.0, 600.0), chunk(2, 590.0, 1180.0)];
        let results = vec![
            result("completely unrelated opening", vec![]),
            result("totally different closing", vec![]),
        ];
        let merged = merge_transcripts(&results, &chunks);
        assert_eq!(merged.raw_text, "completely unrelated opening totally different closing");
    }
}
