//! Transcript segmentation for video search.
//!
//! Transcripts carry no timestamps, so segment timing is estimated from
//! word offsets at an assumed speaking rate. The estimate only needs to be
//! good enough to deep-link a video player near the right moment.

/// Target segment length in characters.
const TARGET_CHARS: usize = 600;
/// Segments shorter than this are merged into their predecessor.
const MIN_CHARS: usize = 300;
/// Hard cap on segment length in characters.
const MAX_CHARS: usize = 900;
/// Seconds of overlap added before each segment after the first.
const OVERLAP_SECS: f64 = 10.0;
/// Assumed speaking rate for timing estimates.
const WORDS_PER_SEC: f64 = 2.5;

/// A transcript slice with estimated timing.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub index: i32,
    pub start_time_secs: f64,
    pub end_time_secs: f64,
    pub text: String,
    pub word_count: i64,
}

/// Split a transcript into overlapping segments of roughly
/// [`TARGET_CHARS`] characters, cut at word boundaries.
pub fn segment_transcript(transcript: &str) -> Vec<TranscriptSegment> {
    let words: Vec<&str> = transcript.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    // (first_word_index, text) per raw segment.
    let mut raw: Vec<(usize, String)> = Vec::new();
    let mut current = String::new();
    let mut current_start = 0usize;

    for (i, word) in words.iter().enumerate() {
        let added_len = if current.is_empty() {
            word.len()
        } else {
            current.len() + 1 + word.len()
        };

        if !current.is_empty() && (current.len() >= TARGET_CHARS || added_len > MAX_CHARS) {
            raw.push((current_start, std::mem::take(&mut current)));
            current_start = i;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        // A short tail folds into the previous segment rather than
        // producing a fragment.
        if current.len() < MIN_CHARS
            && let Some((_, last)) = raw.last_mut()
            && last.len() + 1 + current.len() <= MAX_CHARS
        {
            last.push(' ');
            last.push_str(&current);
        } else {
            raw.push((current_start, current));
        }
    }

    let mut segments = Vec::with_capacity(raw.len());
    for (index, (first_word, text)) in raw.into_iter().enumerate() {
        let word_count = text.split_whitespace().count();
        let raw_start = first_word as f64 / WORDS_PER_SEC;
        let start = if index == 0 {
            0.0
        } else {
            (raw_start - OVERLAP_SECS).max(0.0)
        };
        let end = (first_word + word_count) as f64 / WORDS_PER_SEC;
        segments.push(TranscriptSegment {
            index: index as i32,
            start_time_secs: start,
            end_time_secs: end,
            text,
            word_count: word_count as i64,
        });
    }
    segments
}
