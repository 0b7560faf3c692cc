//! Sentence-aware segmentation of a live token stream.
//!
//! Turns an unbounded, append-only token stream into speakable chunks
//! without waiting for the full response: chunks finalize at sentence
//! boundaries, or at phrase/word breaks once the buffer passes the length
//! cap. Sentence punctuation always wins over the cap, so a chunk may run
//! long when that buys a cleaner audio boundary.

use speakstream_core::TextChunk;

/// Boundary thresholds, in characters.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Never finalize below this many chars (except on flush)
    pub min_chunk_size: usize,
    /// Length cap used when no sentence boundary appears
    pub max_chunk_size: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 10,
            max_chunk_size: 100,
        }
    }
}

/// Streaming segmenter for one generation run.
///
/// Stateless across calls except for the pending buffer: every `feed`
/// re-scans the whole buffer, so tokens carrying several boundaries at once
/// still finalize correctly.
pub struct Segmenter {
    config: SegmenterConfig,
    /// Not-yet-finalized trailing text
    pending: String,
    /// Id of the next chunk to finalize
    next_id: u64,
    /// Char offset of `pending`'s first char in the run's accumulated text
    offset: usize,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            pending: String::new(),
            next_id: 0,
            offset: 0,
        }
    }

    /// Append a token; returns every chunk that finalized as a result.
    pub fn feed(&mut self, token: &str) -> Vec<TextChunk> {
        self.pending.push_str(token);

        let mut chunks = Vec::new();
        while let Some(chunk) = self.next_boundary_chunk() {
            chunks.push(chunk);
        }
        chunks
    }

    /// Force out whatever remains, regardless of minimum length. Used at end
    /// of stream so trailing text is never dropped. Returns `None` when the
    /// buffer holds only whitespace.
    pub fn flush(&mut self) -> Option<TextChunk> {
        let raw = std::mem::take(&mut self.pending);
        let text = raw.trim();

        if text.is_empty() {
            self.offset += raw.chars().count();
            return None;
        }

        let lead = raw.chars().take_while(|c| c.is_whitespace()).count();
        let chunk = TextChunk::new(self.next_id, text, self.offset + lead);
        self.next_id += 1;
        self.offset += raw.chars().count();
        Some(chunk)
    }

    /// Rearm for a new run.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.next_id = 0;
        self.offset = 0;
    }

    /// Chars currently buffered without a boundary.
    pub fn pending_len(&self) -> usize {
        self.pending.chars().count()
    }

    fn next_boundary_chunk(&mut self) -> Option<TextChunk> {
        let chars: Vec<char> = self.pending.chars().collect();
        if chars.len() < self.config.min_chunk_size {
            return None;
        }

        if let Some(end) = self.sentence_break(&chars) {
            return self.split_at(&chars, end);
        }

        if chars.len() >= self.config.max_chunk_size {
            return self.split_at(&chars, self.length_break(&chars));
        }

        None
    }

    /// Index one past the last `.`/`!`/`?` that is followed by
    /// whitespace-or-end, provided the prefix through it is long enough.
    /// Later marks only shrink the prefix, so the scan stops at the first
    /// qualifying mark seen from the end.
    fn sentence_break(&self, chars: &[char]) -> Option<usize> {
        for i in (0..chars.len()).rev() {
            if !matches!(chars[i], '.' | '!' | '?') {
                continue;
            }
            let at_end = i + 1 == chars.len();
            if !at_end && !chars[i + 1].is_whitespace() {
                continue;
            }
            if i + 1 >= self.config.min_chunk_size {
                return Some(i + 1);
            }
            return None;
        }
        None
    }

    /// Break position for an over-long buffer: the last phrase punctuation
    /// within the cap window, else the last whitespace there, else a hard
    /// cut at exactly the cap.
    fn length_break(&self, chars: &[char]) -> usize {
        let window = self.config.max_chunk_size.min(chars.len());

        if let Some(i) = (0..window).rev().find(|&i| matches!(chars[i], ',' | ';' | '-')) {
            return i + 1;
        }
        if let Some(i) = (0..window).rev().find(|&i| chars[i].is_whitespace()) {
            // the whitespace itself goes with the remainder and is trimmed
            return i;
        }
        window
    }

    /// Finalize the first `end` chars of the buffer; keep the rest, with
    /// boundary whitespace dropped.
    fn split_at(&mut self, chars: &[char], end: usize) -> Option<TextChunk> {
        let raw: String = chars[..end].iter().collect();
        let rest: String = chars[end..].iter().collect();

        let rest_lead = rest.chars().take_while(|c| c.is_whitespace()).count();
        self.pending = rest.chars().skip(rest_lead).collect();

        let text = raw.trim();
        if text.is_empty() {
            // a window of pure whitespace; consume it without emitting
            self.offset += end + rest_lead;
            return None;
        }

        let lead = raw.chars().take_while(|c| c.is_whitespace()).count();
        let chunk = TextChunk::new(self.next_id, text, self.offset + lead);
        self.next_id += 1;
        self.offset += end + rest_lead;
        Some(chunk)
    }
}
