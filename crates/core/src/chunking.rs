use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::{DocumentChunk, RagOptions};
use sha2::{Digest, Sha256};
use std::ops::Range;

/// Boundaries tried in order before falling back to a hard character cut.
pub const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

const PAGE_JOINER: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl From<&RagOptions> for ChunkingConfig {
    fn from(value: &RagOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            chunk_overlap: value.chunk_overlap,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&RagOptions::default())
    }
}

#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

/// Splits `text` into overlapping byte ranges. Each range is a trimmed, contiguous
/// substring of at most `chunk_size` characters.
pub fn split_spans(text: &str, config: ChunkingConfig) -> Vec<Range<usize>> {
    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(size - 1);

    let mut pieces = Vec::new();
    atomize(text, 0..text.len(), &SEPARATORS, size, &mut pieces);

    let mut spans = Vec::new();
    let mut first = 0;
    while first < pieces.len() {
        let mut last = first;
        let mut total = pieces[first].chars;
        while last + 1 < pieces.len() && total + pieces[last + 1].chars <= size {
            last += 1;
            total += pieces[last].chars;
        }

        if let Some(span) = trimmed(text, pieces[first].start..pieces[last].end) {
            spans.push(span);
        }

        if last + 1 >= pieces.len() {
            break;
        }

        // Carry trailing pieces forward while they fit the overlap and leave room
        // for the next unseen piece.
        let incoming = pieces[last + 1].chars;
        let mut next = first + 1;
        let mut carried = total - pieces[first].chars;
        while next <= last && (carried > overlap || carried + incoming > size) {
            carried -= pieces[next].chars;
            next += 1;
        }
        first = next;
    }

    spans
}

pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    split_spans(text, config)
        .into_iter()
        .map(|span| text[span].to_string())
        .collect()
}

/// Joins the pages with a blank line, splits the result, and tags each chunk with the
/// pages it spans.
pub fn build_chunks(
    document_id: &str,
    pages: &[PageText],
    config: ChunkingConfig,
) -> Result<Vec<DocumentChunk>, IngestError> {
    config.validate()?;

    let mut joined = String::new();
    let mut page_offsets = Vec::with_capacity(pages.len());
    for page in pages {
        if !joined.is_empty() {
            joined.push_str(PAGE_JOINER);
        }
        page_offsets.push((joined.len(), page.number));
        joined.push_str(&page.text);
    }

    let chunks = split_spans(&joined, config)
        .into_iter()
        .enumerate()
        .map(|(index, span)| {
            let text = joined[span.clone()].to_string();
            let index = index as u64;
            DocumentChunk {
                chunk_id: make_chunk_id(document_id, index, &text),
                document_id: document_id.to_string(),
                chunk_index: index,
                page_start: page_at(&page_offsets, span.start),
                page_end: page_at(&page_offsets, span.end.saturating_sub(1)),
                text,
            }
        })
        .collect();

    Ok(chunks)
}

fn atomize(text: &str, range: Range<usize>, separators: &[&str], limit: usize, out: &mut Vec<Piece>) {
    let slice = &text[range.clone()];
    if slice.is_empty() {
        return;
    }

    let chars = slice.chars().count();
    if chars <= limit {
        out.push(Piece {
            start: range.start,
            end: range.end,
            chars,
        });
        return;
    }

    let Some(position) = separators.iter().position(|separator| slice.contains(separator)) else {
        hard_cut(text, range, limit, out);
        return;
    };

    let separator = separators[position];
    let finer = &separators[position + 1..];
    let mut piece_start = range.start;
    for (offset, _) in slice.match_indices(separator) {
        let piece_end = range.start + offset + separator.len();
        atomize(text, piece_start..piece_end, finer, limit, out);
        piece_start = piece_end;
    }
    if piece_start < range.end {
        atomize(text, piece_start..range.end, finer, limit, out);
    }
}

fn hard_cut(text: &str, range: Range<usize>, limit: usize, out: &mut Vec<Piece>) {
    let mut start = range.start;
    let mut chars = 0;
    for (offset, _) in text[range.clone()].char_indices() {
        if chars == limit {
            let end = range.start + offset;
            out.push(Piece { start, end, chars });
            start = end;
            chars = 0;
        }
        chars += 1;
    }
    if start < range.end {
        out.push(Piece {
            start,
            end: range.end,
            chars,
        });
    }
}

fn trimmed(text: &str, span: Range<usize>) -> Option<Range<usize>> {
    let slice = &text[span.clone()];
    let leading = slice.len() - slice.trim_start().len();
    let kept = slice.trim().len();
    if kept == 0 {
        return None;
    }
    let start = span.start + leading;
    Some(start..start + kept)
}

fn page_at(page_offsets: &[(usize, u32)], byte: usize) -> u32 {
    page_offsets
        .iter()
        .take_while(|(offset, _)| *offset <= byte)
        .last()
        .map(|(_, number)| *number)
        .unwrap_or(1)
}

fn make_chunk_id(document_id: &str, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
        }
    }

    #[test]
    fn words_split_with_overlap() {
        let text = "one two three four five six seven eight nine ten";
        let chunks = split_text(text, config(15, 6));
        assert_eq!(
            chunks,
            vec![
                "one two three",
                "three four",
                "four five six",
                "six seven",
                "seven eight",
                "eight nine ten",
            ]
        );
    }

    #[test]
    fn paragraph_boundaries_win_over_words() {
        let text = "Alpha paragraph one.\n\nBeta paragraph two.";
        let chunks = split_text(text, config(25, 0));
        assert_eq!(chunks, vec!["Alpha paragraph one.", "Beta paragraph two."]);
    }

    #[test]
    fn text_shorter_than_overlap_is_one_chunk() {
        assert_eq!(split_text("abc", config(10, 8)), vec!["abc"]);
    }

    #[test]
    fn unbroken_text_is_hard_cut() {
        let chunks = split_text("abcdefghij", config(4, 1));
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn multibyte_text_cuts_on_char_boundaries() {
        let text = "äöüßäöüßäöüß";
        let chunks = split_text(text, config(5, 0));
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 5));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn whitespace_only_text_has_no_chunks() {
        assert!(split_text("   \n\n  ", config(10, 2)).is_empty());
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = "Sentence one. Sentence two is longer. \n\nAnother paragraph here.\nWith a line.";
        let first = split_text(text, config(30, 10));
        let second = split_text(text, config(30, 10));
        assert_eq!(first, second);
        assert!(first.iter().all(|chunk| text.contains(chunk.as_str())));
        assert!(first.iter().all(|chunk| chunk.chars().count() <= 30));
    }

    #[test]
    fn chunks_record_page_ranges() {
        let pages = vec![
            PageText {
                number: 1,
                text: "First page text.".to_string(),
            },
            PageText {
                number: 2,
                text: "Second page text.".to_string(),
            },
        ];

        let split = build_chunks("doc-1", &pages, config(20, 0)).expect("valid config");
        assert_eq!(split.len(), 2);
        assert_eq!((split[0].page_start, split[0].page_end), (1, 1));
        assert_eq!((split[1].page_start, split[1].page_end), (2, 2));
        assert_eq!(split[1].text, "Second page text.");
        assert_eq!(split[1].chunk_index, 1);

        let whole = build_chunks("doc-1", &pages, config(1_000, 200)).expect("valid config");
        assert_eq!(whole.len(), 1);
        assert_eq!((whole[0].page_start, whole[0].page_end), (1, 2));
        assert_eq!(whole[0].document_id, "doc-1");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let pages = vec![PageText {
            number: 1,
            text: "text".to_string(),
        }];
        assert!(build_chunks("doc", &pages, config(0, 0)).is_err());
        assert!(build_chunks("doc", &pages, config(10, 10)).is_err());
    }
}
