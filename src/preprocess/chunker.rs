use serde::Serialize;

/// Separator placed between paragraphs inside normalized text and chunks.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// A paragraph-aligned slice of the document, numbered from zero in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Greedily pack paragraphs into chunks of fewer than `max_chars` characters.
///
/// Paragraphs are never split: one longer than `max_chars` becomes a chunk of its own, so
/// callers cannot rely on `text.chars().count() < max_chars`.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_chars = 0_usize;

    for paragraph in text.split(PARAGRAPH_SEPARATOR) {
        let paragraph_chars = paragraph.chars().count();

        if buffer_chars + paragraph_chars >= max_chars {
            flush(&mut chunks, &buffer);
            buffer.clear();
            buffer_chars = 0;
        }

        buffer.push_str(paragraph);
        buffer.push_str(PARAGRAPH_SEPARATOR);
        buffer_chars += paragraph_chars + PARAGRAPH_SEPARATOR.len();
    }
    flush(&mut chunks, &buffer);

    chunks
}

fn flush(chunks: &mut Vec<Chunk>, buffer: &str) {
    let text = buffer.trim();
    if text.is_empty() {
        return;
    }
    chunks.push(Chunk {
        index: chunks.len(),
        text: text.to_string(),
    });
}
