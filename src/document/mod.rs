pub mod chunker;
pub mod extractor;

pub use chunker::{clean_text, Chunk, TokenChunker};
pub use extractor::{extract_pdf_text, ExtractedText};
