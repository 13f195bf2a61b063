use lopdf::Document;
use tracing::{debug, info, warn};

use crate::utils::error::ApiError;

#[derive(Debug)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
    pub empty_pages: usize,
}

/// Extract text from PDF bytes, page by page, pages separated by a blank
/// line. A whitespace-only result fails: the file is most likely a scanned
/// PDF that would need OCR.
pub fn extract_pdf_text(pdf_bytes: &[u8]) -> Result<ExtractedText, ApiError> {
    info!("Extracting text from PDF ({} bytes)", pdf_bytes.len());

    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| ApiError::ExtractionFailure(format!("Invalid or corrupted PDF file: {}", e)))?;

    let page_count = doc.get_pages().len();
    debug!("PDF opened: {} pages", page_count);

    let mut text = String::new();
    let mut empty_pages = 0;

    for page_num in 1..=page_count {
        match doc.extract_text(&[page_num as u32]) {
            Ok(page_text) if !page_text.trim().is_empty() => {
                text.push_str(&page_text);
                text.push_str("\n\n");
            }
            Ok(_) => {
                debug!("Page {} has no text (possibly image/scanned)", page_num);
                empty_pages += 1;
            }
            Err(e) => {
                warn!("Failed to extract text from page {}: {}", page_num, e);
                empty_pages += 1;
            }
        }
    }

    if text.trim().is_empty() {
        return Err(ApiError::ExtractionFailure(
            "No text found in PDF. This may be a scanned PDF requiring OCR.".to_string(),
        ));
    }

    info!(
        "Text extraction complete: {} characters, {}/{} empty pages",
        text.len(),
        empty_pages,
        page_count
    );

    Ok(ExtractedText {
        text,
        page_count,
        empty_pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    fn pdf_with_pages(pages_text: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages_text {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![50.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("content encodes"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).expect("pdf serializes");
        buf
    }

    #[test]
    fn extracts_text_from_all_pages() {
        let bytes = pdf_with_pages(&["first page text", "second page text"]);
        let extracted = extract_pdf_text(&bytes).expect("extraction succeeds");

        assert_eq!(extracted.page_count, 2);
        assert!(extracted.text.contains("first page text"));
        assert!(extracted.text.contains("second page text"));
    }

    #[test]
    fn pages_are_separated_by_blank_line() {
        let bytes = pdf_with_pages(&["alpha", "beta"]);
        let extracted = extract_pdf_text(&bytes).expect("extraction succeeds");

        let alpha_end = extracted.text.find("alpha").unwrap() + "alpha".len();
        let beta_start = extracted.text.find("beta").unwrap();
        assert!(extracted.text[alpha_end..beta_start].contains("\n\n"));
    }

    #[test]
    fn garbage_bytes_fail_extraction() {
        let err = extract_pdf_text(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ApiError::ExtractionFailure(_)));
    }
}
