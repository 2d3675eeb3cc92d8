//! Text extraction for uploaded files.
//!
//! Duplicate detection compares extracted text, so uploads that arrive
//! without a client-side `extractedText` field are run through here.
//! Extraction never panics; callers treat an error as "no text" and the
//! resolver falls back to a neutral content score.

use std::io::Read;

use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Picks the MIME type to trust for an upload.
///
/// Browsers frequently send `application/octet-stream` or nothing at all;
/// in that case the file extension decides.
pub fn resolve_mime(file_name: &str, declared: Option<&str>) -> String {
    match declared.map(str::trim) {
        Some(m) if !m.is_empty() && m != MIME_OCTET_STREAM => {
            // Drop parameters such as "; charset=utf-8".
            m.split(';').next().unwrap_or(m).trim().to_lowercase()
        }
        _ => mime_guess::from_path(file_name)
            .first_raw()
            .unwrap_or(MIME_OCTET_STREAM)
            .to_string(),
    }
}

/// Extracts plain UTF-8 text from file bytes.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        ct if is_plain_text(ct) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

fn is_plain_text(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || matches!(
            content_type,
            "application/json" | "application/x-tex" | "application/x-bibtex"
        )
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    paragraphs_text(&xml)
}

/// Concatenates `<w:t>` runs, separating paragraphs (`<w:p>`) with a space.
fn paragraphs_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if !out.is_empty() && !out.ends_with(' ') => out.push(' '),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with(document_xml: &str) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        zip.write_all(document_xml.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "image/png").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn plain_text_is_passed_through() {
        assert_eq!(extract_text(b"ABC", "text/plain").unwrap(), "ABC");
        assert_eq!(extract_text(b"# T", "text/markdown").unwrap(), "# T");
    }

    #[test]
    fn docx_paragraphs_are_space_separated() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Cell</w:t></w:r><w:r><w:t>ular</w:t></w:r></w:p>
    <w:p><w:r><w:t>biology &amp; more</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = extract_text(&docx_with(xml), MIME_DOCX).unwrap();
        assert_eq!(text, "Cellular biology & more");
    }

    #[test]
    fn mime_falls_back_to_extension() {
        assert_eq!(resolve_mime("paper.pdf", None), MIME_PDF);
        assert_eq!(resolve_mime("paper.pdf", Some(MIME_OCTET_STREAM)), MIME_PDF);
        assert_eq!(
            resolve_mime("notes.txt", Some("text/plain; charset=utf-8")),
            "text/plain"
        );
        assert_eq!(resolve_mime("blob", None), MIME_OCTET_STREAM);
    }
}
