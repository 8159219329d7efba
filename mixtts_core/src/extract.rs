//! Plain-text extraction from uploaded documents.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported file type: {0}. Upload a .txt or .docx file")]
    UnsupportedFileKind(String),

    #[error("Could not read .docx file: {0}")]
    InvalidDocx(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Txt,
    Docx,
}

impl FileKind {
    /// Pick the kind from a file name's extension.
    pub fn from_filename(name: &str) -> Result<Self, ExtractError> {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" => Ok(FileKind::Txt),
            "docx" => Ok(FileKind::Docx),
            _ => Err(ExtractError::UnsupportedFileKind(name.to_string())),
        }
    }
}

pub fn extract_text(bytes: &[u8], kind: FileKind) -> Result<String, ExtractError> {
    match kind {
        FileKind::Txt => {
            let text = String::from_utf8_lossy(bytes);
            Ok(text.trim_start_matches('\u{feff}').to_string())
        }
        FileKind::Docx => extract_docx(bytes),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::InvalidDocx(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::InvalidDocx(format!("word/document.xml: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::InvalidDocx(e.to_string()))?;

    document_paragraphs(&xml).map(|paragraphs| paragraphs.join("\n"))
}

/// Text of each `<w:p>` in a WordprocessingML body, empty paragraphs skipped.
fn document_paragraphs(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    let para = current.trim();
                    if !para.is_empty() {
                        paragraphs.push(para.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| ExtractError::InvalidDocx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::InvalidDocx(e.to_string())),
            _ => {}
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }
    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:t>world &amp; friends.</w:t></w:r></w:p>
    <w:p></w:p>
    <w:p><w:r><w:t>நான் நன்றாக இருக்கிறேன்.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    fn docx(document: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("word/document.xml", options).unwrap();
        writer.write_all(document.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_file_kind_from_extension() {
        assert_eq!(FileKind::from_filename("notes.TXT").unwrap(), FileKind::Txt);
        assert_eq!(FileKind::from_filename("a.b.docx").unwrap(), FileKind::Docx);
        assert!(matches!(
            FileKind::from_filename("scan.pdf"),
            Err(ExtractError::UnsupportedFileKind(_))
        ));
        assert!(FileKind::from_filename("README").is_err());
    }

    #[test]
    fn test_txt_is_lossy_utf8_without_bom() {
        let text = extract_text("\u{feff}வணக்கம் hello".as_bytes(), FileKind::Txt).unwrap();
        assert_eq!(text, "வணக்கம் hello");
        let lossy = extract_text(&[b'h', 0xff, b'i'], FileKind::Txt).unwrap();
        assert_eq!(lossy, "h\u{fffd}i");
    }

    #[test]
    fn test_docx_paragraphs_joined_by_newlines() {
        let text = extract_text(&docx(DOCUMENT), FileKind::Docx).unwrap();
        assert_eq!(text, "Hello world & friends.\nநான் நன்றாக இருக்கிறேன்.");
    }

    #[test]
    fn test_docx_without_document_part() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("other.xml", SimpleFileOptions::default()).unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        assert!(matches!(extract_text(&bytes, FileKind::Docx), Err(ExtractError::InvalidDocx(_))));
    }

    #[test]
    fn test_garbage_is_not_a_docx() {
        assert!(extract_text(b"definitely not a zip", FileKind::Docx).is_err());
    }
}
