//! Word-processor (DOCX) text extraction.
//!
//! A `.docx` file is a zip container; the document body lives in
//! `word/document.xml` as WordprocessingML. Text runs sit in `<w:t>`
//! elements; paragraphs (`<w:p>`) and explicit breaks (`<w:br/>`) become
//! newlines.

use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{Error, Result};
use crate::extract::TextExtractor;

/// Extractor for DOCX documents.
pub struct DocxExtractor;

impl DocxExtractor {
    fn document_xml(bytes: &[u8]) -> Result<String> {
        let cursor = Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(cursor)
            .map_err(|e| Error::invalid_input(format!("not a docx container: {e}")))?;
        let mut file = archive
            .by_name("word/document.xml")
            .map_err(|_| Error::invalid_input("docx container lacks word/document.xml"))?;
        let mut xml = String::new();
        file.read_to_string(&mut xml)
            .map_err(|e| Error::invalid_input(format!("cannot read document.xml: {e}")))?;
        Ok(xml)
    }

    fn text_from_xml(xml: &str) -> Result<String> {
        let mut reader = Reader::from_str(xml);
        let mut out = String::new();
        let mut in_text_run = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text_run = true,
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"w:t" => in_text_run = false,
                    b"w:p" => out.push('\n'),
                    _ => {}
                },
                Ok(Event::Empty(e)) if e.name().as_ref() == b"w:br" => out.push('\n'),
                Ok(Event::Text(t)) if in_text_run => {
                    let piece = t
                        .unescape()
                        .map_err(|e| Error::invalid_input(format!("bad docx text run: {e}")))?;
                    out.push_str(&piece);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(Error::invalid_input(format!("malformed document.xml: {e}")));
                }
            }
        }

        Ok(out.trim_end().to_string())
    }
}

impl TextExtractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn supports(&self, extension: &str) -> bool {
        extension == "docx"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String> {
        let xml = Self::document_xml(bytes)?;
        Self::text_from_xml(&xml)
    }
}
