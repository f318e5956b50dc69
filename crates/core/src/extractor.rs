use crate::error::RagError;
use encoding_rs::SHIFT_JIS;
use lopdf::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentFormat {
    pub fn from_filename(filename: &str) -> Result<Self, RagError> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, extension)| extension.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "txt" => Ok(Self::PlainText),
            _ => Err(RagError::UnsupportedFormat(if extension.is_empty() {
                "(no extension)".to_string()
            } else {
                format!(".{extension}")
            })),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::PlainText => "txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Self::PlainText => "text/plain",
        }
    }
}

/// Extracts trimmed text from an uploaded file, picking the parser by extension.
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<String, RagError> {
    match DocumentFormat::from_filename(filename)? {
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::Docx => extract_docx(bytes),
        DocumentFormat::PlainText => extract_plain_text(bytes),
    }
}

pub fn extract_pdf(bytes: &[u8]) -> Result<String, RagError> {
    let document = Document::load_mem(bytes)
        .map_err(|error| RagError::Extraction(format!("pdf parse error: {error}")))?;

    let mut text = String::new();
    for page_no in document.get_pages().keys() {
        let page_text = document
            .extract_text(&[*page_no])
            .map_err(|error| RagError::Extraction(format!("pdf page {page_no}: {error}")))?;
        text.push_str(page_text.trim_end());
        text.push('\n');
    }

    Ok(text.trim().to_string())
}

pub fn extract_docx(bytes: &[u8]) -> Result<String, RagError> {
    let document = docx_rs::read_docx(bytes)
        .map_err(|error| RagError::Extraction(format!("docx parse error: {error}")))?;

    let mut text = String::new();
    for child in document.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            for child in paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(fragment) = child {
                            text.push_str(&fragment.text);
                        }
                    }
                }
            }
            text.push('\n');
        }
    }

    Ok(text.trim().to_string())
}

/// UTF-8 first, Shift_JIS second.
pub fn extract_plain_text(bytes: &[u8]) -> Result<String, RagError> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.trim().to_string());
    }

    SHIFT_JIS
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| {
            RagError::Extraction("text is neither valid UTF-8 nor Shift_JIS".to_string())
        })
}
