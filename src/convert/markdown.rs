//! PDF to Markdown conversion.

use crate::convert::{ConversionError, Converter};
use crate::sources::FetchedDocument;
use crate::utils::extract_pages;

/// Renders a PDF as Markdown: a metadata header followed by one section per
/// page that has text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfMarkdownConverter;

impl PdfMarkdownConverter {
    pub fn new() -> Self {
        Self
    }

    fn header(document: &FetchedDocument) -> String {
        let mut out = String::new();

        match &document.metadata {
            Some(meta) => {
                out.push_str(&format!("# {}\n\n", meta.title));
                if !meta.authors.is_empty() {
                    out.push_str(&format!("**Authors:** {}\n\n", meta.author_line()));
                }
                if let Some(published) = &meta.published {
                    out.push_str(&format!("**Published:** {}\n\n", published));
                }
            }
            None => out.push_str(&format!("# arXiv:{}\n\n", document.paper_id)),
        }

        out.push_str(&format!("**arXiv ID:** {}\n\n", document.paper_id));
        out.push_str("---\n\n");
        out
    }
}

impl Converter for PdfMarkdownConverter {
    fn name(&self) -> &str {
        "pdf-markdown"
    }

    fn convert(&self, document: &FetchedDocument) -> Result<String, ConversionError> {
        let pages = extract_pages(&document.bytes)
            .map_err(|e| ConversionError::from_extract(e, document))?;

        let sections: Vec<String> = pages
            .iter()
            .filter(|p| !p.text.is_empty())
            .map(|p| format!("## Page {}\n\n{}", p.number, p.text))
            .collect();
        if sections.is_empty() {
            return Err(ConversionError::NoText);
        }
        let pages_with_text = sections.len();

        let mut markdown = Self::header(document);
        markdown.push_str(&sections.join("\n\n"));
        markdown.push('\n');

        tracing::debug!(
            paper_id = %document.paper_id,
            pages = pages.len(),
            pages_with_text,
            chars = markdown.len(),
            "Converted PDF to Markdown"
        );

        Ok(markdown)
    }
}
