//! Google Docs document structure and plain-text flattening.

use serde::{Deserialize, Serialize};

/// A document as returned by `GET /documents/{id}`.
///
/// Only the parts the Drive layer reads are modelled; everything else in the
/// response is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocsDocument {
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<Body>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub content: Vec<StructuralElement>,
}

/// One entry of `body.content`. Section breaks and tables carry no paragraph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph: Option<Paragraph>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub elements: Vec<ParagraphElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_run: Option<TextRun>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    #[serde(default)]
    pub content: Option<String>,
}

impl Body {
    /// Structured body holding `text`, one paragraph per line.
    pub fn from_text(text: &str) -> Self {
        let content = text
            .split('\n')
            .map(|line| StructuralElement {
                paragraph: Some(Paragraph {
                    elements: vec![ParagraphElement {
                        text_run: Some(TextRun {
                            content: Some(line.to_string()),
                        }),
                    }],
                }),
            })
            .collect();

        Self { content }
    }
}

/// Flatten a document body into one text stream.
///
/// Each paragraph's text runs are concatenated in order and paragraphs are
/// joined with `\n`. Elements without a paragraph contribute nothing.
pub fn flatten_body(body: &Body) -> String {
    body.content
        .iter()
        .filter_map(|element| element.paragraph.as_ref())
        .map(|paragraph| {
            paragraph
                .elements
                .iter()
                .filter_map(|e| e.text_run.as_ref())
                .filter_map(|run| run.content.as_deref())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
