use crate::util::{clean_text, collapse_whitespace};
use scraper::{ElementRef, Html};
use std::collections::HashMap;
use thiserror::Error;

/// Bytes inspected for NUL when sniffing binary payloads.
const SNIFF_LEN: usize = 1024;

/// Structural failures that prevent a body from being treated as HTML.
///
/// "No article found" is not an error; see
/// [`extract_readable`](super::extract_readable).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Document is empty")]
    Empty,
    #[error("Document looks binary, not HTML")]
    Binary,
}

/// A parsed HTML page.
///
/// Parsed once per response and shared by the readability and metadata
/// stages. Not `Send`: build it, use it and drop it between await points.
pub struct Document {
    html: Html,
}

impl Document {
    /// Parses a response body, decoding it as UTF-8 with replacement.
    pub fn parse(body: &[u8]) -> Result<Self, ExtractError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ExtractError::Empty);
        }
        if body.iter().take(SNIFF_LEN).any(|&b| b == 0) {
            return Err(ExtractError::Binary);
        }

        let text = String::from_utf8_lossy(body);
        Ok(Self {
            html: Html::parse_document(&text),
        })
    }

    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    /// All elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.html.root_element().descendants().filter_map(ElementRef::wrap)
    }

    /// First element with the given tag name.
    pub fn first(&self, name: &str) -> Option<ElementRef<'_>> {
        self.elements().find(|el| el.value().name() == name)
    }

    /// `<body>`, or the root element for fragments without one.
    pub fn body(&self) -> ElementRef<'_> {
        self.first("body").unwrap_or_else(|| self.root())
    }

    /// `<meta>` values keyed by lowercased `property`, `name` or `itemprop`.
    /// The first occurrence of a key wins.
    pub fn meta_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for el in self.elements().filter(|el| el.value().name() == "meta") {
            let attrs = el.value();
            let Some(content) = attrs.attr("content").and_then(clean_text) else {
                continue;
            };
            for key in ["property", "name", "itemprop"]
                .iter()
                .filter_map(|attr| attrs.attr(attr))
            {
                map.entry(key.trim().to_ascii_lowercase())
                    .or_insert_with(|| content.clone());
            }
        }
        map
    }
}

/// Concatenated text of an element, whitespace collapsed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}
