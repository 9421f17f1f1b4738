//! Selector evaluation over parsed documents
//!
//! Site rules are plain selector strings; `DocumentQuery` is the seam that
//! evaluates them. `CssDocument` evaluates CSS selectors with `scraper`.

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

/// Errors raised while evaluating a selector
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Empty selector")]
    EmptySelector,

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Read-only queries against a parsed document
pub trait DocumentQuery {
    /// Handle to a matched node, valid while the document is borrowed
    type Node<'a>: Copy
    where
        Self: 'a;

    /// All nodes matching `selector`, in document order
    ///
    /// With a `scope`, only descendants of that node are searched.
    fn select_all<'a>(
        &'a self,
        scope: Option<Self::Node<'a>>,
        selector: &str,
    ) -> Result<Vec<Self::Node<'a>>, QueryError>;

    /// First node matching `selector`
    fn select_one<'a>(
        &'a self,
        scope: Option<Self::Node<'a>>,
        selector: &str,
    ) -> Result<Option<Self::Node<'a>>, QueryError> {
        Ok(self.select_all(scope, selector)?.into_iter().next())
    }

    /// Trimmed attribute value, None if missing or blank
    fn attribute<'a>(&'a self, node: Self::Node<'a>, name: &str) -> Option<String>;

    /// Text content with whitespace collapsed
    fn text<'a>(&'a self, node: Self::Node<'a>) -> String;
}

/// HTML document queried with CSS selectors
pub struct CssDocument {
    html: Html,
}

impl CssDocument {
    /// Parses an HTML document; malformed markup is repaired, never rejected
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }
}

fn compile(selector: &str) -> Result<Selector, QueryError> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(QueryError::EmptySelector);
    }

    Selector::parse(selector).map_err(|e| QueryError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

impl DocumentQuery for CssDocument {
    type Node<'a> = ElementRef<'a>;

    fn select_all<'a>(
        &'a self,
        scope: Option<ElementRef<'a>>,
        selector: &str,
    ) -> Result<Vec<ElementRef<'a>>, QueryError> {
        let selector = compile(selector)?;
        let nodes: Vec<ElementRef<'a>> = match scope {
            Some(node) => node.select(&selector).collect(),
            None => self.html.select(&selector).collect(),
        };
        Ok(nodes)
    }

    fn attribute<'a>(&'a self, node: ElementRef<'a>, name: &str) -> Option<String> {
        node.value()
            .attr(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn text<'a>(&'a self, node: ElementRef<'a>) -> String {
        node.text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="item"><a class="title" href="/one">  One
             Piece </a></div>
          <div class="item"><a class="title" href=" /two ">Two</a></div>
          <span class="item">ignored scope</span>
        </body></html>
    "#;

    #[test]
    fn test_select_all_in_document_order() {
        let doc = CssDocument::parse(PAGE);
        let items = doc.select_all(None, "div.item").unwrap();
        assert_eq!(items.len(), 2);

        let first = doc.select_one(Some(items[0]), "a").unwrap().unwrap();
        assert_eq!(doc.text(first), "One Piece");
        assert_eq!(doc.attribute(first, "href").as_deref(), Some("/one"));

        let second = doc.select_one(Some(items[1]), "a").unwrap().unwrap();
        assert_eq!(doc.attribute(second, "href").as_deref(), Some("/two"));
        assert_eq!(doc.attribute(second, "missing"), None);
    }

    #[test]
    fn test_scoped_select_stays_inside_node() {
        let doc = CssDocument::parse(PAGE);
        let span = doc.select_one(None, "span.item").unwrap().unwrap();
        assert!(doc.select_all(Some(span), "a").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_selectors() {
        let doc = CssDocument::parse(PAGE);
        assert_eq!(doc.select_all(None, "  ").unwrap_err(), QueryError::EmptySelector);
        assert!(matches!(
            doc.select_all(None, "div[["),
            Err(QueryError::InvalidSelector { .. })
        ));
    }
}
