pub mod html;

use thiserror::Error;

pub use html::ParsedHtml;

pub const HEADING_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

pub trait HtmlDocument: Sized {
    type Node<'a>: Copy
    where
        Self: 'a;

    /// Parsing is permissive: malformed markup yields whatever tree the
    /// parser recovers, never an error.
    fn parse(html: &str) -> Self;

    fn query(&self, selector: &str) -> Result<Vec<Self::Node<'_>>, QueryError>;

    fn text(node: Self::Node<'_>) -> String;

    fn tag_name(node: Self::Node<'_>) -> String;

    fn sibling_index(node: Self::Node<'_>) -> usize;

    /// Element ancestors, nearest first.
    fn ancestors<'a>(node: Self::Node<'a>) -> Vec<Self::Node<'a>>
    where
        Self: 'a;

    fn descendants_matching<'a>(node: Self::Node<'a>, tags: &[&str]) -> Vec<Self::Node<'a>>
    where
        Self: 'a;
}
