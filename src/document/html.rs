use scraper::{ElementRef, Html, Selector};

use crate::document::{HtmlDocument, QueryError};

pub struct ParsedHtml {
    html: Html,
}

pub fn parse_selector(selector: &str) -> Result<Selector, QueryError> {
    Selector::parse(selector).map_err(|e| QueryError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

impl HtmlDocument for ParsedHtml {
    type Node<'a> = ElementRef<'a>;

    fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    fn query(&self, selector: &str) -> Result<Vec<ElementRef<'_>>, QueryError> {
        let parsed = parse_selector(selector)?;
        Ok(self.html.select(&parsed).collect())
    }

    fn text(node: ElementRef<'_>) -> String {
        node.text().collect::<String>().trim().to_string()
    }

    fn tag_name(node: ElementRef<'_>) -> String {
        node.value().name().to_string()
    }

    fn sibling_index(node: ElementRef<'_>) -> usize {
        node.prev_siblings()
            .filter(|sibling| sibling.value().is_element())
            .count()
    }

    fn ancestors<'a>(node: ElementRef<'a>) -> Vec<ElementRef<'a>>
    where
        Self: 'a,
    {
        node.ancestors().filter_map(ElementRef::wrap).collect()
    }

    fn descendants_matching<'a>(node: ElementRef<'a>, tags: &[&str]) -> Vec<ElementRef<'a>>
    where
        Self: 'a,
    {
        node.descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| tags.contains(&el.value().name()))
            .collect()
    }
}
