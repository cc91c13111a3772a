use roxmltree::{Document, Node};
use thiserror::Error;

/// Atom syndication namespace
pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// OpenSearch response elements namespace
pub const OPENSEARCH_NS: &str = "http://a9.com/-/spec/opensearch/1.1/";

/// Errors that make a fetched page unusable
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Response body is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("Malformed XML: {0}")]
    Xml(String),

    #[error("Not an Atom feed: root element is <{0}>")]
    NotAFeed(String),
}

/// A hyperlink element found at the top level of a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedLink {
    pub href: String,
    pub rel: Option<String>,
    pub text: Option<String>,
}

/// One parsed result page
///
/// Borrows the response body; it lives only as long as it takes to pull the
/// records and links out of it.
pub struct FeedDocument<'input> {
    doc: Document<'input>,
}

impl<'input> FeedDocument<'input> {
    /// Parses a response body
    ///
    /// # Returns
    ///
    /// * `Ok(FeedDocument)` - The body is an `atom:feed` document
    /// * `Err(FeedError)` - The body is not UTF-8, not well-formed XML, or has another root
    pub fn parse(text: &'input str) -> Result<Self, FeedError> {
        let doc = Document::parse(text).map_err(|e| FeedError::Xml(e.to_string()))?;

        let root = doc.root_element();
        if !root.has_tag_name((ATOM_NS, "feed")) {
            return Err(FeedError::NotAFeed(root.tag_name().name().to_string()));
        }

        Ok(Self { doc })
    }

    /// Checks that raw response bytes are UTF-8 before parsing
    pub fn decode(body: &[u8]) -> Result<&str, FeedError> {
        std::str::from_utf8(body).map_err(|e| FeedError::Encoding(e.to_string()))
    }

    /// Entry nodes in document order
    pub fn entries<'a>(&'a self) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
        self.doc
            .root_element()
            .children()
            .filter(|n| n.has_tag_name((ATOM_NS, "entry")))
    }

    /// Feed-level `atom:link` elements in document order
    ///
    /// Links inside entries belong to the scenes, not to the result set, and
    /// are not returned. Elements without an `href` are skipped.
    pub fn links(&self) -> Vec<FeedLink> {
        self.doc
            .root_element()
            .children()
            .filter(|n| n.has_tag_name((ATOM_NS, "link")))
            .filter_map(|n| {
                let href = n.attribute("href")?.trim();
                if href.is_empty() {
                    return None;
                }
                let text = n
                    .attribute("title")
                    .or_else(|| n.text())
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string);
                Some(FeedLink {
                    href: href.to_string(),
                    rel: n.attribute("rel").map(str::to_string),
                    text,
                })
            })
            .collect()
    }

    /// `opensearch:totalResults`, when the catalog reports it
    pub fn total_results(&self) -> Option<u64> {
        self.doc
            .root_element()
            .children()
            .find(|n| n.has_tag_name((OPENSEARCH_NS, "totalResults")))
            .and_then(|n| n.text())
            .and_then(|t| t.trim().parse().ok())
    }
}
