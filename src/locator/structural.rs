//! Structural queries over parsed HTML
//!
//! Queries are CSS selectors evaluated with `scraper`. A query may end with an
//! extraction suffix:
//!
//! - `::text` yields the text content of each matched node
//! - ` @name` yields the value of attribute `name` (nodes without it are skipped)
//! - no suffix yields the outer HTML of each matched node
//!
//! With a sibling depth above zero every match is widened to the nodes that
//! share its element-name path below the ancestor `depth` levels up.

use super::matched::LocatorMatch;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

/// What a structural query extracts from a matched node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extract {
    Html,
    Text,
    Attr(String),
}

/// A compiled structural query step
#[derive(Debug, Clone)]
pub struct StructuralQuery {
    source: String,
    selector: Selector,
    extract: Extract,
    pub sibling_depth: usize,
    pub multimatch: bool,
    /// Keep the matched node's HTML for queries nested inside the match
    pub retain_node: bool,
}

impl StructuralQuery {
    /// Compiles a query
    ///
    /// # Examples
    ///
    /// ```
    /// use chainscrape::locator::StructuralQuery;
    /// use scraper::Html;
    ///
    /// let query = StructuralQuery::parse("li::text", 0, true).unwrap();
    /// let tree = Html::parse_document("<ul><li>foo</li><li>bar</li></ul>");
    /// let values: Vec<String> = query.evaluate(&tree).into_iter().map(|h| h.value).collect();
    /// assert_eq!(values, vec!["foo", "bar"]);
    /// ```
    pub fn parse(source: &str, sibling_depth: usize, multimatch: bool) -> Result<Self, String> {
        let trimmed = source.trim();
        let (css, extract) = split_extract(trimmed);
        if css.is_empty() {
            return Err(format!("empty structural query '{}'", source));
        }
        let selector = Selector::parse(css)
            .map_err(|e| format!("invalid structural query '{}': {:?}", source, e))?;
        Ok(Self {
            source: source.to_string(),
            selector,
            extract,
            sibling_depth,
            multimatch,
            retain_node: false,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn extract(&self) -> &Extract {
        &self.extract
    }

    /// Evaluates the query against a whole document
    pub fn evaluate(&self, tree: &Html) -> Vec<StructuralHit> {
        let hits: Vec<ElementRef> = tree.select(&self.selector).collect();
        self.collect_hits(hits)
    }

    /// Evaluates the query against an HTML fragment, used for matches nested
    /// inside a previously matched node
    pub fn evaluate_fragment(&self, html: &str) -> Vec<StructuralHit> {
        let fragment = Html::parse_fragment(html);
        let hits: Vec<ElementRef> = fragment.select(&self.selector).collect();
        self.collect_hits(hits)
    }

    /// Runs the step over a set of accumulated matches
    ///
    /// Matches carrying a retained node are queried inside that node, all
    /// others against the document tree.
    pub fn apply(
        &self,
        inputs: Vec<LocatorMatch>,
        tree: Option<&Html>,
    ) -> Result<Vec<LocatorMatch>, String> {
        let mut out = Vec::new();
        for input in inputs {
            let hits = match (&input.node_html, tree) {
                (Some(node), _) => self.evaluate_fragment(node),
                (None, Some(tree)) => self.evaluate(tree),
                (None, None) => {
                    return Err(format!(
                        "structural query '{}' has no parsed document to run on",
                        self.source
                    ))
                }
            };
            for hit in hits {
                let mut lm = LocatorMatch::new(hit.value.clone());
                lm.structural = Some(hit.value);
                if self.retain_node {
                    lm.node_html = Some(hit.node_html);
                }
                out.push(lm);
            }
        }
        Ok(out)
    }

    fn collect_hits(&self, mut hits: Vec<ElementRef>) -> Vec<StructuralHit> {
        if !self.multimatch {
            hits.truncate(1);
        } else if self.sibling_depth > 0 {
            hits = widen_to_siblings(hits, self.sibling_depth);
        }
        hits.into_iter()
            .filter_map(|el| {
                let value = match &self.extract {
                    Extract::Html => el.html().trim().to_string(),
                    Extract::Text => el.text().collect::<String>(),
                    Extract::Attr(name) => el.value().attr(name)?.to_string(),
                };
                Some(StructuralHit {
                    value,
                    node_html: el.html(),
                })
            })
            .collect()
    }
}

/// A single value extracted by a structural query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralHit {
    pub value: String,
    pub node_html: String,
}

fn split_extract(query: &str) -> (&str, Extract) {
    if let Some(css) = query.strip_suffix("::text") {
        return (css.trim_end(), Extract::Text);
    }
    if let Some((css, attr)) = query.rsplit_once(char::is_whitespace) {
        if let Some(name) = attr.strip_prefix('@') {
            if !name.is_empty() {
                return (css.trim_end(), Extract::Attr(name.to_string()));
            }
        }
    }
    (query, Extract::Html)
}

/// Widens each match to the nodes reached from its ancestor `depth` levels up
/// by following the same element names back down
fn widen_to_siblings(hits: Vec<ElementRef<'_>>, depth: usize) -> Vec<ElementRef<'_>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for hit in hits {
        let mut names = Vec::new();
        let mut anchor = hit;
        for _ in 0..depth {
            match anchor.parent().and_then(ElementRef::wrap) {
                Some(parent) => {
                    names.push(anchor.value().name().to_string());
                    anchor = parent;
                }
                None => break,
            }
        }

        let mut frontier = vec![anchor];
        for name in names.iter().rev() {
            frontier = frontier
                .iter()
                .flat_map(|el| el.children().filter_map(ElementRef::wrap))
                .filter(|child| child.value().name() == name)
                .collect();
        }

        for el in frontier {
            let parent = el.parent().map(|p| p.id());
            if seen.insert((parent, el.id())) {
                out.push(el);
            }
        }
    }
    out
}
