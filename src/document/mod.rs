//! Documents processed by the scheduler
//!
//! A document is either a seed from the configuration, a link discovered by
//! a chain's document locator, or a virtual document holding content that a
//! download job forwarded to other chains.

mod load;

pub use load::{decode_data_url, load_static, read_file, DataUrl};

use crate::chain::ChainId;
use crate::locator::{FormatArgs, LocatorMatch, Stage};
use std::fmt;

/// Kind of a document, which decides how it is read and how links found in
/// it are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKind {
    Url,
    File,
    /// A file used as its own content match, without being parsed
    ContentFile,
    /// Content forwarded by a download job
    ContentMatch,
}

impl DocumentKind {
    /// Kind of the documents discovered inside a document of this kind
    pub fn derived(self) -> Self {
        match self {
            DocumentKind::Url => DocumentKind::Url,
            DocumentKind::File => DocumentKind::File,
            DocumentKind::ContentFile => DocumentKind::File,
            DocumentKind::ContentMatch => DocumentKind::Url,
        }
    }

    pub fn is_file_addressed(self) -> bool {
        matches!(self, DocumentKind::File | DocumentKind::ContentFile)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            DocumentKind::Url => "url",
            DocumentKind::File => "file",
            DocumentKind::ContentFile => "content file",
            DocumentKind::ContentMatch => "content match from",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Equality key of a document
pub type DocumentKey = (DocumentKind, String);

/// A document waiting in, or taken from, the scheduler queue
#[derive(Debug, Clone)]
pub struct Document {
    pub kind: DocumentKind,
    pub path: String,
    /// Encoding used to decode the document, once known
    pub encoding: Option<String>,
    pub forced_encoding: bool,
    /// Text of a virtual document; other kinds are read when processed
    pub inline_text: Option<String>,
    /// Chain whose document locator produced this document
    pub source_chain: Option<ChainId>,
    /// Chains that run on this document, sorted by id
    pub chains: Vec<ChainId>,
    /// Match that discovered this document
    pub locator_match: Option<LocatorMatch>,
    /// Keys of the documents on the discovery path, root first
    pub ancestors: Vec<DocumentKey>,
}

impl Document {
    pub fn new(kind: DocumentKind, path: impl Into<String>, mut chains: Vec<ChainId>) -> Self {
        chains.sort_unstable();
        chains.dedup();
        Self {
            kind,
            path: path.into(),
            encoding: None,
            forced_encoding: false,
            inline_text: None,
            source_chain: None,
            chains,
            locator_match: None,
            ancestors: Vec::new(),
        }
    }

    /// Creates a document discovered inside `parent` by `chain`
    pub fn derived_from(
        parent: &Document,
        chain: ChainId,
        chains: Vec<ChainId>,
        path: impl Into<String>,
        locator_match: LocatorMatch,
    ) -> Self {
        let mut doc = Document::new(parent.kind.derived(), path, chains);
        doc.source_chain = Some(chain);
        doc.locator_match = Some(locator_match);
        doc.ancestors = parent.ancestors.clone();
        doc.ancestors.push(parent.key());
        doc
    }

    /// Creates a virtual document holding forwarded content
    pub fn forwarded(
        origin: &Document,
        chain: ChainId,
        chains: Vec<ChainId>,
        text: String,
    ) -> Self {
        let mut doc = Document::new(DocumentKind::ContentMatch, origin.path.clone(), chains);
        doc.source_chain = Some(chain);
        doc.locator_match = origin.locator_match.clone();
        doc.inline_text = Some(text);
        doc.ancestors = origin.ancestors.clone();
        doc
    }

    pub fn key(&self) -> DocumentKey {
        (self.kind, self.path.clone())
    }

    pub fn has_ancestor(&self, key: &DocumentKey) -> bool {
        self.ancestors.iter().any(|a| a == key)
    }

    /// Document level template arguments: `dl`, `denc` and the arguments of
    /// the discovering match
    pub fn insert_args(&self, args: &mut FormatArgs) {
        args.insert("dl".to_string(), self.path.clone());
        if let Some(encoding) = &self.encoding {
            args.insert("denc".to_string(), encoding.clone());
        }
        if let Some(lm) = &self.locator_match {
            lm.insert_args(Stage::Document, args);
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.path == other.path
    }
}

impl Eq for Document {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_kinds() {
        assert_eq!(DocumentKind::Url.derived(), DocumentKind::Url);
        assert_eq!(DocumentKind::ContentFile.derived(), DocumentKind::File);
        assert_eq!(DocumentKind::ContentMatch.derived(), DocumentKind::Url);
        assert!(DocumentKind::ContentFile.is_file_addressed());
        assert!(!DocumentKind::ContentMatch.is_file_addressed());
    }

    #[test]
    fn test_chains_sorted() {
        let doc = Document::new(DocumentKind::Url, "https://a.com", vec![2, 0, 2, 1]);
        assert_eq!(doc.chains, vec![0, 1, 2]);
    }

    #[test]
    fn test_derived_tracks_lineage() {
        let root = Document::new(DocumentKind::Url, "https://a.com", vec![0]);
        let child = Document::derived_from(
            &root,
            0,
            vec![0],
            "https://a.com/x",
            LocatorMatch::new("/x"),
        );
        assert!(child.has_ancestor(&root.key()));
        assert_eq!(child.source_chain, Some(0));

        let grandchild =
            Document::derived_from(&child, 0, vec![0], "https://a.com", LocatorMatch::new("/"));
        assert_eq!(grandchild.ancestors.len(), 2);
        assert!(grandchild.has_ancestor(&grandchild.key()));
    }

    #[test]
    fn test_document_args() {
        let mut lm = LocatorMatch::new("/next");
        lm.structural = Some("/next".to_string());
        let mut doc = Document::new(DocumentKind::Url, "https://a.com/next", vec![0]);
        doc.locator_match = Some(lm);
        doc.encoding = Some("utf-8".to_string());

        let mut args = FormatArgs::new();
        doc.insert_args(&mut args);
        assert_eq!(args["dl"], "https://a.com/next");
        assert_eq!(args["denc"], "utf-8");
        assert_eq!(args["dx"], "/next");
        assert_eq!(args["d"], "/next");
    }
}
