use super::matching::{ContentKey, ContentMatch};
use crate::document::Document;
use crate::locator::{FormatArgs, Locator, Template};
use crate::url::LinkPolicy;
use serde::Deserialize;
use std::collections::HashSet;

/// Stable identity of a chain, its index in the [`ChainSet`](super::ChainSet)
pub type ChainId = usize;

/// When a chain counts as satisfied on a rendered document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderedStrategy {
    /// One pass, like a static document
    #[default]
    Plain,
    /// Keep polling until any needed match shows up
    AnyMatch,
    /// Ask the user whether the current matches should be used
    Interactive,
    /// Like interactive, but accumulate matches across passes
    Dedup,
}

/// How content links are downloaded while a browser session is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStrategy {
    /// Plain HTTP, reusing the session's cookies
    #[default]
    External,
    /// Let the browser download into its download directory
    Internal,
    /// Run `fetch()` inside the page
    Fetch,
}

/// Which documents produced by a chain are enqueued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentDuplication {
    Allowed,
    /// Skip documents already present on their own discovery path
    NonRecursive,
    /// Skip documents enqueued before during the run
    #[default]
    Unique,
}

/// Inclusive index window, unbounded when `max` is `None`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexWindow {
    pub min: u64,
    pub max: Option<u64>,
}

impl Default for IndexWindow {
    fn default() -> Self {
        Self { min: 1, max: None }
    }
}

impl IndexWindow {
    pub fn exceeds(&self, index: u64) -> bool {
        self.max.map_or(false, |max| index > max)
    }

    /// Digits needed to print any index of the window; an unbounded window
    /// uses three
    pub fn digits(&self) -> usize {
        let max = self.max.map_or(3, |m| m.to_string().len());
        self.min.to_string().len().max(max)
    }
}

/// Where the next content match falls relative to the index windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSlot {
    /// Numbered, but before the start of a window
    Below,
    Within(u64),
    Exhausted,
}

/// Flags derived from a chain's configuration during setup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainFlags {
    pub has_label_matching: bool,
    pub has_content_matching: bool,
    pub has_document_matching: bool,
    pub has_interactive_matching: bool,
    /// Any locator of the chain reads the document
    pub parses_documents: bool,
    pub need_content: bool,
    pub need_label: bool,
    pub need_filename: bool,
    pub need_output_multipass: bool,
}

/// Per document scheduling state, reset when matches are accepted
#[derive(Debug, Default)]
pub struct ChainState {
    pub content_matches: Vec<ContentMatch>,
    pub document_matches: Vec<Document>,
    pub handled_content: HashSet<ContentKey>,
    pub handled_documents: HashSet<(ChainId, String)>,
    pub satisfied: bool,
    pub labels_none_for_n: usize,
}

/// A fully set up match chain
#[derive(Debug)]
pub struct MatchChain {
    pub id: ChainId,
    pub content: Locator,
    pub label: Locator,
    pub document: Locator,

    pub content_window: IndexWindow,
    pub document_window: IndexWindow,
    pub ci_continuous: bool,
    /// Next content index to hand out
    pub ci: u64,
    /// Index of the current document
    pub di: u64,

    pub rendered_strategy: RenderedStrategy,
    pub download_strategy: DownloadStrategy,
    pub duplication: DocumentDuplication,

    pub print_format: Option<Template>,
    pub save_format: Option<Template>,
    pub write_format: Option<Template>,
    pub forward_format: Option<Template>,
    pub filename_default_format: Option<Template>,
    pub label_default_format: Option<Template>,

    pub forward_chains: Vec<ChainId>,
    pub document_output_chains: Vec<ChainId>,

    /// Content results are addresses to download rather than content
    pub content_is_link: bool,
    pub labels_inside_content: bool,
    pub label_allow_missing: bool,
    pub allow_slashes_in_labels: bool,
    pub overwrite_files: bool,
    pub save_path_interactive: bool,
    pub escape_sequence: String,

    pub document_encoding: String,
    pub forced_document_encoding: Option<String>,
    pub link_policy: LinkPolicy,

    pub flags: ChainFlags,
    pub state: ChainState,
}

impl MatchChain {
    pub fn need_content_matches(&self) -> bool {
        self.flags.has_content_matching
            && !self.content_window.exceeds(self.ci)
            && !self.document_window.exceeds(self.di)
    }

    /// `current_used` accounts for the document index the current document
    /// will consume once its matches are accepted
    pub fn need_document_matches(&self, current_used: bool) -> bool {
        self.flags.has_document_matching
            && !self
                .document_window
                .exceeds(self.di + u64::from(current_used))
    }

    pub fn is_unsatisfied(&self) -> bool {
        self.need_content_matches() || self.need_document_matches(false)
    }

    pub fn is_valid_label(&self, label: &str) -> bool {
        self.allow_slashes_in_labels || !(label.contains('/') || label.contains('\\'))
    }

    /// Encoding a document produced by this chain is decoded with
    pub fn encoding_for(&self, doc: &Document) -> (String, bool) {
        match (&self.forced_document_encoding, &doc.encoding) {
            (Some(forced), _) => (forced.clone(), true),
            (None, Some(known)) => (known.clone(), false),
            (None, None) => (self.document_encoding.clone(), false),
        }
    }

    /// Chain level template arguments for a document
    ///
    /// `ci` is left out while matching, since it is only stable once matches
    /// are accepted.
    pub fn general_args(&self, doc: &Document, with_ci: bool) -> FormatArgs {
        let mut args = FormatArgs::new();
        doc.insert_args(&mut args);
        args.insert("chain".to_string(), self.id.to_string());
        args.insert("di".to_string(), self.di.to_string());
        args.insert("cesc".to_string(), self.escape_sequence.clone());
        if with_ci {
            args.insert("ci".to_string(), self.ci.to_string());
        }
        args
    }

    /// Restarts content numbering for a new document unless numbering is
    /// continuous
    pub fn begin_accept(&mut self) {
        if !self.ci_continuous {
            self.ci = 1;
        }
    }

    /// Numbers the next content match of the current document
    pub fn next_content_slot(&mut self) -> IndexSlot {
        if self.content_window.exceeds(self.ci) || self.document_window.exceeds(self.di) {
            return IndexSlot::Exhausted;
        }
        let ci = self.ci;
        self.ci += 1;
        if ci < self.content_window.min || self.di < self.document_window.min {
            IndexSlot::Below
        } else {
            IndexSlot::Within(ci)
        }
    }

    /// Clears the per document state after acceptance
    pub fn finish_document(&mut self) {
        self.state.content_matches.clear();
        self.state.document_matches.clear();
        self.state.handled_content.clear();
        self.state.handled_documents.clear();
        self.state.labels_none_for_n = 0;
        self.di += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_digits() {
        assert_eq!(IndexWindow::default().digits(), 3);
        assert_eq!(IndexWindow { min: 1, max: Some(5) }.digits(), 1);
        assert_eq!(IndexWindow { min: 1, max: Some(12345) }.digits(), 5);
    }

    #[test]
    fn test_window_exceeds() {
        let window = IndexWindow { min: 2, max: Some(2) };
        assert!(!window.exceeds(2));
        assert!(window.exceeds(3));
        assert!(!IndexWindow::default().exceeds(u64::MAX));
    }
}
