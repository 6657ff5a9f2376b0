//! Running a chain's locators against one document

use super::model::{ChainId, MatchChain, RenderedStrategy};
use crate::crawler::RenderedSession;
use crate::document::{Document, DocumentKey, DocumentKind};
use crate::locator::{FormatArgs, LocatorMatch, MatchContext, MatchKey, PassOutcome, Stage};
use crate::url::normalize_link;
use crate::ScrapeError;
use scraper::Html;
use std::sync::Arc;

/// Identity of a content match within a document
pub type ContentKey = (DocumentKey, MatchKey, Option<MatchKey>);

/// A content match with its optional label
#[derive(Debug, Clone)]
pub struct ContentMatch {
    pub chain: ChainId,
    pub content: LocatorMatch,
    pub label: Option<LocatorMatch>,
    pub document: Arc<Document>,
    pub ci: Option<u64>,
    pub di: Option<u64>,
}

impl ContentMatch {
    pub fn new(
        chain: ChainId,
        content: LocatorMatch,
        label: Option<LocatorMatch>,
        document: Arc<Document>,
    ) -> Self {
        Self {
            chain,
            content,
            label,
            document,
            ci: None,
            di: None,
        }
    }

    pub fn key(&self) -> ContentKey {
        (
            self.document.key(),
            self.content.key(),
            self.label.as_ref().map(LocatorMatch::key),
        )
    }

    /// All template arguments of this match, content arguments last
    pub fn format_args(&self, escape_sequence: &str) -> FormatArgs {
        let mut args = FormatArgs::new();
        self.document.insert_args(&mut args);
        args.insert("chain".to_string(), self.chain.to_string());
        args.insert("cesc".to_string(), escape_sequence.to_string());
        if let Some(di) = self.di {
            args.insert("di".to_string(), di.to_string());
        }
        if let Some(ci) = self.ci {
            args.insert("ci".to_string(), ci.to_string());
        }
        if let Some(label) = &self.label {
            label.insert_args(Stage::Label, &mut args);
        }
        self.content.insert_args(Stage::Content, &mut args);
        args
    }
}

/// Whether a chain is done with the current document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Satisfaction {
    Satisfied,
    Unsatisfied,
    /// Only the user can decide
    NeedsConfirmation,
}

/// The document a matching pass runs on
pub struct DocumentView<'a> {
    pub doc: &'a Arc<Document>,
    pub text: &'a str,
    pub tree: Option<&'a Html>,
    /// Address links are resolved against
    pub address: &'a str,
    pub session: Option<&'a dyn RenderedSession>,
    /// The document's own address is the sole content match
    pub doc_as_content: bool,
}

/// Runs the content and label locators
///
/// Returns the content matches and the number of matches dropped for lack
/// of a label.
pub async fn generate_content_matches(
    chain: &MatchChain,
    view: &DocumentView<'_>,
    ctx: &mut MatchContext<'_>,
) -> Result<(Vec<ContentMatch>, usize), ScrapeError> {
    if view.doc_as_content {
        return Ok((vec![document_as_content(chain, view.doc)], 0));
    }

    let structural = chain
        .content
        .apply_structural(vec![LocatorMatch::new(view.text)], ctx)?;

    let mut labels = Vec::new();
    if chain.flags.has_label_matching && !chain.labels_inside_content {
        labels = chain
            .label
            .apply(vec![LocatorMatch::new(view.text)], ctx)
            .await?;
    }
    let label_query = chain.label.structural_query().is_some();
    let label_multimatch = chain.label.has_multimatch();

    let mut matches = Vec::new();
    let mut labels_none_for_n = 0;

    for (index, mut node) in structural.into_iter().enumerate() {
        if chain.labels_inside_content && label_query {
            labels = chain
                .label
                .apply(vec![LocatorMatch::nested_in(&node)], ctx)
                .await?;
        }
        node.node_html = None;

        for content in chain.content.apply_refinements(vec![node], ctx).await? {
            let label = if chain.labels_inside_content {
                if !label_query {
                    labels = chain
                        .label
                        .apply(vec![LocatorMatch::new(content.result.clone())], ctx)
                        .await?;
                }
                labels.first().cloned()
            } else if !label_multimatch {
                labels.first().cloned()
            } else {
                labels.get(index).cloned()
            };

            if label.is_none() && chain.flags.has_label_matching && !chain.label_allow_missing {
                labels_none_for_n += 1;
                continue;
            }
            matches.push(ContentMatch::new(chain.id, content, label, view.doc.clone()));
        }
    }
    Ok((matches, labels_none_for_n))
}

fn document_as_content(chain: &MatchChain, doc: &Arc<Document>) -> ContentMatch {
    let label = chain
        .flags
        .has_label_matching
        .then(LocatorMatch::default);
    let source = if doc.kind.derived() == DocumentKind::File {
        let mut file = Document::clone(doc);
        file.kind = DocumentKind::ContentFile;
        Arc::new(file)
    } else {
        doc.clone()
    };
    ContentMatch::new(chain.id, LocatorMatch::new(doc.path.clone()), label, source)
}

/// Runs the document locator and turns every result into a new document
pub async fn generate_document_matches(
    chain: &MatchChain,
    view: &DocumentView<'_>,
    ctx: &mut MatchContext<'_>,
) -> Result<Vec<Document>, ScrapeError> {
    let found = chain
        .document
        .apply(vec![LocatorMatch::new(view.text)], ctx)
        .await?;

    let mut documents = Vec::with_capacity(found.len());
    for mut lm in found {
        chain.document.apply_template(&mut lm, ctx.base_args);
        match normalize_link(
            &lm.result,
            view.doc.kind,
            Some(view.address),
            Some(&chain.link_policy),
        ) {
            Ok((path, _)) => documents.push(Document::derived_from(
                view.doc,
                chain.id,
                chain.document_output_chains.clone(),
                path,
                lm,
            )),
            Err(e) => tracing::warn!(
                "{}: skipping document link '{}': {}",
                view.doc.path,
                lm.result,
                e
            ),
        }
    }
    Ok(documents)
}

/// One matching pass of a chain over the current state of a document
///
/// DEDUP chains accumulate matches not handled before on this document; all
/// other strategies replace their pending matches.
pub async fn run_chain_pass(
    chain: &mut MatchChain,
    view: &DocumentView<'_>,
) -> Result<PassOutcome, ScrapeError> {
    let base = chain.general_args(view.doc, false);
    let mut ctx = MatchContext::new(view.tree, view.session, &base, &view.doc.path);

    let (contents, labels_none_for_n) = if chain.need_content_matches() {
        generate_content_matches(chain, view, &mut ctx).await?
    } else {
        (Vec::new(), 0)
    };
    let documents = if chain.need_document_matches(true) {
        generate_document_matches(chain, view, &mut ctx).await?
    } else {
        Vec::new()
    };
    let outcome = ctx.outcome();

    let id = chain.id;
    let state = &mut chain.state;
    state.labels_none_for_n = labels_none_for_n;

    if chain.rendered_strategy != RenderedStrategy::Dedup {
        state.content_matches = contents;
        state.document_matches = documents;
    } else {
        for cm in contents {
            if state.handled_content.insert(cm.key()) {
                state.content_matches.push(cm);
            }
        }
        for doc in documents {
            if state.handled_documents.insert((id, doc.path.clone())) {
                state.document_matches.push(doc);
            }
        }
    }
    Ok(outcome)
}

/// Decides whether a chain is done with the current document after a pass
pub fn satisfaction(chain: &MatchChain, session_active: bool) -> Satisfaction {
    if !session_active {
        return Satisfaction::Satisfied;
    }
    match chain.rendered_strategy {
        RenderedStrategy::Plain => Satisfaction::Satisfied,
        RenderedStrategy::AnyMatch => {
            let content = chain.need_content_matches() && !chain.state.content_matches.is_empty();
            let documents =
                chain.need_document_matches(true) && !chain.state.document_matches.is_empty();
            if content || documents {
                Satisfaction::Satisfied
            } else {
                Satisfaction::Unsatisfied
            }
        }
        RenderedStrategy::Interactive | RenderedStrategy::Dedup => Satisfaction::NeedsConfirmation,
    }
}
