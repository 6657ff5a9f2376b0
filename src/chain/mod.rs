//! Match chains
//!
//! A chain bundles a content, a label and a document locator with the
//! bookkeeping needed to run them over many documents: index windows, pending
//! matches, output formats and the flags derived from them at setup. Chains
//! live in a [`ChainSet`] and refer to each other by [`ChainId`].

mod args;
mod builder;
mod matching;
mod model;

pub use args::{
    general_keys, insert_filename_args, match_format_keys, output_format_keys, stage_keys,
    FILENAME_KEYS, GENERAL_KEYS,
};
pub use builder::{
    default_format_stem, ChainBuilder, MergedChain, Provenance, ProvenanceTable,
    DEFAULT_ESCAPE_SEQUENCE, DEFAULT_PRINT_FORMAT, DEFAULT_SAVE_FORMAT, DEFAULT_WRITE_FORMAT,
};
pub use matching::{
    generate_content_matches, generate_document_matches, run_chain_pass, satisfaction,
    ContentKey, ContentMatch, DocumentView, Satisfaction,
};
pub use model::{
    ChainFlags, ChainId, ChainState, DocumentDuplication, DownloadStrategy, IndexSlot,
    IndexWindow, MatchChain, RenderedStrategy,
};

use crate::config::Config;
use crate::SetupResult;
use std::ops::{Index, IndexMut};

/// Arena of every chain of a run, indexed by [`ChainId`]
#[derive(Debug, Default)]
pub struct ChainSet {
    chains: Vec<MatchChain>,
}

impl ChainSet {
    /// Builds and validates all configured chains
    pub fn build(config: &Config, session_active: bool) -> SetupResult<Self> {
        let builder = ChainBuilder::new(&config.defaults, config.chains.len(), session_active);
        let chains = config
            .chains
            .iter()
            .enumerate()
            .map(|(id, options)| builder.build(id, options))
            .collect::<SetupResult<Vec<_>>>()?;
        Ok(Self { chains })
    }

    pub fn get(&self, id: ChainId) -> Option<&MatchChain> {
        self.chains.get(id)
    }

    pub fn get_mut(&mut self, id: ChainId) -> Option<&mut MatchChain> {
        self.chains.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchChain> {
        self.chains.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MatchChain> {
        self.chains.iter_mut()
    }

    pub fn ids(&self) -> std::ops::Range<ChainId> {
        0..self.chains.len()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Any of the given chains reads the documents it runs on
    pub fn any_parses_documents(&self, ids: &[ChainId]) -> bool {
        ids.iter()
            .filter_map(|&id| self.get(id))
            .any(|c| c.flags.parses_documents)
    }
}

impl Index<ChainId> for ChainSet {
    type Output = MatchChain;

    fn index(&self, id: ChainId) -> &MatchChain {
        &self.chains[id]
    }
}

impl IndexMut<ChainId> for ChainSet {
    fn index_mut(&mut self, id: ChainId) -> &mut MatchChain {
        &mut self.chains[id]
    }
}
