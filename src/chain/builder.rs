//! Turning configured chain options into set up [`MatchChain`]s
//!
//! Building happens in two passes. [`ChainBuilder::merge`] resolves every
//! option from the chain itself, the `[defaults]` table or the builtin
//! default, and records where each value came from. [`ChainBuilder::setup`]
//! then compiles the locators, derives the chain's flags and validates every
//! template against the keys available where it is rendered.

use super::args::{general_keys, match_format_keys, output_format_keys, stage_keys, DOCUMENT_KEYS};
use super::model::{ChainFlags, ChainId, ChainState, IndexWindow, MatchChain};
use crate::config::{ChainOptions, ContentOptions, DocumentOptions, LabelOptions, LocatorOptions};
use crate::locator::{
    Locator, MatchStep, PatternMatch, ScriptStep, Stage, StructuralQuery, Template, CONTENT_KEY,
};
use crate::url::{LinkPolicy, FALLBACK_SCHEME};
use crate::{SetupError, SetupResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const DEFAULT_PRINT_FORMAT: &str = "{c}\n";
pub const DEFAULT_WRITE_FORMAT: &str = "{c}";
pub const DEFAULT_SAVE_FORMAT: &str = "{fn}";
pub const DEFAULT_ESCAPE_SEQUENCE: &str = "<END>";
pub const DEFAULT_DOCUMENT_ENCODING: &str = "utf-8";

/// Where the value of an option came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Builtin,
    Defaults,
    Chain(ChainId),
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Builtin => write!(f, "builtin default"),
            Provenance::Defaults => write!(f, "[defaults]"),
            Provenance::Chain(id) => write!(f, "chain {}", id),
        }
    }
}

/// Provenance of every option that was set, keyed by option name
#[derive(Debug, Clone, Default)]
pub struct ProvenanceTable(BTreeMap<String, Provenance>);

impl ProvenanceTable {
    pub fn get(&self, option: &str) -> Provenance {
        self.0.get(option).copied().unwrap_or(Provenance::Builtin)
    }

    fn record(&mut self, option: &str, provenance: Provenance) {
        self.0.insert(option.to_string(), provenance);
    }

    /// `option` with its origin, for error messages
    pub fn describe(&self, option: &str) -> String {
        format!("'{}' (from {})", option, self.get(option))
    }
}

/// Chain options after the first pass, with their provenance
#[derive(Debug, Clone)]
pub struct MergedChain {
    pub id: ChainId,
    pub options: ChainOptions,
    pub provenance: ProvenanceTable,
}

struct Merger {
    id: ChainId,
    table: ProvenanceTable,
}

impl Merger {
    fn pick<T: Clone>(&mut self, option: &str, chain: &Option<T>, defaults: &Option<T>) -> Option<T> {
        match (chain, defaults) {
            (Some(value), _) => {
                self.table.record(option, Provenance::Chain(self.id));
                Some(value.clone())
            }
            (None, Some(value)) => {
                self.table.record(option, Provenance::Defaults);
                Some(value.clone())
            }
            (None, None) => None,
        }
    }

    fn locator(&mut self, stage: &str, chain: &LocatorOptions, defaults: &LocatorOptions) -> LocatorOptions {
        let name = |field: &str| format!("{}.{}", stage, field);
        LocatorOptions {
            query: self.pick(&name("query"), &chain.query, &defaults.query),
            sibling_depth: self.pick(&name("sibling-depth"), &chain.sibling_depth, &defaults.sibling_depth),
            pattern: self.pick(&name("pattern"), &chain.pattern, &defaults.pattern),
            script: self.pick(&name("script"), &chain.script, &defaults.script),
            format: self.pick(&name("format"), &chain.format, &defaults.format),
            multimatch: self.pick(&name("multimatch"), &chain.multimatch, &defaults.multimatch),
            interactive: self.pick(&name("interactive"), &chain.interactive, &defaults.interactive),
        }
    }
}

/// Builds the chains of one run
#[derive(Debug, Clone)]
pub struct ChainBuilder<'a> {
    defaults: &'a ChainOptions,
    chain_count: usize,
    session_active: bool,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(defaults: &'a ChainOptions, chain_count: usize, session_active: bool) -> Self {
        Self {
            defaults,
            chain_count,
            session_active,
        }
    }

    /// Builds chain `id` from its options
    pub fn build(&self, id: ChainId, options: &ChainOptions) -> SetupResult<MatchChain> {
        self.setup(self.merge(id, options))
    }

    /// First pass: chain value, then `[defaults]`, then builtin
    pub fn merge(&self, id: ChainId, chain: &ChainOptions) -> MergedChain {
        let d = self.defaults;
        let mut m = Merger {
            id,
            table: ProvenanceTable::default(),
        };

        macro_rules! pick {
            ($option:literal, $($field:ident).+) => {
                m.pick($option, &chain.$($field).+, &d.$($field).+)
            };
        }

        let options = ChainOptions {
            rendered_strategy: pick!("rendered-strategy", rendered_strategy),
            download_strategy: pick!("download-strategy", download_strategy),
            overwrite_files: pick!("overwrite-files", overwrite_files),
            filename_default_format: pick!("filename-default-format", filename_default_format),
            content: ContentOptions {
                locator: m.locator("content", &chain.content.locator, &d.content.locator),
                is_link: pick!("content.is-link", content.is_link),
                index_min: pick!("content.index-min", content.index_min),
                index_max: pick!("content.index-max", content.index_max),
                continuous_index: pick!("content.continuous-index", content.continuous_index),
                print_format: pick!("content.print-format", content.print_format),
                save_format: pick!("content.save-format", content.save_format),
                write_format: pick!("content.write-format", content.write_format),
                forward_format: pick!("content.forward-format", content.forward_format),
                forward_chains: pick!("content.forward-chains", content.forward_chains),
                escape_sequence: pick!("content.escape-sequence", content.escape_sequence),
                save_path_interactive: pick!("content.save-path-interactive", content.save_path_interactive),
            },
            label: LabelOptions {
                locator: m.locator("label", &chain.label.locator, &d.label.locator),
                inside_content: pick!("label.inside-content", label.inside_content),
                allow_missing: pick!("label.allow-missing", label.allow_missing),
                allow_slashes: pick!("label.allow-slashes", label.allow_slashes),
                default_format: pick!("label.default-format", label.default_format),
            },
            document: DocumentOptions {
                locator: m.locator("document", &chain.document.locator, &d.document.locator),
                index_min: pick!("document.index-min", document.index_min),
                index_max: pick!("document.index-max", document.index_max),
                output_chains: pick!("document.output-chains", document.output_chains),
                encoding: pick!("document.encoding", document.encoding),
                force_encoding: pick!("document.force-encoding", document.force_encoding),
                scheme: pick!("document.scheme", document.scheme),
                prefer_parent_scheme: pick!("document.prefer-parent-scheme", document.prefer_parent_scheme),
                force_scheme: pick!("document.force-scheme", document.force_scheme),
                duplication: pick!("document.duplication", document.duplication),
            },
        };

        MergedChain {
            id,
            options,
            provenance: m.table,
        }
    }

    /// Second pass: compiles and validates a merged chain
    pub fn setup(&self, merged: MergedChain) -> SetupResult<MatchChain> {
        let MergedChain {
            id,
            options: o,
            provenance,
        } = merged;
        let fail = |message: String| SetupError::Chain { chain: id, message };

        let content_window = IndexWindow {
            min: o.content.index_min.unwrap_or(1),
            max: o.content.index_max,
        };
        let document_window = IndexWindow {
            min: o.document.index_min.unwrap_or(1),
            max: o.document.index_max,
        };
        if document_window.max.map_or(false, |max| document_window.min > max) {
            return Err(fail("dimin can't exceed dimax".to_string()));
        }
        if content_window.max.map_or(false, |max| content_window.min > max) {
            return Err(fail("cimin can't exceed cimax".to_string()));
        }

        let mut content = self.build_locator(id, Stage::Content, &o.content.locator, &provenance)?;
        let mut label = self.build_locator(id, Stage::Label, &o.label.locator, &provenance)?;
        let mut document = self.build_locator(id, Stage::Document, &o.document.locator, &provenance)?;

        let labels_inside_content = o.label.inside_content.unwrap_or(false);
        let has_label_matching = label.is_active();
        let has_document_matching = document.is_active();

        let mut print_format = o.content.print_format.clone();
        let mut save_format = o.content.save_format.clone();
        let mut write_format = o.content.write_format.clone();
        if write_format.is_some() && save_format.is_none() {
            save_format = Some(DEFAULT_SAVE_FORMAT.to_string());
        }

        let has_content_matching = has_label_matching
            || content.is_active()
            || print_format.is_some()
            || save_format.is_some();
        if has_content_matching && print_format.is_none() && save_format.is_none() {
            print_format = Some(DEFAULT_PRINT_FORMAT.to_string());
        }
        if save_format.is_some() && write_format.is_none() {
            write_format = Some(DEFAULT_WRITE_FORMAT.to_string());
        }
        if !has_content_matching && !has_document_matching {
            return Err(SetupError::UnusedChain { chain: id });
        }

        let label_allow_missing = if has_label_matching {
            o.label.allow_missing.unwrap_or(false)
        } else {
            if labels_inside_content {
                return Err(fail(
                    "cannot place labels inside content without a label query or pattern".to_string(),
                ));
            }
            true
        };

        let parses_documents = content.parses_documents()
            || label.parses_documents()
            || has_document_matching;
        let mut content_is_link = o.content.is_link.unwrap_or(false);
        if !parses_documents && !self.session_active {
            content_is_link = true;
        }

        if labels_inside_content {
            if let Some(query) = content.structural_query_mut() {
                query.retain_node = true;
            }
        }

        self.bind_script_args(&mut content);
        self.bind_script_args(&mut label);
        self.bind_script_args(&mut document);

        // Locator templates
        let match_keys = match_format_keys(&content, &label, &document);
        for (locator, option) in [
            (&content, "content.format"),
            (&label, "label.format"),
            (&document, "document.format"),
        ] {
            if let Some(template) = locator.template() {
                check_keys(id, template, &match_keys, option, &provenance)?;
            }
        }

        // Output formats
        let print_format = parse_format(id, print_format, "content.print-format", &provenance)?;
        let save_format = match save_format {
            Some(s) if s.is_empty() => {
                return Err(fail(format!(
                    "save format cannot be empty: {}",
                    provenance.describe("content.save-format")
                )))
            }
            other => parse_format(id, other, "content.save-format", &provenance)?,
        };
        let write_format = parse_format(id, write_format, "content.write-format", &provenance)?;

        let streamed = output_format_keys(&match_keys, has_label_matching, true, content_is_link);
        let saved = output_format_keys(&match_keys, has_label_matching, false, content_is_link);
        if let Some(t) = &print_format {
            check_keys(id, t, &streamed, "content.print-format", &provenance)?;
        }
        if let Some(t) = &save_format {
            check_keys(id, t, &saved, "content.save-format", &provenance)?;
        }
        if let Some(t) = &write_format {
            check_keys(id, t, &streamed, "content.write-format", &provenance)?;
        }

        let forward_chains = o.content.forward_chains.clone().unwrap_or_default();
        let forward_format = if forward_chains.is_empty() {
            None
        } else {
            let source = o
                .content
                .forward_format
                .clone()
                .unwrap_or_else(|| DEFAULT_WRITE_FORMAT.to_string());
            let t = parse_format(id, Some(source), "content.forward-format", &provenance)?;
            if let Some(t) = &t {
                let keys = output_format_keys(&match_keys, has_label_matching, true, false);
                check_keys(id, t, &keys, "content.forward-format", &provenance)?;
            }
            t
        };

        let outputs: Vec<&Template> = [&print_format, &save_format, &write_format, &forward_format]
            .into_iter()
            .flatten()
            .collect();
        let count = |names: &[&str]| outputs.iter().map(|t| t.count_keys(names)).sum::<usize>();
        let streamed_outputs: usize = [&print_format, &write_format, &forward_format]
            .into_iter()
            .flatten()
            .map(|t| t.count_keys(&[CONTENT_KEY]))
            .sum();

        let flags = ChainFlags {
            has_label_matching,
            has_content_matching,
            has_document_matching,
            has_interactive_matching: content.interactive || label.interactive,
            parses_documents,
            need_content: count(&[CONTENT_KEY]) > 0,
            need_label: count(&["l"]) > 0,
            need_filename: count(&["fn", "fb", "fe"]) > 0,
            need_output_multipass: streamed_outputs > 1,
        };

        let mut chain = MatchChain {
            id,
            content,
            label,
            document,
            content_window,
            document_window,
            ci_continuous: o.content.continuous_index.unwrap_or(false),
            ci: 1,
            di: 1,
            rendered_strategy: o.rendered_strategy.unwrap_or_default(),
            download_strategy: o.download_strategy.unwrap_or_default(),
            duplication: o.document.duplication.unwrap_or_default(),
            print_format,
            save_format,
            write_format,
            forward_format,
            filename_default_format: None,
            label_default_format: None,
            forward_chains,
            document_output_chains: o.document.output_chains.clone().unwrap_or_else(|| vec![id]),
            content_is_link,
            labels_inside_content,
            label_allow_missing,
            allow_slashes_in_labels: o.label.allow_slashes.unwrap_or(false),
            overwrite_files: o.overwrite_files.unwrap_or(true),
            save_path_interactive: o.content.save_path_interactive.unwrap_or(false),
            escape_sequence: o
                .content
                .escape_sequence
                .clone()
                .unwrap_or_else(|| DEFAULT_ESCAPE_SEQUENCE.to_string()),
            document_encoding: o
                .document
                .encoding
                .clone()
                .unwrap_or_else(|| DEFAULT_DOCUMENT_ENCODING.to_string()),
            forced_document_encoding: o.document.force_encoding.clone(),
            link_policy: LinkPolicy {
                default_scheme: o
                    .document
                    .scheme
                    .clone()
                    .unwrap_or_else(|| FALLBACK_SCHEME.to_string()),
                prefer_parent_scheme: o.document.prefer_parent_scheme.unwrap_or(true),
                forced_scheme: o.document.force_scheme.clone(),
            },
            flags,
            state: ChainState::default(),
        };

        self.setup_default_formats(&mut chain, &o, &match_keys, &provenance)?;
        self.check_references(&chain)?;
        Ok(chain)
    }

    fn build_locator(
        &self,
        id: ChainId,
        stage: Stage,
        opts: &LocatorOptions,
        provenance: &ProvenanceTable,
    ) -> SetupResult<Locator> {
        let name = stage.name();
        let fail = |field: &str, message: String| SetupError::Chain {
            chain: id,
            message: format!(
                "{} in {}",
                message,
                provenance.describe(&format!("{}.{}", name, field))
            ),
        };
        let multimatch = opts.multimatch.unwrap_or(true);
        let mut locator = Locator::new(stage);
        locator.interactive = opts.interactive.unwrap_or(false);

        if let Some(query) = opts.query.as_deref().filter(|q| !q.is_empty()) {
            let step = StructuralQuery::parse(query, opts.sibling_depth.unwrap_or(0), multimatch)
                .map_err(|e| fail("query", e))?;
            locator.push(MatchStep::Structural(step));
        }
        if let Some(pattern) = opts.pattern.as_deref().filter(|p| !p.is_empty()) {
            let step = PatternMatch::parse(pattern, multimatch).map_err(|e| fail("pattern", e))?;
            locator.push(MatchStep::Pattern(step));
        }
        if let Some(script) = opts.script.as_deref().filter(|s| !s.is_empty()) {
            if !self.session_active {
                return Err(fail(
                    "script",
                    "scripts require a browser session".to_string(),
                ));
            }
            locator.push(MatchStep::Script(ScriptStep::new(script, multimatch)));
        }
        if let Some(format) = opts.format.as_deref().filter(|f| !f.is_empty()) {
            let step = Template::parse(format).map_err(|e| fail("format", e.to_string()))?;
            locator.push(MatchStep::Template(step));
        }
        Ok(locator)
    }

    /// Fixes the arguments every script step of `locator` is called with
    fn bind_script_args(&self, locator: &mut Locator) {
        let mut names: Vec<BTreeSet<String>> = Vec::new();
        for (i, step) in locator.steps().iter().enumerate() {
            if matches!(step, MatchStep::Script(_)) {
                let mut keys = general_keys(false);
                keys.extend(DOCUMENT_KEYS.iter().map(|k| k.to_string()));
                keys.extend(stage_keys(locator, Some(i)));
                names.push(keys);
            }
        }
        let mut names = names.into_iter();
        for step in locator.steps_mut() {
            if let MatchStep::Script(script) = step {
                if let Some(keys) = names.next() {
                    script.bind_args(keys);
                }
            }
        }
    }

    fn setup_default_formats(
        &self,
        chain: &mut MatchChain,
        o: &ChainOptions,
        match_keys: &BTreeSet<String>,
        provenance: &ProvenanceTable,
    ) -> SetupResult<()> {
        let stem = default_format_stem(chain, self.chain_count);

        chain.filename_default_format = match &o.filename_default_format {
            Some(source) => {
                let t = parse_format(chain.id, Some(source.clone()), "filename-default-format", provenance)?;
                if let Some(t) = &t {
                    check_keys(chain.id, t, match_keys, "filename-default-format", provenance)?;
                }
                t
            }
            None if chain.flags.need_filename => Some(parse_format_or_setup(
                chain.id,
                &format!("{}.dat", stem),
            )?),
            None => None,
        };

        chain.label_default_format = match &o.label.default_format {
            Some(source) => {
                let t = parse_format(chain.id, Some(source.clone()), "label.default-format", provenance)?;
                if let Some(t) = &t {
                    check_keys(chain.id, t, match_keys, "label.default-format", provenance)?;
                }
                t
            }
            None if chain.label_allow_missing && chain.flags.need_label => {
                Some(parse_format_or_setup(chain.id, &stem)?)
            }
            None => None,
        };
        Ok(())
    }

    fn check_references(&self, chain: &MatchChain) -> SetupResult<()> {
        let fields = [
            ("document.output-chains", &chain.document_output_chains),
            ("content.forward-chains", &chain.forward_chains),
        ];
        for (field, targets) in fields {
            if let Some(&target) = targets.iter().find(|&&t| t >= self.chain_count) {
                return Err(SetupError::UnknownChain {
                    chain: chain.id,
                    target,
                    field,
                });
            }
        }
        Ok(())
    }
}

/// Stem of the builtin filename and label formats, e.g. `dl_{di:03}_{ci:03}`
pub fn default_format_stem(chain: &MatchChain, chain_count: usize) -> String {
    let mut form = String::from("dl_");
    if chain_count > 1 {
        form.push_str(&format!("{{chain:{}}}_", chain_count.to_string().len()));
    }
    let di_digits = chain.document_window.digits();
    let ci_digits = chain.content_window.digits();
    if chain.ci_continuous {
        form.push_str(&format!("{{ci:0{}}}", ci_digits));
    } else if chain.content.has_multimatch() {
        if chain.flags.has_document_matching {
            form.push_str(&format!("{{di:0{}}}_{{ci:0{}}}", di_digits, ci_digits));
        } else {
            form.push_str(&format!("{{ci:0{}}}", ci_digits));
        }
    } else if chain.flags.has_document_matching {
        form.push_str(&format!("{{di:0{}}}", di_digits));
    }
    form
}

fn parse_format(
    id: ChainId,
    source: Option<String>,
    option: &str,
    provenance: &ProvenanceTable,
) -> SetupResult<Option<Template>> {
    source
        .map(|s| {
            Template::parse(&s).map_err(|e| SetupError::Chain {
                chain: id,
                message: format!("{} in {}", e, provenance.describe(option)),
            })
        })
        .transpose()
}

fn parse_format_or_setup(id: ChainId, source: &str) -> SetupResult<Template> {
    Template::parse(source).map_err(|e| SetupError::Chain {
        chain: id,
        message: e.to_string(),
    })
}

fn check_keys(
    id: ChainId,
    template: &Template,
    known: &BTreeSet<String>,
    option: &str,
    provenance: &ProvenanceTable,
) -> SetupResult<()> {
    template.validate(known).map_err(|e| SetupError::Chain {
        chain: id,
        message: format!("{} in {}", e, provenance.describe(option)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_chain(query: &str) -> ChainOptions {
        let mut options = ChainOptions::default();
        options.content.locator.query = Some(query.to_string());
        options
    }

    #[test]
    fn test_merge_provenance() {
        let mut defaults = ChainOptions::default();
        defaults.content.index_max = Some(5);
        defaults.content.locator.query = Some("p".to_string());
        let chain = content_chain("li::text");

        let builder = ChainBuilder::new(&defaults, 1, false);
        let merged = builder.merge(0, &chain);

        assert_eq!(merged.options.content.locator.query.as_deref(), Some("li::text"));
        assert_eq!(merged.options.content.index_max, Some(5));
        assert_eq!(merged.provenance.get("content.query"), Provenance::Chain(0));
        assert_eq!(merged.provenance.get("content.index-max"), Provenance::Defaults);
        assert_eq!(merged.provenance.get("content.pattern"), Provenance::Builtin);
    }

    #[test]
    fn test_setup_defaults() {
        let defaults = ChainOptions::default();
        let chain = ChainBuilder::new(&defaults, 1, false)
            .build(0, &content_chain("li::text"))
            .unwrap();

        assert_eq!(chain.print_format.as_ref().map(Template::source), Some("{c}\n"));
        assert!(chain.save_format.is_none());
        assert_eq!(chain.document_output_chains, vec![0]);
        assert!(chain.flags.has_content_matching);
        assert!(chain.label_allow_missing);
        assert!(!chain.content_is_link);
        assert_eq!(chain.ci, 1);
        assert_eq!(chain.di, 1);
    }

    #[test]
    fn test_write_format_implies_save() {
        let defaults = ChainOptions::default();
        let mut options = content_chain("a @href");
        options.content.is_link = Some(true);
        options.content.write_format = Some("{c}".to_string());

        let chain = ChainBuilder::new(&defaults, 2, false).build(1, &options).unwrap();
        assert_eq!(chain.save_format.as_ref().map(Template::source), Some("{fn}"));
        assert!(chain.flags.need_filename);
        assert_eq!(
            chain.filename_default_format.as_ref().map(Template::source),
            Some("dl_{chain:1}_{ci:03}.dat")
        );
    }

    #[test]
    fn test_index_window_errors() {
        let defaults = ChainOptions::default();
        let mut options = content_chain("p");
        options.content.index_min = Some(4);
        options.content.index_max = Some(2);
        let err = ChainBuilder::new(&defaults, 1, false).build(0, &options).unwrap_err();
        assert!(err.to_string().contains("cimin can't exceed cimax"));

        let mut options = content_chain("p");
        options.document.index_min = Some(3);
        options.document.index_max = Some(1);
        let err = ChainBuilder::new(&defaults, 1, false).build(0, &options).unwrap_err();
        assert!(err.to_string().contains("dimin can't exceed dimax"));
    }

    #[test]
    fn test_unused_chain() {
        let defaults = ChainOptions::default();
        let err = ChainBuilder::new(&defaults, 1, false)
            .build(0, &ChainOptions::default())
            .unwrap_err();
        assert!(matches!(err, SetupError::UnusedChain { chain: 0 }));
    }

    #[test]
    fn test_unknown_key() {
        let defaults = ChainOptions::default();
        let mut options = content_chain("p");
        options.content.print_format = Some("{nope}\n".to_string());
        let err = ChainBuilder::new(&defaults, 1, false).build(0, &options).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("nope"), "{}", message);
        assert!(message.contains("content.print-format"), "{}", message);
    }

    #[test]
    fn test_content_key_not_allowed_in_save_format() {
        let defaults = ChainOptions::default();
        let mut options = content_chain("p");
        options.content.save_format = Some("{c}.txt".to_string());
        assert!(ChainBuilder::new(&defaults, 1, false).build(0, &options).is_err());
    }

    #[test]
    fn test_script_requires_session() {
        let defaults = ChainOptions::default();
        let mut options = content_chain("p");
        options.content.locator.script = Some("return cm;".to_string());
        let err = ChainBuilder::new(&defaults, 1, false).build(0, &options).unwrap_err();
        assert!(err.to_string().contains("browser session"));

        let chain = ChainBuilder::new(&defaults, 1, true).build(0, &options).unwrap();
        let Some(MatchStep::Script(script)) = chain.content.steps().get(1) else {
            panic!("expected a script step");
        };
        assert!(script.arg_names().iter().any(|n| n == "cx"));
        assert!(script.arg_names().iter().any(|n| n == "dl"));
        assert!(!script.arg_names().iter().any(|n| n == "ci"));
    }

    #[test]
    fn test_labels_inside_content() {
        let defaults = ChainOptions::default();
        let mut options = content_chain("div.item");
        options.label.inside_content = Some(true);
        let err = ChainBuilder::new(&defaults, 1, false).build(0, &options).unwrap_err();
        assert!(err.to_string().contains("labels inside content"));

        options.label.locator.query = Some("h2::text".to_string());
        let chain = ChainBuilder::new(&defaults, 1, false).build(0, &options).unwrap();
        assert!(chain.content.structural_query().unwrap().retain_node);
        assert!(!chain.label_allow_missing);
    }

    #[test]
    fn test_unknown_chain_reference() {
        let defaults = ChainOptions::default();
        let mut options = content_chain("p");
        options.content.forward_chains = Some(vec![4]);
        let err = ChainBuilder::new(&defaults, 2, false).build(0, &options).unwrap_err();
        assert!(matches!(
            err,
            SetupError::UnknownChain {
                chain: 0,
                target: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_document_only_chain_is_link() {
        let defaults = ChainOptions::default();
        let mut options = ChainOptions::default();
        options.content.save_format = Some("out/{fn}".to_string());
        let chain = ChainBuilder::new(&defaults, 1, false).build(0, &options).unwrap();
        assert!(chain.content_is_link);
        assert!(!chain.flags.parses_documents);
        assert_eq!(chain.write_format.as_ref().map(Template::source), Some("{c}"));
    }
}
