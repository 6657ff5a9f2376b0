//! Locator pipeline
//!
//! A locator is an ordered list of matching steps. Every step takes the
//! accumulated matches of the previous step and produces zero or more new
//! ones:
//! - structural queries select nodes of the parsed document
//! - patterns run a regular expression over the current result
//! - scripts evaluate JavaScript inside a rendered document
//! - templates format the result from the collected arguments
//!
//! Templates are not run by [`Locator::apply`]; content and label templates
//! are resolved when a match is accepted, document templates when the
//! derived document is generated.

mod matched;
mod pattern;
mod script;
mod structural;
mod template;

pub use matched::{LocatorMatch, MatchKey, Stage};
pub use pattern::PatternMatch;
pub use script::ScriptStep;
pub use structural::{Extract, StructuralHit, StructuralQuery};
pub use template::{pad, FormatArgs, Template, TemplateError, Token, CONTENT_KEY};

use crate::crawler::RenderedSession;
use crate::ScrapeError;
use scraper::Html;

/// A single step of a locator
#[derive(Debug, Clone)]
pub enum MatchStep {
    Structural(StructuralQuery),
    Pattern(PatternMatch),
    Script(ScriptStep),
    Template(Template),
}

impl MatchStep {
    /// The step evaluates against the parsed document tree
    pub fn needs_tree(&self) -> bool {
        matches!(self, MatchStep::Structural(_))
    }

    /// The step inspects the document itself rather than only the
    /// accumulated result
    pub fn needs_structural(&self) -> bool {
        matches!(self, MatchStep::Structural(_) | MatchStep::Script(_))
    }

    pub fn is_order_dependent(&self) -> bool {
        match self {
            MatchStep::Script(_) => true,
            MatchStep::Template(t) => t.references("ci"),
            MatchStep::Structural(_) | MatchStep::Pattern(_) => false,
        }
    }

    pub fn has_multimatch(&self) -> bool {
        match self {
            MatchStep::Structural(q) => q.multimatch,
            MatchStep::Pattern(p) => p.multimatch,
            MatchStep::Script(s) => s.multimatch,
            MatchStep::Template(_) => false,
        }
    }
}

/// Whether a matching pass changed the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Unchanged,
    /// A script ran, so the document may have changed under the pass
    Mutated,
}

/// Everything a locator needs from the document being matched
pub struct MatchContext<'a> {
    pub tree: Option<&'a Html>,
    pub session: Option<&'a dyn RenderedSession>,
    pub base_args: &'a FormatArgs,
    pub doc_path: &'a str,
    pub scripts_executed: bool,
}

impl<'a> MatchContext<'a> {
    pub fn new(
        tree: Option<&'a Html>,
        session: Option<&'a dyn RenderedSession>,
        base_args: &'a FormatArgs,
        doc_path: &'a str,
    ) -> Self {
        Self {
            tree,
            session,
            base_args,
            doc_path,
            scripts_executed: false,
        }
    }

    pub fn outcome(&self) -> PassOutcome {
        if self.scripts_executed {
            PassOutcome::Mutated
        } else {
            PassOutcome::Unchanged
        }
    }
}

/// An ordered list of matching steps for one stage of a chain
#[derive(Debug, Clone)]
pub struct Locator {
    pub stage: Stage,
    steps: Vec<MatchStep>,
    /// Prompt for every match of this locator when it is accepted
    pub interactive: bool,
}

impl Locator {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            steps: Vec::new(),
            interactive: false,
        }
    }

    pub fn push(&mut self, step: MatchStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[MatchStep] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut [MatchStep] {
        &mut self.steps
    }

    pub fn is_active(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Any step other than the template reads the document
    pub fn parses_documents(&self) -> bool {
        self.steps
            .iter()
            .any(|s| !matches!(s, MatchStep::Template(_)))
    }

    pub fn needs_tree(&self) -> bool {
        self.steps.iter().any(MatchStep::needs_tree)
    }

    pub fn is_order_dependent(&self) -> bool {
        self.steps.iter().any(MatchStep::is_order_dependent)
    }

    pub fn has_multimatch(&self) -> bool {
        self.steps.iter().any(MatchStep::has_multimatch)
    }

    pub fn has_script(&self) -> bool {
        self.steps.iter().any(|s| matches!(s, MatchStep::Script(_)))
    }

    pub fn template(&self) -> Option<&Template> {
        self.steps.iter().find_map(|s| match s {
            MatchStep::Template(t) => Some(t),
            _ => None,
        })
    }

    pub fn structural_query(&self) -> Option<&StructuralQuery> {
        self.steps.iter().find_map(|s| match s {
            MatchStep::Structural(q) => Some(q),
            _ => None,
        })
    }

    pub fn structural_query_mut(&mut self) -> Option<&mut StructuralQuery> {
        self.steps.iter_mut().find_map(|s| match s {
            MatchStep::Structural(q) => Some(q),
            _ => None,
        })
    }

    pub fn pattern(&self) -> Option<&PatternMatch> {
        self.steps.iter().find_map(|s| match s {
            MatchStep::Pattern(p) => Some(p),
            _ => None,
        })
    }

    /// Runs every step except the template
    pub async fn apply(
        &self,
        inputs: Vec<LocatorMatch>,
        ctx: &mut MatchContext<'_>,
    ) -> Result<Vec<LocatorMatch>, ScrapeError> {
        let structural = self.apply_structural(inputs, ctx)?;
        self.apply_refinements(structural, ctx).await
    }

    /// Runs only the structural query; inputs pass through unchanged when the
    /// locator has none
    pub fn apply_structural(
        &self,
        inputs: Vec<LocatorMatch>,
        ctx: &MatchContext<'_>,
    ) -> Result<Vec<LocatorMatch>, ScrapeError> {
        match self.structural_query() {
            Some(query) => query.apply(inputs, ctx.tree).map_err(|e| {
                ScrapeError::Match(format!("{} in {}", e, ctx.doc_path))
            }),
            None => Ok(inputs),
        }
    }

    /// Runs the pattern and script steps
    pub async fn apply_refinements(
        &self,
        inputs: Vec<LocatorMatch>,
        ctx: &mut MatchContext<'_>,
    ) -> Result<Vec<LocatorMatch>, ScrapeError> {
        let mut matches = inputs;
        for step in &self.steps {
            if matches.is_empty() {
                break;
            }
            matches = match step {
                MatchStep::Structural(_) => matches,
                MatchStep::Pattern(pattern) => pattern.apply(matches),
                MatchStep::Script(script) => {
                    let session = ctx.session.ok_or_else(|| {
                        ScrapeError::Match(format!(
                            "{} script requires a rendered session",
                            self.stage.name()
                        ))
                    })?;
                    ctx.scripts_executed = true;
                    script
                        .apply(matches, session, ctx.base_args, self.stage, ctx.doc_path)
                        .await?
                }
                MatchStep::Template(_) => matches,
            };
        }
        Ok(matches)
    }

    /// Resolves the template of this locator for one match
    ///
    /// `base` holds the chain level arguments (`ci`, `di`, `chain`, ...);
    /// the match's own stage arguments are layered on top.
    pub fn apply_template(&self, lm: &mut LocatorMatch, base: &FormatArgs) {
        let Some(template) = self.template() else {
            return;
        };
        let mut args = base.clone();
        lm.insert_args(self.stage, &mut args);
        let rendered = template.render(&args);
        lm.templated = Some(rendered.clone());
        lm.result = rendered;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_locator(query: &str, pattern: Option<&str>) -> Locator {
        let mut locator = Locator::new(Stage::Content);
        locator.push(MatchStep::Structural(
            StructuralQuery::parse(query, 0, true).unwrap(),
        ));
        if let Some(p) = pattern {
            locator.push(MatchStep::Pattern(PatternMatch::parse(p, true).unwrap()));
        }
        locator
    }

    #[tokio::test]
    async fn test_apply_structural_then_pattern() {
        let tree = Html::parse_document("<p>a=1</p><p>b=2</p>");
        let args = FormatArgs::new();
        let mut ctx = MatchContext::new(Some(&tree), None, &args, "test.html");
        let locator = content_locator("p::text", Some(r"\d"));

        let out = locator
            .apply(vec![LocatorMatch::new("")], &mut ctx)
            .await
            .unwrap();
        let results: Vec<&str> = out.iter().map(|m| m.result.as_str()).collect();
        assert_eq!(results, vec!["1", "2"]);
        assert_eq!(ctx.outcome(), PassOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_pattern_only_runs_on_seed_text() {
        let args = FormatArgs::new();
        let mut ctx = MatchContext::new(None, None, &args, "doc.txt");
        let mut locator = Locator::new(Stage::Document);
        locator.push(MatchStep::Pattern(
            PatternMatch::parse(r"https://\S+", true).unwrap(),
        ));
        let out = locator
            .apply(
                vec![LocatorMatch::new("see https://a.com and https://b.com")],
                &mut ctx,
            )
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].result, "https://b.com");
    }

    #[tokio::test]
    async fn test_script_without_session_fails() {
        let args = FormatArgs::new();
        let mut ctx = MatchContext::new(None, None, &args, "x");
        let mut locator = Locator::new(Stage::Content);
        locator.push(MatchStep::Script(ScriptStep::new("return 1;", false)));
        let err = locator
            .apply(vec![LocatorMatch::new("")], &mut ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rendered session"));
    }

    #[test]
    fn test_apply_template() {
        let mut locator = Locator::new(Stage::Content);
        locator.push(MatchStep::Template(Template::parse("{ci:02}-{cm}").unwrap()));
        let mut base = FormatArgs::new();
        base.insert("ci".to_string(), "3".to_string());

        let mut lm = LocatorMatch::new("foo");
        locator.apply_template(&mut lm, &base);
        assert_eq!(lm.result, "03-foo");
        assert_eq!(lm.templated.as_deref(), Some("03-foo"));
        assert!(locator.is_order_dependent());
        assert!(!locator.parses_documents());
    }

    #[test]
    fn test_step_flags() {
        let locator = content_locator("li", None);
        assert!(locator.needs_tree());
        assert!(locator.parses_documents());
        assert!(locator.has_multimatch());
        assert!(!locator.is_order_dependent());
        assert!(!Locator::new(Stage::Label).is_active());
    }
}
