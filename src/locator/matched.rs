use super::template::FormatArgs;

/// Which part of a chain a locator belongs to
///
/// The stage decides the prefix of the template arguments a match exposes
/// (`cx`, `lx`, `dx`, ...) and the name of its final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Content,
    Label,
    Document,
}

impl Stage {
    pub fn prefix(&self) -> &'static str {
        match self {
            Stage::Content => "c",
            Stage::Label => "l",
            Stage::Document => "d",
        }
    }

    /// Key under which the final result of this stage is exposed
    pub fn result_key(&self) -> &'static str {
        match self {
            Stage::Content => "cm",
            Stage::Label => "l",
            Stage::Document => "d",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Content => "content",
            Stage::Label => "label",
            Stage::Document => "document",
        }
    }
}

/// Identity of a locator match within one chain
pub type MatchKey = (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// Accumulator threaded through the steps of a locator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocatorMatch {
    /// Current result, replaced by every step
    pub result: String,
    /// Result of the structural query step
    pub structural: Option<String>,
    /// Outer HTML of the matched node, kept for nested queries
    pub node_html: Option<String>,
    /// Whole match of the pattern step
    pub pattern: Option<String>,
    /// Positional capture groups, group 1 first
    pub positional_groups: Vec<String>,
    /// Named capture groups in pattern order
    pub named_groups: Vec<(String, String)>,
    /// Output of the script step
    pub script: Option<String>,
    /// Output of the template step
    pub templated: Option<String>,
}

impl LocatorMatch {
    /// Creates a match seeded with the given text
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            ..Default::default()
        }
    }

    /// Seeds a nested match from a content match, so label queries run inside
    /// the content's own subtree
    pub fn nested_in(parent: &LocatorMatch) -> Self {
        Self {
            result: parent.result.clone(),
            node_html: Some(
                parent
                    .node_html
                    .clone()
                    .unwrap_or_else(|| parent.result.clone()),
            ),
            ..Default::default()
        }
    }

    pub fn key(&self) -> MatchKey {
        (
            self.structural.clone(),
            self.pattern.clone(),
            self.templated.clone(),
            self.script.clone(),
        )
    }

    /// Exposes this match as template arguments for the given stage
    ///
    /// Positional groups are inserted before named groups so a named group
    /// wins if both share a name.
    pub fn insert_args(&self, stage: Stage, args: &mut FormatArgs) {
        let p = stage.prefix();
        let optional = [
            (format!("{p}x"), &self.structural),
            (format!("{p}r"), &self.pattern),
            (format!("{p}f"), &self.templated),
            (format!("{p}js"), &self.script),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                args.insert(key, value.clone());
            }
        }
        args.insert(stage.result_key().to_string(), self.result.clone());

        if let Some(whole) = &self.pattern {
            args.insert(format!("{p}g0"), whole.clone());
            for (i, group) in self.positional_groups.iter().enumerate() {
                args.insert(format!("{p}g{}", i + 1), group.clone());
            }
        }
        for (name, value) in &self.named_groups {
            args.insert(name.clone(), value.clone());
        }
    }

    /// Collects this match's arguments into a fresh map
    pub fn args(&self, stage: Stage) -> FormatArgs {
        let mut args = FormatArgs::new();
        self.insert_args(stage, &mut args);
        args
    }
}
