use super::matched::LocatorMatch;
use regex::{Captures, Regex, RegexBuilder};

/// A compiled pattern match step
///
/// Patterns are compiled with `.` matching newlines and `^`/`$` matching at
/// line boundaries. Without multimatch the pattern must match at the very
/// start of the input.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    source: String,
    regex: Regex,
    anchored: Regex,
    group_names: Vec<Option<String>>,
    pub multimatch: bool,
}

struct GroupValues {
    whole: String,
    positional: Vec<String>,
    named: Vec<(String, String)>,
}

impl PatternMatch {
    pub fn parse(source: &str, multimatch: bool) -> Result<Self, String> {
        let build = |pattern: &str| {
            RegexBuilder::new(pattern)
                .dot_matches_new_line(true)
                .multi_line(true)
                .build()
        };
        let regex = build(source).map_err(|e| format!("invalid pattern: {}", e))?;
        let anchored =
            build(&format!(r"\A(?:{})", source)).map_err(|e| format!("invalid pattern: {}", e))?;
        let group_names = regex
            .capture_names()
            .skip(1)
            .map(|name| name.map(str::to_string))
            .collect();
        Ok(Self {
            source: source.to_string(),
            regex,
            anchored,
            group_names,
            multimatch,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the named capture groups, in pattern order
    pub fn named_groups(&self) -> impl Iterator<Item = &str> {
        self.group_names.iter().filter_map(|n| n.as_deref())
    }

    /// Number of capture groups, excluding the whole match
    pub fn group_count(&self) -> usize {
        self.group_names.len()
    }

    /// Runs the step; with multimatch every match after the first clones the
    /// accumulator
    pub fn apply(&self, inputs: Vec<LocatorMatch>) -> Vec<LocatorMatch> {
        let mut out = Vec::new();
        for lm in inputs {
            if !self.multimatch {
                let found = self.anchored.captures(&lm.result).map(|c| self.groups(&c));
                if let Some(found) = found {
                    out.push(record(lm, found));
                }
                continue;
            }
            let found: Vec<GroupValues> = self
                .regex
                .captures_iter(&lm.result)
                .map(|c| self.groups(&c))
                .collect();
            let mut pending = Some(lm);
            let mut template = None;
            for values in found {
                let base = match pending.take() {
                    Some(first) => {
                        template = Some(first.clone());
                        first
                    }
                    None => match &template {
                        Some(t) => t.clone(),
                        None => continue,
                    },
                };
                out.push(record(base, values));
            }
        }
        out
    }

    fn groups(&self, caps: &Captures<'_>) -> GroupValues {
        let text = |i: usize| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default();
        let whole = text(0);
        let positional = (1..=self.group_names.len()).map(text).collect();
        let named = self
            .group_names
            .iter()
            .filter_map(|name| name.as_ref())
            .map(|name| {
                let value = caps
                    .name(name)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                (name.clone(), value)
            })
            .collect();
        GroupValues {
            whole,
            positional,
            named,
        }
    }
}

fn record(mut lm: LocatorMatch, values: GroupValues) -> LocatorMatch {
    lm.result = values.whole.clone();
    lm.pattern = Some(values.whole);
    lm.positional_groups = values.positional;
    lm.named_groups = values.named;
    lm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multimatch_fans_out() {
        let pattern = PatternMatch::parse(r"\d+", true).unwrap();
        let out = pattern.apply(vec![LocatorMatch::new("a1 b22 c333")]);
        let results: Vec<&str> = out.iter().map(|m| m.result.as_str()).collect();
        assert_eq!(results, vec!["1", "22", "333"]);
    }

    #[test]
    fn test_single_match_is_anchored() {
        let pattern = PatternMatch::parse(r"\d+", false).unwrap();
        assert!(pattern.apply(vec![LocatorMatch::new("a1")]).is_empty());

        let out = pattern.apply(vec![LocatorMatch::new("12 34")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].result, "12");
    }

    #[test]
    fn test_groups_recorded() {
        let pattern = PatternMatch::parse(r"(?P<key>\w+)=(\w+)", true).unwrap();
        let out = pattern.apply(vec![LocatorMatch::new("a=1, b=2")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].pattern.as_deref(), Some("b=2"));
        assert_eq!(out[1].positional_groups, vec!["b", "2"]);
        assert_eq!(out[1].named_groups, vec![("key".to_string(), "b".to_string())]);
    }

    #[test]
    fn test_unmatched_optional_group_is_empty() {
        let pattern = PatternMatch::parse(r"a(x)?b", true).unwrap();
        let out = pattern.apply(vec![LocatorMatch::new("ab")]);
        assert_eq!(out[0].positional_groups, vec![""]);
    }

    #[test]
    fn test_no_match_drops_input() {
        let pattern = PatternMatch::parse("zzz", true).unwrap();
        assert!(pattern.apply(vec![LocatorMatch::new("abc")]).is_empty());
    }

    #[test]
    fn test_dot_matches_newline() {
        let pattern = PatternMatch::parse("a.b", false).unwrap();
        assert_eq!(pattern.apply(vec![LocatorMatch::new("a\nb")]).len(), 1);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(PatternMatch::parse("(unclosed", true).is_err());
    }

    #[test]
    fn test_clones_keep_earlier_fields() {
        let pattern = PatternMatch::parse("o", true).unwrap();
        let mut seed = LocatorMatch::new("foo");
        seed.structural = Some("foo".to_string());
        let out = pattern.apply(vec![seed]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|m| m.structural.as_deref() == Some("foo")));
    }
}
