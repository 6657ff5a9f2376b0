//! Placeholder mini-language used by every format string
//!
//! A template is a sequence of literal text and `{key}` placeholders.
//! Placeholders may carry a width spec, `{ci:03}` pads with zeros, `{chain:2}`
//! pads with spaces on the left. Literal braces are written `{{` and `}}`.
//! Templates are parsed once at setup and rendered many times.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Argument values available to a template, keyed by placeholder name
pub type FormatArgs = BTreeMap<String, String>;

/// Key of the raw content placeholder that output formatters stream
pub const CONTENT_KEY: &str = "c";

/// Errors produced while parsing a template
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unmatched '{{' at offset {0}")]
    UnclosedPlaceholder(usize),

    #[error("single '}}' encountered at offset {0}")]
    StrayClosingBrace(usize),

    #[error("empty placeholder at offset {0}")]
    EmptyPlaceholder(usize),

    #[error("invalid format spec '{0}'")]
    InvalidSpec(String),
}

/// A parsed template token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Placeholder {
        key: String,
        width: usize,
        zero_pad: bool,
    },
}

/// A parsed format string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    tokens: Vec<Token>,
}

impl Template {
    /// Parses a format string into literal and placeholder tokens
    ///
    /// # Examples
    ///
    /// ```
    /// use chainscrape::locator::{FormatArgs, Template};
    ///
    /// let template = Template::parse("item {ci:02}: {c}").unwrap();
    /// let mut args = FormatArgs::new();
    /// args.insert("ci".to_string(), "7".to_string());
    /// args.insert("c".to_string(), "foo".to_string());
    /// assert_eq!(template.render(&args), "item 07: foo");
    /// ```
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            match ch {
                '{' => {
                    if matches!(chars.peek(), Some((_, '{'))) {
                        chars.next();
                        literal.push('{');
                        continue;
                    }
                    let mut inner = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err(TemplateError::UnclosedPlaceholder(offset));
                    }
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(parse_placeholder(&inner, offset)?);
                }
                '}' => {
                    if matches!(chars.peek(), Some((_, '}'))) {
                        chars.next();
                        literal.push('}');
                    } else {
                        return Err(TemplateError::StrayClosingBrace(offset));
                    }
                }
                _ => literal.push(ch),
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            tokens,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Iterates over the placeholder keys in order of appearance
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            Token::Placeholder { key, .. } => Some(key.as_str()),
            Token::Literal(_) => None,
        })
    }

    /// Number of placeholders referring to any of the given keys
    pub fn count_keys(&self, names: &[&str]) -> usize {
        self.keys().filter(|k| names.contains(k)).count()
    }

    pub fn references(&self, name: &str) -> bool {
        self.keys().any(|k| k == name)
    }

    /// Checks every placeholder against the set of keys known at this point
    pub fn validate(&self, known: &BTreeSet<String>) -> Result<(), String> {
        for key in self.keys() {
            if !known.contains(key) {
                return Err(format!("unavailable key '{{{}}}'", key));
            }
        }
        Ok(())
    }

    /// Renders the template; missing keys render as empty strings
    pub fn render(&self, args: &FormatArgs) -> String {
        let mut out = String::with_capacity(self.source.len());
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Placeholder {
                    key,
                    width,
                    zero_pad,
                } => {
                    let value = args.get(key).map(String::as_str).unwrap_or("");
                    out.push_str(&pad(value, *width, *zero_pad));
                }
            }
        }
        out
    }
}

fn parse_placeholder(inner: &str, offset: usize) -> Result<Token, TemplateError> {
    let (key, spec) = match inner.split_once(':') {
        Some((key, spec)) => (key, Some(spec)),
        None => (inner, None),
    };
    if key.is_empty() {
        return Err(TemplateError::EmptyPlaceholder(offset));
    }
    let (width, zero_pad) = match spec {
        None => (0, false),
        Some(spec) => {
            let zero_pad = spec.starts_with('0') && spec.len() > 1;
            let digits = if zero_pad { &spec[1..] } else { spec };
            let width = digits
                .parse::<usize>()
                .map_err(|_| TemplateError::InvalidSpec(spec.to_string()))?;
            (width, zero_pad)
        }
    };
    Ok(Token::Placeholder {
        key: key.to_string(),
        width,
        zero_pad,
    })
}

/// Left-pads a value to `width` characters
pub fn pad(value: &str, width: usize, zero_pad: bool) -> String {
    let len = value.chars().count();
    if len >= width {
        return value.to_string();
    }
    let fill = if zero_pad { '0' } else { ' ' };
    let mut out: String = std::iter::repeat(fill).take(width - len).collect();
    out.push_str(value);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> FormatArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_literal_and_placeholders() {
        let template = Template::parse("a{cx}b{ci}").unwrap();
        assert_eq!(template.tokens().len(), 4);
        assert_eq!(template.keys().collect::<Vec<_>>(), vec!["cx", "ci"]);
    }

    #[test]
    fn test_escaped_braces() {
        let template = Template::parse("{{literal}} {c}").unwrap();
        assert_eq!(template.render(&args(&[("c", "x")])), "{literal} x");
    }

    #[test]
    fn test_zero_padding() {
        let template = Template::parse("dl_{di:03}_{ci:2}").unwrap();
        assert_eq!(
            template.render(&args(&[("di", "4"), ("ci", "5")])),
            "dl_004_ 5"
        );
    }

    #[test]
    fn test_unclosed_placeholder() {
        assert_eq!(
            Template::parse("foo {bar").unwrap_err(),
            TemplateError::UnclosedPlaceholder(4)
        );
    }

    #[test]
    fn test_stray_closing_brace() {
        assert!(matches!(
            Template::parse("foo } bar"),
            Err(TemplateError::StrayClosingBrace(4))
        ));
    }

    #[test]
    fn test_invalid_spec() {
        assert!(matches!(
            Template::parse("{ci:x}"),
            Err(TemplateError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_validate_unknown_key() {
        let template = Template::parse("{cx} {nope}").unwrap();
        let known: BTreeSet<String> = ["cx".to_string()].into_iter().collect();
        let err = template.validate(&known).unwrap_err();
        assert_eq!(err, "unavailable key '{nope}'");
    }

    #[test]
    fn test_count_keys() {
        let template = Template::parse("{c}{fn}{c}{l}").unwrap();
        assert_eq!(template.count_keys(&["c"]), 2);
        assert_eq!(template.count_keys(&["fn", "fb", "fe"]), 1);
        assert!(template.references("l"));
    }

    #[test]
    fn test_missing_key_renders_empty() {
        let template = Template::parse("[{x}]").unwrap();
        assert_eq!(template.render(&FormatArgs::new()), "[]");
    }
}
