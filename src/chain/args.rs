//! Template argument names known at each point of a chain

use crate::locator::{FormatArgs, Locator, MatchStep, Stage, CONTENT_KEY};
use std::collections::BTreeSet;

/// Arguments available everywhere; `ci` only once matches are accepted
pub const GENERAL_KEYS: &[&str] = &["chain", "di", "dl", "denc", "cesc"];

pub const FILENAME_KEYS: &[&str] = &["fn", "fb", "fe"];

/// Keys exposed by any document locator match
pub const DOCUMENT_KEYS: &[&str] = &["dx", "dr", "df", "djs", "d"];

pub fn general_keys(with_ci: bool) -> BTreeSet<String> {
    let mut keys: BTreeSet<String> = GENERAL_KEYS.iter().map(|k| k.to_string()).collect();
    if with_ci {
        keys.insert("ci".to_string());
    }
    keys
}

/// Keys a locator's steps before `upto` expose, plus its result key
///
/// With `upto = None` all steps count, including the template.
pub fn stage_keys(locator: &Locator, upto: Option<usize>) -> BTreeSet<String> {
    let p = locator.stage.prefix();
    let mut keys = BTreeSet::new();
    keys.insert(locator.stage.result_key().to_string());

    let steps = match upto {
        Some(n) => &locator.steps()[..n.min(locator.steps().len())],
        None => locator.steps(),
    };
    for step in steps {
        match step {
            MatchStep::Structural(_) => {
                keys.insert(format!("{p}x"));
            }
            MatchStep::Pattern(pattern) => {
                keys.insert(format!("{p}r"));
                for i in 0..=pattern.group_count() {
                    keys.insert(format!("{p}g{i}"));
                }
                keys.extend(pattern.named_groups().map(str::to_string));
            }
            MatchStep::Script(_) => {
                keys.insert(format!("{p}js"));
            }
            MatchStep::Template(_) => {
                keys.insert(format!("{p}f"));
            }
        }
    }
    keys
}

/// Keys a content or label template may use
pub fn match_format_keys(content: &Locator, label: &Locator, document: &Locator) -> BTreeSet<String> {
    let mut keys = general_keys(true);
    keys.extend(DOCUMENT_KEYS.iter().map(|k| k.to_string()));
    keys.extend(stage_keys(document, None));
    keys.extend(stage_keys(content, None));
    keys.extend(stage_keys(label, None));
    keys
}

/// Keys an output format may use
pub fn output_format_keys(
    base: &BTreeSet<String>,
    has_label: bool,
    with_content: bool,
    with_filename: bool,
) -> BTreeSet<String> {
    let mut keys = base.clone();
    if has_label {
        keys.insert(Stage::Label.result_key().to_string());
    }
    if with_content {
        keys.insert(CONTENT_KEY.to_string());
    }
    if with_filename {
        keys.extend(FILENAME_KEYS.iter().map(|k| k.to_string()));
    }
    keys
}

/// Inserts `fn`, `fb` and `fe` for a filename
pub fn insert_filename_args(filename: &str, args: &mut FormatArgs) {
    let (base, ext) = split_extension(filename);
    args.insert("fn".to_string(), filename.to_string());
    args.insert("fb".to_string(), base.to_string());
    args.insert("fe".to_string(), ext.to_string());
}

/// Splits a filename into base and extension, the extension keeping its dot
fn split_extension(filename: &str) -> (&str, &str) {
    let name_start = filename.rfind('/').map_or(0, |i| i + 1);
    let name = &filename[name_start..];
    let leading_dots = name.len() - name.trim_start_matches('.').len();
    match name[leading_dots..].rfind('.') {
        Some(i) => filename.split_at(name_start + leading_dots + i),
        None => (filename, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::{PatternMatch, StructuralQuery, Template};
    use rstest::rstest;

    #[rstest]
    #[case("a.tar.gz", "a.tar", ".gz")]
    #[case("file", "file", "")]
    #[case(".bashrc", ".bashrc", "")]
    #[case("dir.d/file", "dir.d/file", "")]
    #[case("x.pdf", "x", ".pdf")]
    fn test_split_extension(#[case] name: &str, #[case] base: &str, #[case] ext: &str) {
        assert_eq!(split_extension(name), (base, ext));
    }

    #[test]
    fn test_stage_keys() {
        let mut locator = Locator::new(Stage::Content);
        locator.push(MatchStep::Structural(StructuralQuery::parse("a", 0, true).unwrap()));
        locator.push(MatchStep::Pattern(
            PatternMatch::parse(r"(?P<year>\d+)-(\d+)", true).unwrap(),
        ));
        locator.push(MatchStep::Template(Template::parse("{year}").unwrap()));

        let before_pattern = stage_keys(&locator, Some(1));
        assert!(before_pattern.contains("cx"));
        assert!(!before_pattern.contains("cr"));

        let all = stage_keys(&locator, None);
        for key in ["cx", "cr", "cg0", "cg1", "cg2", "year", "cf", "cm"] {
            assert!(all.contains(key), "missing {}", key);
        }
    }

    #[test]
    fn test_filename_args() {
        let mut args = FormatArgs::new();
        insert_filename_args("report.pdf", &mut args);
        assert_eq!(args["fn"], "report.pdf");
        assert_eq!(args["fb"], "report");
        assert_eq!(args["fe"], ".pdf");
    }
}
