use super::matched::{LocatorMatch, Stage};
use super::template::FormatArgs;
use crate::crawler::{RenderedSession, SessionError};
use crate::ScrapeError;
use serde_json::Value;

/// A script step executed inside the rendered document
///
/// The template arguments known at this point of the chain are passed as call
/// arguments and bound to constants of the same name by a generated prelude.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    source: String,
    arg_names: Vec<String>,
    pub multimatch: bool,
}

impl ScriptStep {
    pub fn new(source: &str, multimatch: bool) -> Self {
        Self {
            source: source.to_string(),
            arg_names: Vec::new(),
            multimatch,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Fixes the argument names passed to every invocation
    pub fn bind_args(&mut self, names: impl IntoIterator<Item = String>) {
        self.arg_names = names.into_iter().filter(|n| is_identifier(n)).collect();
    }

    pub fn arg_names(&self) -> &[String] {
        &self.arg_names
    }

    /// Script body with the argument prelude prepended
    pub fn body(&self) -> String {
        let mut body = String::new();
        for (i, name) in self.arg_names.iter().enumerate() {
            body.push_str(&format!("const {} = arguments[{}];\n", name, i));
        }
        body.push_str(&self.source);
        body
    }

    /// Runs the script once per input match
    ///
    /// `null` results drop the match, arrays fan out. A script exception only
    /// drops the offending match; a dead session aborts the pipeline.
    pub async fn apply(
        &self,
        inputs: Vec<LocatorMatch>,
        session: &dyn RenderedSession,
        base_args: &FormatArgs,
        stage: Stage,
        doc_path: &str,
    ) -> Result<Vec<LocatorMatch>, ScrapeError> {
        let body = self.body();
        let mut out = Vec::new();

        for lm in inputs {
            let mut args = base_args.clone();
            lm.insert_args(stage, &mut args);
            let values = self
                .arg_names
                .iter()
                .map(|name| Value::String(args.get(name).cloned().unwrap_or_default()))
                .collect();

            let result = match session.execute_script(&body, values).await {
                Ok(result) => result,
                Err(SessionError::Died) => return Err(ScrapeError::SessionDied),
                Err(SessionError::Script(message)) => {
                    tracing::warn!(
                        "{} script: exception on {}: {}",
                        stage.name(),
                        doc_path,
                        message
                    );
                    continue;
                }
                Err(e) => {
                    if !session.is_alive().await {
                        return Err(ScrapeError::SessionDied);
                    }
                    tracing::warn!("{} script failed on {}: {}", stage.name(), doc_path, e);
                    continue;
                }
            };

            let results = match result {
                Value::Null => continue,
                Value::Array(items) => items.into_iter().map(stringify).collect(),
                other => vec![stringify(other)],
            };
            let results: Vec<String> = if self.multimatch {
                results
            } else {
                results.into_iter().take(1).collect()
            };

            let mut pending = Some(lm);
            let mut template = None;
            for value in results {
                let mut m = match pending.take() {
                    Some(first) => {
                        template = Some(first.clone());
                        first
                    }
                    None => match &template {
                        Some(t) => t.clone(),
                        None => continue,
                    },
                };
                m.script = Some(value.clone());
                m.result = value;
                out.push(m);
            }
        }
        Ok(out)
    }
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
