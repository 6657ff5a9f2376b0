//! Streaming output formatters
//!
//! A formatter walks a parsed template. Every token except the raw content
//! placeholder is resolved eagerly; at a content placeholder the formatter
//! stops and takes the content chunk by chunk, so content is never buffered
//! in full. A template with several content placeholders needs one pass over
//! the content per placeholder.

use super::output::{OrderedOutput, Ticket};
use crate::locator::{pad, FormatArgs, Template, Token, CONTENT_KEY};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Where formatted output goes
pub enum OutputTarget {
    /// The ordered stdout stream
    Print {
        output: Arc<OrderedOutput>,
        ticket: Ticket,
        bounded: bool,
    },
    File { file: File, path: PathBuf },
    /// Collected in memory, for forwarding to other chains
    Collect(Vec<u8>),
}

impl OutputTarget {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        match self {
            OutputTarget::Print {
                output,
                ticket,
                bounded: true,
            } => output.print(*ticket, data).await,
            OutputTarget::Print {
                output,
                ticket,
                bounded: false,
            } => output.print_unbounded(*ticket, data).await,
            OutputTarget::File { file, .. } => file.write_all(data).await,
            OutputTarget::Collect(buffer) => {
                buffer.extend_from_slice(data);
                Ok(())
            }
        }
    }

    async fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputTarget::Print { output, ticket, .. } => output.flush(*ticket),
            OutputTarget::File { file, .. } => file.flush().await,
            OutputTarget::Collect(_) => Ok(()),
        }
    }
}

pub struct OutputFormatter {
    tokens: Vec<Token>,
    args: FormatArgs,
    position: usize,
    target: OutputTarget,
}

impl OutputFormatter {
    pub fn new(template: &Template, args: FormatArgs, target: OutputTarget) -> Self {
        Self {
            tokens: template.tokens().to_vec(),
            args,
            position: 0,
            target,
        }
    }

    fn at_content(&self) -> bool {
        matches!(
            self.tokens.get(self.position),
            Some(Token::Placeholder { key, .. }) if key == CONTENT_KEY
        )
    }

    /// Writes everything up to the next content placeholder
    ///
    /// Returns `true` when the formatter waits for content, `false` once the
    /// template is exhausted.
    pub async fn advance(&mut self) -> io::Result<bool> {
        while let Some(token) = self.tokens.get(self.position) {
            let text = match token {
                Token::Placeholder { key, .. } if key == CONTENT_KEY => return Ok(true),
                Token::Literal(text) => text.clone(),
                Token::Placeholder {
                    key,
                    width,
                    zero_pad,
                } => pad(
                    self.args.get(key).map(String::as_str).unwrap_or(""),
                    *width,
                    *zero_pad,
                ),
            };
            self.target.write(text.as_bytes()).await?;
            self.position += 1;
        }
        self.target.flush().await?;
        Ok(false)
    }

    /// Writes a content chunk at the current placeholder
    pub async fn write_content(&mut self, chunk: &[u8]) -> io::Result<()> {
        debug_assert!(self.at_content());
        self.target.write(chunk).await
    }

    /// Moves past the content placeholder once the content is complete
    pub fn end_content(&mut self) {
        if self.at_content() {
            self.position += 1;
        }
    }

    pub fn target(&self) -> &OutputTarget {
        &self.target
    }

    pub fn into_target(self) -> OutputTarget {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collected(formatter: OutputFormatter) -> String {
        match formatter.into_target() {
            OutputTarget::Collect(buffer) => String::from_utf8(buffer).unwrap(),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_streams_content_in_place() {
        let template = Template::parse("[{ci:02}] {c}!\n").unwrap();
        let mut args = FormatArgs::new();
        args.insert("ci".to_string(), "3".to_string());
        let mut f = OutputFormatter::new(&template, args, OutputTarget::Collect(Vec::new()));

        assert!(f.advance().await.unwrap());
        f.write_content(b"hel").await.unwrap();
        f.write_content(b"lo").await.unwrap();
        f.end_content();
        assert!(!f.advance().await.unwrap());
        assert_eq!(collected(f), "[03] hello!\n");
    }

    #[tokio::test]
    async fn test_two_content_placeholders_need_two_passes() {
        let template = Template::parse("{c}|{c}").unwrap();
        let mut f = OutputFormatter::new(&template, FormatArgs::new(), OutputTarget::Collect(Vec::new()));

        let mut passes = 0;
        while f.advance().await.unwrap() {
            f.write_content(b"x").await.unwrap();
            f.end_content();
            passes += 1;
        }
        assert_eq!(passes, 2);
        assert_eq!(collected(f), "x|x");
    }

    #[tokio::test]
    async fn test_without_content() {
        let template = Template::parse("{fn}\n").unwrap();
        let mut args = FormatArgs::new();
        args.insert("fn".to_string(), "a.txt".to_string());
        let mut f = OutputFormatter::new(&template, args, OutputTarget::Collect(Vec::new()));
        assert!(!f.advance().await.unwrap());
        assert_eq!(collected(f), "a.txt\n");
    }
}
