//! Terminal interaction for interactive chains

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Outcome of waiting a bounded time for a line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    Line(String),
    Pending,
    /// Input is exhausted
    Closed,
}

/// Source of user answers
#[async_trait]
pub trait Prompter: Send {
    /// Shows `prompt` and waits for a line, `None` once input is closed
    async fn read_line(&mut self, prompt: &str) -> Option<String>;

    /// Waits at most `timeout` for a line; `prompt` is shown first if given
    async fn poll_line(&mut self, prompt: Option<&str>, timeout: Duration) -> PollResult;

    /// Shows a message without waiting for input
    fn message(&mut self, text: &str);
}

/// Reads answers from stdin and writes prompts to stderr, keeping stdout
/// free for content
pub struct StdinPrompter {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinPrompter {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    fn show(prompt: &str) {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(prompt.as_bytes());
        let _ = stderr.flush();
    }
}

impl Default for StdinPrompter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prompter for StdinPrompter {
    async fn read_line(&mut self, prompt: &str) -> Option<String> {
        Self::show(prompt);
        self.lines.next_line().await.ok().flatten()
    }

    async fn poll_line(&mut self, prompt: Option<&str>, timeout: Duration) -> PollResult {
        if let Some(prompt) = prompt {
            Self::show(prompt);
        }
        match tokio::time::timeout(timeout, self.lines.next_line()).await {
            Ok(Ok(Some(line))) => PollResult::Line(line),
            Ok(_) => PollResult::Closed,
            Err(_) => PollResult::Pending,
        }
    }

    fn message(&mut self, text: &str) {
        Self::show(text);
        Self::show("\n");
    }
}

/// Answers prompts from a fixed list, recording every prompt shown
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    pub prompts: Vec<String>,
    pub messages: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn read_line(&mut self, prompt: &str) -> Option<String> {
        self.prompts.push(prompt.to_string());
        self.answers.pop_front()
    }

    async fn poll_line(&mut self, prompt: Option<&str>, _timeout: Duration) -> PollResult {
        if let Some(prompt) = prompt {
            self.prompts.push(prompt.to_string());
        }
        match self.answers.pop_front() {
            Some(line) => PollResult::Line(line),
            None => PollResult::Closed,
        }
    }

    fn message(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }
}

/// An answer to an interactive prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Accept,
    Reject,
    Edit,
    Inspect,
    SkipChain,
    SkipDoc,
}

impl Choice {
    fn matches(self, answer: &str) -> bool {
        let is_prefix_of = |word: &str| !answer.is_empty() && word.starts_with(answer);
        match self {
            Choice::Accept => is_prefix_of("yes") || is_prefix_of("true") || answer == "1" || answer == "+",
            Choice::Reject => is_prefix_of("no") || is_prefix_of("false") || answer == "0" || answer == "-",
            Choice::Edit => answer == "e" || answer == "edit",
            Choice::Inspect => answer == "i" || answer == "inspect",
            Choice::SkipChain => answer == "c" || answer == "chainskip",
            Choice::SkipDoc => answer == "d" || answer == "docskip",
        }
    }
}

/// Parses an answer; an empty answer accepts
pub fn parse_choice(answer: &str, allowed: &[Choice]) -> Option<Choice> {
    let answer = answer.trim().to_lowercase();
    if answer.is_empty() && allowed.contains(&Choice::Accept) {
        return Some(Choice::Accept);
    }
    allowed.iter().copied().find(|c| c.matches(&answer))
}

/// Parses the answer to a batch prompt, where `skip` or `no` skip the
/// document
pub fn parse_batch_answer(answer: &str) -> Option<Choice> {
    let answer = answer.trim().to_lowercase();
    if answer.is_empty() || Choice::Accept.matches(&answer) {
        Some(Choice::Accept)
    } else if answer == "s" || answer == "skip" || Choice::Reject.matches(&answer) {
        Some(Choice::SkipDoc)
    } else {
        None
    }
}

/// Asks until the answer is one of `allowed`; `None` once input is closed
pub async fn ask(prompter: &mut dyn Prompter, prompt: &str, allowed: &[Choice]) -> Option<Choice> {
    loop {
        let answer = prompter.read_line(prompt).await?;
        match parse_choice(&answer, allowed) {
            Some(choice) => return Some(choice),
            None => prompter.message("please answer with one of the listed options"),
        }
    }
}

/// Reads lines until one contains `escape`; the text before it is returned
pub async fn read_multiline(prompter: &mut dyn Prompter, escape: &str) -> Option<String> {
    let mut text = String::new();
    loop {
        let line = prompter.read_line("").await?;
        if let Some(end) = line.find(escape) {
            text.push_str(&line[..end]);
            if text.ends_with('\n') && end == 0 {
                text.pop();
            }
            return Some(text);
        }
        text.push_str(&line);
        text.push('\n');
    }
}
