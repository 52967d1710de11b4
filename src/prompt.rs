//! Interactive prompt capability used by the resolver.
//!
//! The resolver only ever asks two kinds of question: pick one of a few
//! options, or pick an executable file. Both may be dismissed, which the
//! resolver treats as cancelling the step in progress.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

/// User interaction injected into [`crate::resolver::CommandResolver`].
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask `question` offering `options`. Returns the chosen option, or
    /// `None` if the prompt was dismissed.
    async fn ask(&self, question: &str, options: &[&str]) -> Option<String>;

    /// Ask the user to select an executable. `None` means cancelled.
    async fn pick_file(&self, title: &str) -> Option<PathBuf>;
}

/// Prompts on the controlling terminal (stderr) via `dialoguer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn ask(&self, question: &str, options: &[&str]) -> Option<String> {
        let question = question.to_owned();
        let options: Vec<String> = options.iter().map(|o| (*o).to_owned()).collect();
        let picked = tokio::task::spawn_blocking(move || {
            dialoguer::Select::new()
                .with_prompt(&question)
                .items(options.as_slice())
                .default(0)
                .interact_opt()
                .map(|idx| idx.and_then(|i| options.get(i).cloned()))
        })
        .await;

        match picked {
            Ok(Ok(choice)) => choice,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "prompt failed, treating as cancelled");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "prompt task failed, treating as cancelled");
                None
            }
        }
    }

    async fn pick_file(&self, title: &str) -> Option<PathBuf> {
        let title = title.to_owned();
        let entered = tokio::task::spawn_blocking(move || {
            dialoguer::Input::<String>::new()
                .with_prompt(format!("{title} (empty to cancel)"))
                .allow_empty(true)
                .interact_text()
        })
        .await;

        match entered {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(PathBuf::from(text.trim())),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "file prompt failed, treating as cancelled");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "file prompt task failed, treating as cancelled");
                None
            }
        }
    }
}

/// Dismisses every prompt. Used when no terminal is attached, so resolution
/// ends with an explicit "no command" instead of blocking.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractivePrompter;

#[async_trait]
impl Prompter for NonInteractivePrompter {
    async fn ask(&self, question: &str, _options: &[&str]) -> Option<String> {
        tracing::warn!(question, "no terminal attached, prompt dismissed");
        None
    }

    async fn pick_file(&self, title: &str) -> Option<PathBuf> {
        tracing::warn!(title, "no terminal attached, file prompt dismissed");
        None
    }
}

/// A scripted reply for [`ScriptedPrompter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedAnswer {
    /// Pick this option.
    Choose(String),
    /// Pick this file.
    File(PathBuf),
    /// Dismiss the prompt.
    Dismiss,
}

/// Replays a fixed list of answers and records every question asked.
/// Once the script runs out, every prompt is dismissed.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<ScriptedAnswer>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    /// Create a prompter that replies with `answers` in order.
    pub fn new(answers: impl IntoIterator<Item = ScriptedAnswer>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions and file-prompt titles seen so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    fn next(&self, question: &str) -> ScriptedAnswer {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(question.to_owned());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .unwrap_or(ScriptedAnswer::Dismiss)
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&self, question: &str, options: &[&str]) -> Option<String> {
        match self.next(question) {
            ScriptedAnswer::Choose(choice) if options.contains(&choice.as_str()) => Some(choice),
            _ => None,
        }
    }

    async fn pick_file(&self, title: &str) -> Option<PathBuf> {
        match self.next(title) {
            ScriptedAnswer::File(path) => Some(path),
            _ => None,
        }
    }
}
