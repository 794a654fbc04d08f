use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::io::{self, Write};

/// Interactive question capability. Interactive and scripted modes share one
/// code path; callers re-prompt on answers they cannot use.
pub trait Prompt {
    fn ask(&mut self, question: &str) -> Result<String>;
}

/// Prompt backed by standard input.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        print!("{}", question);
        io::stdout().flush().context("Failed to flush stdout")?;

        let mut answer = String::new();
        io::stdin()
            .read_line(&mut answer)
            .context("Failed to read answer from stdin")?;
        Ok(answer.trim().to_string())
    }
}

/// Prompt that replays a fixed list of answers. Used by tests and scripted
/// runs; an exhausted script is an error rather than a hang.
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
        }
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        self.answers
            .pop_front()
            .with_context(|| format!("No scripted answer left for: {}", question))
    }
}
