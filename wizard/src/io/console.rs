//! Operator console abstraction.
//!
//! Every question returns `None` when the operator cancels (end of input or
//! an empty answer to a menu). Cancellation always means "go back", never
//! "abort the process".

use std::io::{self, BufRead, Write};

use tracing::warn;

pub trait Console {
    /// Print informational text to the operator.
    fn say(&mut self, message: &str);

    /// Pick one of `choices`, returning its index.
    fn select(&mut self, question: &str, choices: &[String]) -> Option<usize>;

    /// Free-text answer. An empty string is a valid answer (use the default).
    fn text(&mut self, question: &str) -> Option<String>;

    /// Free-text answer for a credential.
    fn password(&mut self, question: &str) -> Option<String>;

    fn confirm(&mut self, question: &str) -> Option<bool>;
}

/// Line-oriented console over any reader/writer pair.
pub struct TerminalConsole<R, W> {
    input: R,
    output: W,
}

impl TerminalConsole<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn write(&mut self, text: &str) {
        if let Err(err) = self
            .output
            .write_all(text.as_bytes())
            .and_then(|()| self.output.flush())
        {
            warn!(err = %err, "console write failed");
        }
    }

    /// Read one line without its terminator; `None` at end of input.
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(err) => {
                warn!(err = %err, "console read failed");
                None
            }
        }
    }
}

impl<R: BufRead, W: Write> Console for TerminalConsole<R, W> {
    fn say(&mut self, message: &str) {
        self.write(&format!("{message}\n"));
    }

    fn select(&mut self, question: &str, choices: &[String]) -> Option<usize> {
        let mut prompt = format!("{question}\n");
        for (index, choice) in choices.iter().enumerate() {
            prompt.push_str(&format!("  [{}] {}\n", index + 1, choice));
        }
        loop {
            self.write(&prompt);
            self.write("Choice (empty to go back): ");
            let answer = self.read_line()?;
            let answer = answer.trim();
            if answer.is_empty() {
                return None;
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=choices.len()).contains(&n) => return Some(n - 1),
                _ => self.write(&format!(
                    "Please enter a number between 1 and {}.\n",
                    choices.len()
                )),
            }
        }
    }

    fn text(&mut self, question: &str) -> Option<String> {
        self.write(&format!("{question} "));
        self.read_line().map(|line| line.trim().to_string())
    }

    fn password(&mut self, question: &str) -> Option<String> {
        self.text(question)
    }

    fn confirm(&mut self, question: &str) -> Option<bool> {
        loop {
            self.write(&format!("{question} [y/n] "));
            let answer = self.read_line()?;
            match answer.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return Some(true),
                "n" | "no" => return Some(false),
                "" => return None,
                _ => self.write("Please answer y or n.\n"),
            }
        }
    }
}
