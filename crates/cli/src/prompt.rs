//! Host key questions on the controlling terminal.

use std::io::{self, BufRead, Write};

use client::Prompter;
use is_terminal::IsTerminal;
use tracing::warn;

/// Asks on stderr and reads answers from stdin.
#[derive(Debug, Default)]
pub(crate) struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn show(&mut self, text: &str) {
        let _ = writeln!(io::stderr(), "{text}");
    }

    fn ask(&mut self, question: &str) -> Option<String> {
        let mut stderr = io::stderr();
        let _ = write!(stderr, "{question} ");
        let _ = stderr.flush();
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(answer.trim().to_owned()),
        }
    }
}

/// Used without a terminal: every unknown host is rejected.
#[derive(Debug, Default)]
pub(crate) struct Unattended;

impl Prompter for Unattended {
    fn show(&mut self, text: &str) {
        warn!("{text}");
    }

    fn ask(&mut self, _question: &str) -> Option<String> {
        warn!("no terminal to confirm host keys, rejecting; use -trustAllHosts to accept them");
        None
    }
}

/// The prompter suited to this process's stdin.
pub(crate) fn for_stdin() -> Box<dyn Prompter> {
    if io::stdin().is_terminal() {
        Box::new(TerminalPrompter)
    } else {
        Box::new(Unattended)
    }
}
