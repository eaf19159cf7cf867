use std::io::{BufRead, Write};
use tracing::warn;

/// Go/no-go decisions asked of the operator
#[cfg_attr(test, mockall::automock)]
pub trait OperatorPrompt: Send + Sync {
    /// Ask a yes/no question; `true` means go ahead
    fn confirm(&self, question: &str) -> bool;
}

/// Asks on the terminal; anything but an explicit yes declines
pub struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
    fn confirm(&self, question: &str) -> bool {
        let mut stdout = std::io::stdout();
        if write!(stdout, "{} [y/N] ", question).and_then(|_| stdout.flush()).is_err() {
            return false;
        }

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(e) => {
                warn!("Cannot read answer from stdin: {}", e);
                false
            }
        }
    }
}

/// Never asks and always declines
pub struct UnattendedPrompt;

impl OperatorPrompt for UnattendedPrompt {
    fn confirm(&self, question: &str) -> bool {
        warn!("Unattended mode, declining: {}", question);
        false
    }
}

/// Pick the prompt for the current run mode
pub fn operator_prompt(unattended: bool) -> Box<dyn OperatorPrompt> {
    if unattended {
        Box::new(UnattendedPrompt)
    } else {
        Box::new(StdinPrompt)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
