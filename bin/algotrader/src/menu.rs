use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Exit,
    Execute,
    Backtest,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Exit, Action::Execute, Action::Backtest];

    pub fn label(&self) -> &'static str {
        match self {
            Action::Exit => "Exit",
            Action::Execute => "Execute",
            Action::Backtest => "Backtest",
        }
    }
}

/// Zero-based choice from a 1-based menu answer. A blank answer takes
/// `default`; anything else out of range is `None`.
pub fn parse_selection(input: &str, options: usize, default: Option<usize>) -> Option<usize> {
    let input = input.trim();
    if input.is_empty() {
        return default.filter(|d| *d < options);
    }
    match input.parse::<usize>() {
        Ok(n) if (1..=options).contains(&n) => Some(n - 1),
        _ => None,
    }
}

/// Whether a line typed during execution asks to return to the menu.
pub fn is_stop_command(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "q" | "quit" | "stop")
}

pub fn render(title: &str, options: &[String], default: Option<usize>) -> String {
    let mut out = format!("\n{title}\n");
    for (i, option) in options.iter().enumerate() {
        let marker = if Some(i) == default { " (default)" } else { "" };
        out.push_str(&format!("  {}. {option}{marker}\n", i + 1));
    }
    out.push_str("> ");
    out
}

/// Line-oriented stdin shared by the menu and the running session.
pub struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// `None` once stdin is closed.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.next_line().await
    }

    /// Ask until a valid option is chosen. `None` once stdin is closed.
    pub async fn choose(
        &mut self,
        title: &str,
        options: &[String],
        default: Option<usize>,
    ) -> std::io::Result<Option<usize>> {
        loop {
            print!("{}", render(title, options, default));
            std::io::stdout().flush()?;

            let Some(line) = self.next_line().await? else {
                return Ok(None);
            };
            match parse_selection(&line, options.len(), default) {
                Some(choice) => return Ok(Some(choice)),
                None => println!("Invalid selection '{}'", line.trim()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_takes_default() {
        assert_eq!(parse_selection("", 3, Some(1)), Some(1));
        assert_eq!(parse_selection("  ", 3, None), None);
        assert_eq!(parse_selection("", 0, Some(0)), None);
    }

    #[test]
    fn numbers_are_one_based() {
        assert_eq!(parse_selection("1", 3, None), Some(0));
        assert_eq!(parse_selection(" 3 ", 3, None), Some(2));
        assert_eq!(parse_selection("0", 3, None), None);
        assert_eq!(parse_selection("4", 3, None), None);
        assert_eq!(parse_selection("two", 3, Some(0)), None);
        assert_eq!(parse_selection("-1", 3, None), None);
    }

    #[test]
    fn stop_commands() {
        assert!(is_stop_command("q"));
        assert!(is_stop_command(" STOP \n"));
        assert!(!is_stop_command(""));
        assert!(!is_stop_command("start"));
    }

    #[test]
    fn render_marks_default() {
        let options: Vec<String> = Action::ALL.iter().map(|a| a.label().to_string()).collect();
        let text = render("Action", &options, Some(1));
        assert!(text.contains("  1. Exit\n"));
        assert!(text.contains("  2. Execute (default)\n"));
    }
}
