use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Uninstall,
    Quit,
    Invalid(char),
}

impl Action {
    pub fn from_key(key: char) -> Self {
        match key.to_ascii_lowercase() {
            'i' => Action::Install,
            'u' => Action::Uninstall,
            'q' => Action::Quit,
            other => Action::Invalid(other),
        }
    }
}

/// The person at the keyboard. Everything destructive goes through
/// [`Operator::confirm`] first.
pub trait Operator {
    fn choose_action(&mut self) -> Result<Action>;
    fn confirm(&mut self, question: &str) -> Result<bool>;
    /// `None` means the operator gave up.
    fn ask_game_root(&mut self) -> Result<Option<PathBuf>>;
}

/// Single-keypress console prompts.
#[derive(Debug, Default)]
pub struct Console;

impl Operator for Console {
    fn choose_action(&mut self) -> Result<Action> {
        let key = read_key()?;
        println!("\n");
        Ok(Action::from_key(key))
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        println!("{question} Enter 'y' or 'n'.");
        let key = read_key()?;
        println!();
        Ok(matches!(key, 'y' | 'Y'))
    }

    fn ask_game_root(&mut self) -> Result<Option<PathBuf>> {
        print!("Enter/paste the path here, or type 'q' to quit: ");
        io::stdout().flush().context("flush stdout")?;
        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read game path")?;
        Ok(parse_path_answer(read, &line))
    }
}

fn parse_path_answer(read: usize, line: &str) -> Option<PathBuf> {
    let answer = line.trim().trim_matches('"');
    if read == 0 || answer.eq_ignore_ascii_case("q") {
        return None;
    }
    Some(PathBuf::from(answer))
}

fn read_key() -> Result<char> {
    enable_raw_mode().context("enable raw mode")?;
    let key = wait_for_char();
    disable_raw_mode().context("disable raw mode")?;
    let key = key.context("read key")?;
    print!("{key}");
    io::stdout().flush().context("flush stdout")?;
    Ok(key)
}

fn wait_for_char() -> io::Result<char> {
    loop {
        if let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event::read()?
        {
            match code {
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return Ok('q'),
                KeyCode::Char(c) => return Ok(c),
                KeyCode::Esc => return Ok('q'),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_actions() {
        assert_eq!(Action::from_key('i'), Action::Install);
        assert_eq!(Action::from_key('U'), Action::Uninstall);
        assert_eq!(Action::from_key('q'), Action::Quit);
        assert_eq!(Action::from_key('x'), Action::Invalid('x'));
    }

    #[test]
    fn path_answers() {
        assert_eq!(parse_path_answer(0, ""), None);
        assert_eq!(parse_path_answer(2, "q\n"), None);
        assert_eq!(
            parse_path_answer(22, "\"D:\\Games\\BG3\"\r\n"),
            Some(PathBuf::from("D:\\Games\\BG3"))
        );
    }
}
