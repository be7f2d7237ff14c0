use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::engine::{EngineEvent, UserIntent};
use crate::presentation::{Presenter, SessionView};
use crate::prompts::{ActionId, UnknownAction};

const HELP: &str = "commands: a=accept+paste  c=copy  d=dismiss  r=retry  \
s <improve|formal|casual|short|reword>  p <instruction>  reload  q=quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Intent(UserIntent),
    Reload,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
    #[error(transparent)]
    Action(#[from] UnknownAction),
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, CommandError> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "" => return Err(CommandError::Empty),
        "a" | "accept" => ConsoleCommand::Intent(UserIntent::Accept { paste_also: true }),
        "c" | "copy" => ConsoleCommand::Intent(UserIntent::Accept { paste_also: false }),
        "d" | "dismiss" => ConsoleCommand::Intent(UserIntent::Dismiss),
        "r" | "retry" => ConsoleCommand::Intent(UserIntent::Retry),
        "s" | "switch" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("switch"));
            }
            ConsoleCommand::Intent(UserIntent::SwitchAction(rest.parse::<ActionId>()?))
        }
        "p" | "prompt" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("prompt"));
            }
            ConsoleCommand::Intent(UserIntent::CustomInstruction(rest.to_string()))
        }
        "reload" => ConsoleCommand::Reload,
        "q" | "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };

    Ok(command)
}

/// Prints sessions to stdout.
#[derive(Debug, Default)]
pub struct ConsolePresenter;

impl ConsolePresenter {
    fn emit(&self, text: &str) {
        let mut stdout = io::stdout().lock();
        if writeln!(stdout, "{text}").and_then(|()| stdout.flush()).is_err() {
            debug!("stdout closed, dropping presenter output");
        }
    }
}

impl Presenter for ConsolePresenter {
    fn open(&mut self, view: SessionView) {
        let body = match &view.result {
            Some(result) => result.clone(),
            None => format!("⏳ {}...", view.progress_label),
        };
        self.emit(&format!(
            "\n── ClipAid [{}] ──\noriginal: {}\n\n{}\n\n{HELP}",
            view.action, view.original_text, body
        ));
    }

    fn update_result(&mut self, text: &str, still_working: bool) {
        if still_working {
            self.emit(text);
        } else {
            self.emit(&format!("\n{text}\n"));
        }
    }

    fn close(&mut self) {
        self.emit("── closed ──");
    }

    fn notify_failure(&mut self, message: &str) {
        self.emit(message);
    }
}

/// Reads commands from stdin on a dedicated thread until quit or EOF.
pub fn spawn_stdin_reader(
    events: mpsc::UnboundedSender<EngineEvent>,
    settings_path: PathBuf,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("clipaid-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("failed to read stdin: {err}");
                        break;
                    }
                };

                let event = match parse_command(&line) {
                    Ok(ConsoleCommand::Intent(intent)) => EngineEvent::User(intent),
                    Ok(ConsoleCommand::Reload) => match Settings::load(&settings_path) {
                        Ok(settings) => {
                            info!(path = %settings_path.display(), "settings reloaded");
                            EngineEvent::SettingsChanged(settings)
                        }
                        Err(err) => {
                            warn!("settings reload failed: {err}");
                            continue;
                        }
                    },
                    Ok(ConsoleCommand::Quit) => EngineEvent::Shutdown,
                    Err(CommandError::Empty) => continue,
                    Err(err) => {
                        eprintln!("{err}\n{HELP}");
                        continue;
                    }
                };

                let quitting = matches!(event, EngineEvent::Shutdown);
                if events.send(event).is_err() || quitting {
                    break;
                }
            }
            debug!("stdin reader exiting");
        })
}
