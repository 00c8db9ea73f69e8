// ABOUTME: Line-oriented console: parses operator input and runs it against a SessionHandle.
// ABOUTME: Plain text is chat; slash commands map to the other actions and local views.

use crate::render;
use anyhow::Result;
use tether_core::envelope::Action;
use tether_core::session::SessionHandle;

pub const DEFAULT_LIST_PATH: &str = "/workspace";

pub const HELP: &str = "\
commands:
  <text>          send a chat message (starts a task)
  /run <cmd>      run a shell command in the agent's terminal
  /ls [path]      list files (default /workspace)
  /cat <path>     show a file
  /stop           ask the agent to stop the current task
  /ping           ping the backend
  /status         connection and task summary
  /task           show the current task and its plan
  /reconnect      reconnect after automatic retries gave up
  /quit           disconnect and exit
  /help           this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Send(Action),
    Status,
    Task,
    Reconnect,
    Help,
    Quit,
    Empty,
}

/// Parse one line of operator input
pub fn parse_line(line: &str) -> Result<Input> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Input::Send(Action::Chat {
            content: line.to_string(),
        }));
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    let input = match name {
        "run" => {
            if rest.is_empty() {
                anyhow::bail!("usage: /run <command>");
            }
            Input::Send(Action::Terminal {
                command: rest.to_string(),
            })
        }
        "ls" => Input::Send(Action::ListFiles {
            path: if rest.is_empty() {
                DEFAULT_LIST_PATH.to_string()
            } else {
                rest.to_string()
            },
        }),
        "cat" => {
            if rest.is_empty() {
                anyhow::bail!("usage: /cat <path>");
            }
            Input::Send(Action::ReadFile {
                path: rest.to_string(),
            })
        }
        "stop" => Input::Send(Action::Stop),
        "ping" => Input::Send(Action::Ping),
        "status" => Input::Status,
        "task" => Input::Task,
        "reconnect" => Input::Reconnect,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => anyhow::bail!("unknown command '/{}'; try /help", other),
    };
    Ok(input)
}

/// What the console should do after one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Keep reading; print this first if present
    Continue(Option<String>),
    Quit,
}

/// Run one parsed input. Session errors are reported, not propagated.
pub async fn execute(handle: &SessionHandle, input: Input) -> Outcome {
    let output = match input {
        Input::Empty => None,
        Input::Help => Some(HELP.to_string()),
        Input::Send(action) => {
            let tag = action.tag();
            match handle.send(action).await {
                Ok(()) => None,
                Err(e) => {
                    tracing::debug!(action = tag, error = %e, "Action not sent");
                    Some(format!("! {}", e))
                }
            }
        }
        Input::Status => match handle.snapshot().await {
            Ok(snapshot) => Some(render::render_summary(&snapshot)),
            Err(e) => Some(format!("! {}", e)),
        },
        Input::Task => match handle.snapshot().await {
            Ok(snapshot) => Some(match &snapshot.task {
                Some(task) => render::render_task(task),
                None => "no task yet".to_string(),
            }),
            Err(e) => Some(format!("! {}", e)),
        },
        Input::Reconnect => match handle.connect().await {
            Ok(()) => None,
            Err(e) => Some(format!("! {}", e)),
        },
        Input::Quit => {
            if let Err(e) = handle.disconnect().await {
                tracing::debug!(error = %e, "Session already stopped");
            }
            return Outcome::Quit;
        }
    };
    Outcome::Continue(output)
}
