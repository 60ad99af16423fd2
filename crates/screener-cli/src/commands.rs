/// Result of processing a slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Display a message to the user.
    Message(String),
    /// Quit the application.
    Quit,
    /// Move to the parent turn.
    Back,
    /// Move to the newest child turn.
    Forward,
    /// Ask the current turn's question differently, forking from its parent.
    Edit(String),
    /// List the current turn and its siblings.
    ListBranches,
    /// Switch to the n-th sibling (1-based).
    SwitchBranch(usize),
    /// Re-send the current turn if it has no answer.
    Retry,
    /// Copy the current answer to the clipboard.
    Copy,
    /// Save the session now.
    Save,
    /// Check that the Ollama server answers.
    Ping,
    /// List models installed on the Ollama server.
    ListModels,
    /// Change the model.
    ModelChanged(String),
    /// Change the theme.
    ThemeChanged(String),
    /// Not a command - treat as a question.
    NotACommand,
}

pub fn handle_command(input: &str) -> CommandResult {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim()).unwrap_or("");

    match cmd {
        "/help" | "/h" => show_help(),
        "/exit" | "/quit" | "/q" => CommandResult::Quit,

        // Navigation
        "/back" | "/b" => CommandResult::Back,
        "/forward" | "/f" => CommandResult::Forward,
        "/edit" => {
            if arg.is_empty() {
                CommandResult::Message("Usage: /edit <new question>".into())
            } else {
                CommandResult::Edit(arg.to_string())
            }
        }
        "/branches" => CommandResult::ListBranches,
        "/branch" => match arg.parse::<usize>() {
            Ok(n) if n > 0 => CommandResult::SwitchBranch(n),
            _ => CommandResult::Message("Usage: /branch <n>  (see /branches)".into()),
        },
        "/retry" => CommandResult::Retry,

        // Session
        "/copy" => CommandResult::Copy,
        "/save" => CommandResult::Save,

        // Model
        "/ping" => CommandResult::Ping,
        "/models" => CommandResult::ListModels,
        "/model" => {
            if arg.is_empty() {
                CommandResult::Message("Usage: /model <model-name>  (see /models)".into())
            } else {
                CommandResult::ModelChanged(arg.to_string())
            }
        }

        // Display
        "/theme" => {
            if arg.is_empty() {
                let themes = crate::theme::Theme::all_names().join(", ");
                CommandResult::Message(format!("Available themes: {themes}\nUsage: /theme <theme-name>"))
            } else {
                CommandResult::ThemeChanged(arg.to_string())
            }
        }
        "/version" => CommandResult::Message(format!("Screener v{}", env!("CARGO_PKG_VERSION"))),

        // Unknown command
        _ => {
            if input.starts_with('/') {
                CommandResult::Message(format!("Unknown command: {cmd}. Type /help for commands."))
            } else {
                CommandResult::NotACommand
            }
        }
    }
}

/// Completes a unique command prefix.
pub fn complete_command(input: &str) -> Option<String> {
    const COMMANDS: &[&str] = &[
        "/help", "/quit", "/back", "/forward", "/edit", "/branches", "/branch", "/retry",
        "/copy", "/save", "/ping", "/models", "/model", "/theme", "/version",
    ];

    let matches: Vec<&&str> = COMMANDS.iter().filter(|c| c.starts_with(input)).collect();
    match matches.as_slice() {
        [only] => Some(format!("{} ", only)),
        _ => None,
    }
}

fn show_help() -> CommandResult {
    let help_text = "\
╭─ Screener Commands ────────────────────────────────────────────╮

  CONVERSATION
    <text> + Enter            Ask a follow-up about the capture
    /back, /b                 Go to the previous turn   (Alt+Left)
    /forward, /f              Go to the next turn       (Alt+Right)
    /edit <text>              Re-ask this turn differently (new branch)
    /branches                 List alternative branches at this turn
    /branch <n>               Switch to branch n
    /retry                    Re-send a failed or unanswered turn

  SESSION
    /copy                     Copy the current answer
    /save                     Save the session now

  MODEL & DISPLAY
    /ping                     Check the Ollama server
    /models                   List installed models
    /model <name>             Use another model
    /theme <name>             Change color theme

  OTHER
    /help, /h                 Show this help message
    /version                  Show version information
    /exit, /quit, /q          Quit (Ctrl+C)

╰────────────────────────────────────────────────────────────────╯";

    CommandResult::Message(help_text.into())
}
