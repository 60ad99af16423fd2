// Library interface for the screener binary's front-end pieces, so
// integration tests can reach them. The files are shared with main.rs
// through path attributes.

#[path = "commands.rs"]
pub mod commands;

#[path = "markdown.rs"]
pub mod markdown;

#[path = "theme.rs"]
pub mod theme;

pub use commands::{handle_command, CommandResult};
pub use markdown::MarkdownRenderer;
pub use theme::Theme;
