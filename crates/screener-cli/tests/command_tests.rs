use screener_cli::commands::{complete_command, handle_command, CommandResult};
use screener_cli::markdown::{plain_text, MarkdownRenderer};
use screener_cli::Theme;

// ========================================================================
// Command parsing
// ========================================================================

#[test]
fn test_help_command() {
    let result = handle_command("/help");
    let CommandResult::Message(msg) = result else {
        panic!("expected help text");
    };
    assert!(msg.contains("Screener Commands"));
    assert!(msg.contains("/branches"));
    assert!(msg.contains("/retry"));
}

#[test]
fn test_help_short_alias() {
    assert_eq!(handle_command("/h"), handle_command("/help"));
}

#[test]
fn test_quit_aliases() {
    for cmd in ["/exit", "/quit", "/q"] {
        assert_eq!(handle_command(cmd), CommandResult::Quit, "{cmd}");
    }
}

#[test]
fn test_navigation_commands() {
    assert_eq!(handle_command("/back"), CommandResult::Back);
    assert_eq!(handle_command("/b"), CommandResult::Back);
    assert_eq!(handle_command("/forward"), CommandResult::Forward);
    assert_eq!(handle_command("/f"), CommandResult::Forward);
    assert_eq!(handle_command("/branches"), CommandResult::ListBranches);
    assert_eq!(handle_command("/retry"), CommandResult::Retry);
}

#[test]
fn test_edit_keeps_full_text() {
    assert_eq!(
        handle_command("/edit   What does the red button do?  "),
        CommandResult::Edit("What does the red button do?".into())
    );
}

#[test]
fn test_edit_without_text_shows_usage() {
    let CommandResult::Message(msg) = handle_command("/edit") else {
        panic!("expected usage");
    };
    assert!(msg.contains("Usage: /edit"));
}

#[test]
fn test_branch_number() {
    assert_eq!(handle_command("/branch 2"), CommandResult::SwitchBranch(2));
    assert!(matches!(handle_command("/branch 0"), CommandResult::Message(_)));
    assert!(matches!(handle_command("/branch two"), CommandResult::Message(_)));
    assert!(matches!(handle_command("/branch"), CommandResult::Message(_)));
}

#[test]
fn test_session_commands() {
    assert_eq!(handle_command("/copy"), CommandResult::Copy);
    assert_eq!(handle_command("/save"), CommandResult::Save);
}

#[test]
fn test_model_commands() {
    assert_eq!(handle_command("/ping"), CommandResult::Ping);
    assert_eq!(handle_command("/models"), CommandResult::ListModels);
    assert_eq!(
        handle_command("/model llava:13b"),
        CommandResult::ModelChanged("llava:13b".into())
    );
    assert!(matches!(handle_command("/model"), CommandResult::Message(_)));
}

#[test]
fn test_theme_command() {
    assert_eq!(
        handle_command("/theme light"),
        CommandResult::ThemeChanged("light".into())
    );
    let CommandResult::Message(msg) = handle_command("/theme") else {
        panic!("expected theme list");
    };
    for name in Theme::all_names() {
        assert!(msg.contains(name));
    }
}

#[test]
fn test_version_command() {
    let CommandResult::Message(msg) = handle_command("/version") else {
        panic!("expected version");
    };
    assert!(msg.starts_with("Screener v"));
}

#[test]
fn test_unknown_command() {
    let CommandResult::Message(msg) = handle_command("/frobnicate") else {
        panic!("expected error message");
    };
    assert!(msg.contains("Unknown command: /frobnicate"));
}

#[test]
fn test_plain_text_is_a_question() {
    assert_eq!(handle_command("what is this?"), CommandResult::NotACommand);
    assert_eq!(handle_command(""), CommandResult::NotACommand);
}

// ========================================================================
// Completion
// ========================================================================

#[test]
fn test_complete_unique_prefix() {
    assert_eq!(complete_command("/ret"), Some("/retry ".into()));
    assert_eq!(complete_command("/th"), Some("/theme ".into()));
    assert_eq!(complete_command("/branche"), Some("/branches ".into()));
}

#[test]
fn test_complete_ambiguous_or_unknown() {
    assert_eq!(complete_command("/b"), None);
    assert_eq!(complete_command("/mod"), None);
    assert_eq!(complete_command("/zzz"), None);
}

// ========================================================================
// Themes
// ========================================================================

#[test]
fn test_theme_by_name() {
    assert_eq!(Theme::by_name("light").name, "light");
    assert_eq!(Theme::by_name("tokyo-night").name, "tokyo-night");
    assert_eq!(Theme::by_name("no-such-theme").name, "dark");
}

#[test]
fn test_every_theme_has_a_syntax_theme() {
    let themes = syntect::highlighting::ThemeSet::load_defaults();
    for name in Theme::all_names() {
        let theme = Theme::by_name(name);
        assert!(
            themes.themes.contains_key(theme.syntax_theme),
            "{} uses missing syntax theme {}",
            name,
            theme.syntax_theme
        );
    }
}

// ========================================================================
// Markdown rendering of a typical answer
// ========================================================================

#[test]
fn test_render_typical_answer() {
    let answer = "\
# Login dialog

The window shows a **login form** with:

- a `username` field
- a password field

```python
print(\"hello\")
```";
    let renderer = MarkdownRenderer::new();
    let text = plain_text(&renderer.render(answer, &Theme::tokyo_night()));
    assert!(text.starts_with("# Login dialog"));
    assert!(text.contains("The window shows a login form with:"));
    assert!(text.contains("• a username field"));
    assert!(text.contains("    print(\"hello\")"));
}
