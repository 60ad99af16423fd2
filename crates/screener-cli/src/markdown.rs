//! Markdown answers to styled terminal lines.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::{Style as SyntectStyle, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use crate::theme::Theme;

pub struct MarkdownRenderer {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
        }
    }

    pub fn render(&self, source: &str, theme: &Theme) -> Vec<Line<'static>> {
        let mut writer = LineWriter::new(theme);
        let parser = Parser::new_ext(source, Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS);

        for event in parser {
            match event {
                Event::Start(tag) => match tag {
                    Tag::Heading { level, .. } => {
                        writer.flush();
                        writer.heading = true;
                        writer.push_text(format!("{} ", "#".repeat(heading_depth(level))));
                    }
                    Tag::Paragraph => {}
                    Tag::Emphasis => writer.modifiers.push(Modifier::ITALIC),
                    Tag::Strong => writer.modifiers.push(Modifier::BOLD),
                    Tag::Strikethrough => writer.modifiers.push(Modifier::CROSSED_OUT),
                    Tag::List(start) => {
                        writer.flush();
                        writer.lists.push(start);
                    }
                    Tag::Item => {
                        writer.flush();
                        let depth = writer.lists.len().saturating_sub(1);
                        let bullet = match writer.lists.last_mut() {
                            Some(Some(n)) => {
                                let label = format!("{}. ", n);
                                *n += 1;
                                label
                            }
                            _ => "• ".to_string(),
                        };
                        writer.current.push(Span::raw("  ".repeat(depth)));
                        writer.current.push(Span::styled(bullet, Style::default().fg(theme.accent)));
                    }
                    Tag::CodeBlock(kind) => {
                        writer.flush();
                        let lang = match kind {
                            CodeBlockKind::Fenced(lang) => lang.split_whitespace().next().unwrap_or("").to_string(),
                            CodeBlockKind::Indented => String::new(),
                        };
                        writer.code = Some((lang, String::new()));
                    }
                    _ => {}
                },
                Event::End(tag) => match tag {
                    TagEnd::Heading(_) => {
                        writer.flush();
                        writer.heading = false;
                        writer.blank();
                    }
                    TagEnd::Paragraph => {
                        writer.flush();
                        if writer.lists.is_empty() {
                            writer.blank();
                        }
                    }
                    TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                        writer.modifiers.pop();
                    }
                    TagEnd::List(_) => {
                        writer.flush();
                        writer.lists.pop();
                        if writer.lists.is_empty() {
                            writer.blank();
                        }
                    }
                    TagEnd::Item => writer.flush(),
                    TagEnd::CodeBlock => {
                        if let Some((lang, code)) = writer.code.take() {
                            let lines = self.highlight(&code, &lang, theme);
                            writer.lines.extend(lines);
                            writer.blank();
                        }
                    }
                    _ => {}
                },
                Event::Text(text) => match writer.code.as_mut() {
                    Some((_, buffer)) => buffer.push_str(&text),
                    None => writer.push_text(text.to_string()),
                },
                Event::Code(code) => {
                    writer
                        .current
                        .push(Span::styled(code.to_string(), Style::default().fg(theme.code_fg)));
                }
                Event::SoftBreak => writer.push_text(" ".to_string()),
                Event::HardBreak => writer.flush(),
                Event::Rule => {
                    writer.flush();
                    writer.lines.push(Line::from(Span::styled(
                        "─".repeat(40),
                        Style::default().fg(theme.muted),
                    )));
                    writer.blank();
                }
                Event::TaskListMarker(checked) => {
                    writer.push_text(if checked { "[x] " } else { "[ ] " }.to_string());
                }
                _ => {}
            }
        }

        writer.finish()
    }

    fn highlight(&self, code: &str, lang: &str, theme: &Theme) -> Vec<Line<'static>> {
        let syntax = (!lang.is_empty())
            .then(|| self.syntax_set.find_syntax_by_token(lang))
            .flatten();
        let highlight_theme = self.theme_set.themes.get(theme.syntax_theme);

        let mut lines = Vec::new();
        match (syntax, highlight_theme) {
            (Some(syntax), Some(highlight_theme)) => {
                let mut h = HighlightLines::new(syntax, highlight_theme);
                for line in LinesWithEndings::from(code) {
                    let spans = match h.highlight_line(line, &self.syntax_set) {
                        Ok(ranges) => ranges
                            .into_iter()
                            .map(|(style, text)| {
                                Span::styled(
                                    text.trim_end_matches(['\n', '\r']).to_string(),
                                    Style::default().fg(syntect_to_color(style)),
                                )
                            })
                            .collect(),
                        Err(_) => vec![plain_code_span(line, theme)],
                    };
                    lines.push(indent_code(spans));
                }
            }
            _ => {
                for line in code.lines() {
                    lines.push(indent_code(vec![plain_code_span(line, theme)]));
                }
            }
        }
        lines
    }
}

/// Accumulates spans into lines while walking parser events.
struct LineWriter<'t> {
    theme: &'t Theme,
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    modifiers: Vec<Modifier>,
    lists: Vec<Option<u64>>,
    heading: bool,
    code: Option<(String, String)>,
}

impl<'t> LineWriter<'t> {
    fn new(theme: &'t Theme) -> Self {
        Self {
            theme,
            lines: Vec::new(),
            current: Vec::new(),
            modifiers: Vec::new(),
            lists: Vec::new(),
            heading: false,
            code: None,
        }
    }

    fn style(&self) -> Style {
        let mut style = if self.heading {
            Style::default()
                .fg(self.theme.heading_color)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(self.theme.answer_color)
        };
        for m in &self.modifiers {
            style = style.add_modifier(*m);
        }
        style
    }

    fn push_text(&mut self, text: String) {
        let style = self.style();
        self.current.push(Span::styled(text, style));
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.lines.push(Line::from(std::mem::take(&mut self.current)));
        }
    }

    /// Adds a separating empty line, never two in a row.
    fn blank(&mut self) {
        let last_blank = self.lines.last().map(|l| l.spans.is_empty()).unwrap_or(true);
        if !last_blank {
            self.lines.push(Line::default());
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush();
        while self.lines.last().map(|l| l.spans.is_empty()).unwrap_or(false) {
            self.lines.pop();
        }
        self.lines
    }
}

fn heading_depth(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn plain_code_span(line: &str, theme: &Theme) -> Span<'static> {
    Span::styled(
        line.trim_end_matches(['\n', '\r']).to_string(),
        Style::default().fg(theme.code_fg),
    )
}

fn indent_code(mut spans: Vec<Span<'static>>) -> Line<'static> {
    spans.insert(0, Span::raw("    "));
    Line::from(spans)
}

fn syntect_to_color(style: SyntectStyle) -> Color {
    Color::Rgb(style.foreground.r, style.foreground.g, style.foreground.b)
}

/// Flattens rendered lines to plain text.
pub fn plain_text(lines: &[Line<'_>]) -> String {
    lines
        .iter()
        .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}
