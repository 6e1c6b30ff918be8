//! Markdown to ANSI terminal text.
//!
//! Styling goes through `colored`, which honours `NO_COLOR` and
//! `CLICOLOR_FORCE`, so piping the output yields plain text when asked to.

use colored::{Color, ColoredString, Colorize};
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

const CODE_INDENT: &str = "    ";
const RULE_WIDTH: usize = 40;

#[derive(Debug, Clone, Copy, Default)]
struct Style {
    bold: bool,
    italic: bool,
    strikethrough: bool,
    underline: bool,
    color: Option<Color>,
}

impl Style {
    fn paint(&self, text: &str) -> ColoredString {
        let mut painted = text.normal();
        if let Some(color) = self.color {
            painted = painted.color(color);
        }
        if self.bold {
            painted = painted.bold();
        }
        if self.italic {
            painted = painted.italic();
        }
        if self.strikethrough {
            painted = painted.strikethrough();
        }
        if self.underline {
            painted = painted.underline();
        }
        painted
    }
}

fn heading_style(level: HeadingLevel) -> Style {
    let color = match level {
        HeadingLevel::H1 => Color::Cyan,
        HeadingLevel::H2 => Color::Blue,
        HeadingLevel::H3 => Color::Green,
        _ => Color::Yellow,
    };
    Style {
        bold: true,
        color: Some(color),
        ..Style::default()
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

#[derive(Debug, Default)]
struct Renderer {
    out: String,
    line: String,
    styles: Vec<Style>,
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    code_block: Option<String>,
    link_targets: Vec<String>,
}

impl Renderer {
    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, update: impl FnOnce(&mut Style)) {
        let mut style = self.style();
        update(&mut style);
        self.styles.push(style);
    }

    fn start_line(&mut self) {
        if self.line.is_empty() && self.quote_depth > 0 {
            let prefix = "│ ".repeat(self.quote_depth);
            self.line.push_str(&prefix.dimmed().to_string());
        }
    }

    fn push_raw(&mut self, text: &str) {
        self.start_line();
        self.line.push_str(text);
    }

    fn push_text(&mut self, text: &str) {
        let painted = self.style().paint(text).to_string();
        self.push_raw(&painted);
    }

    fn flush_line(&mut self) {
        if self.line.is_empty() {
            return;
        }
        self.out.push_str(self.line.trim_end_matches(' '));
        self.out.push('\n');
        self.line.clear();
    }

    /// Ends the current block with exactly one blank line.
    fn block_gap(&mut self) {
        self.flush_line();
        if self.out.is_empty() || !self.lists.is_empty() {
            return;
        }
        while !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn start_item(&mut self) {
        self.flush_line();
        let indent = "  ".repeat(self.lists.len().saturating_sub(1));
        let marker = match self.lists.last_mut() {
            Some(Some(number)) => {
                let marker = format!("{number}. ");
                *number += 1;
                marker
            }
            _ => "• ".to_string(),
        };
        self.push_raw(&indent);
        self.push_raw(&marker.yellow().to_string());
    }

    fn code_text(&mut self, text: &str) {
        match &mut self.code_block {
            Some(buffer) => buffer.push_str(text),
            None => self.push_text(text),
        }
    }

    fn end_code_block(&mut self) {
        let Some(code) = self.code_block.take() else {
            return;
        };
        for line in code.trim_end_matches('\n').lines() {
            self.push_raw(CODE_INDENT);
            self.line.push_str(&line.bright_white().to_string());
            self.flush_line();
        }
        self.block_gap();
    }

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.code_text(&text),
            Event::Code(code) => {
                let painted = code.yellow().to_string();
                self.push_raw(&painted);
            }
            Event::Html(html) => {
                for line in html.lines() {
                    self.push_raw(line);
                    self.flush_line();
                }
            }
            Event::InlineHtml(html) => self.push_raw(&html),
            Event::FootnoteReference(name) => self.push_text(&format!("[^{name}]")),
            Event::SoftBreak => self.push_raw(" "),
            Event::HardBreak => self.flush_line(),
            Event::Rule => {
                self.flush_line();
                let rule = "─".repeat(RULE_WIDTH);
                self.push_raw(&rule.dimmed().to_string());
                self.block_gap();
            }
            Event::TaskListMarker(checked) => {
                self.push_raw(if checked { "[x] " } else { "[ ] " });
            }
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush_line();
                let style = heading_style(level);
                self.styles.push(style);
                let prefix = format!("{} ", "#".repeat(heading_depth(level)));
                self.push_text(&prefix);
            }
            Tag::CodeBlock(kind) => {
                self.flush_line();
                if let CodeBlockKind::Fenced(lang) = kind
                    && !lang.trim().is_empty()
                {
                    self.push_raw(&lang.trim().dimmed().to_string());
                    self.flush_line();
                }
                self.code_block = Some(String::new());
            }
            Tag::List(start) => {
                self.flush_line();
                self.lists.push(start);
            }
            Tag::Item => self.start_item(),
            Tag::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth += 1;
            }
            Tag::Emphasis => self.push_style(|style| style.italic = true),
            Tag::Strong => self.push_style(|style| style.bold = true),
            Tag::Strikethrough => self.push_style(|style| style.strikethrough = true),
            Tag::Link { dest_url, .. } => {
                self.link_targets.push(dest_url.to_string());
                self.push_style(|style| {
                    style.underline = true;
                    style.color = Some(Color::Blue);
                });
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.block_gap(),
            TagEnd::Heading(_) => {
                self.styles.pop();
                self.block_gap();
            }
            TagEnd::CodeBlock => self.end_code_block(),
            TagEnd::List(_) => {
                self.flush_line();
                self.lists.pop();
                self.block_gap();
            }
            TagEnd::Item => self.flush_line(),
            TagEnd::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.block_gap();
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.styles.pop();
            }
            TagEnd::Link => {
                self.styles.pop();
                if let Some(target) = self.link_targets.pop()
                    && !target.is_empty()
                {
                    self.push_raw(&format!(" ({target})").dimmed().to_string());
                }
            }
            TagEnd::TableCell => self.push_raw("  "),
            TagEnd::TableHead | TagEnd::TableRow => self.flush_line(),
            TagEnd::Table | TagEnd::HtmlBlock => self.block_gap(),
            _ => {}
        }
    }

    fn finish(mut self) -> String {
        self.flush_line();
        let trimmed = self.out.trim_end_matches('\n').len();
        self.out.truncate(trimmed);
        self.out
    }
}

/// Renders markdown to terminal text, without a trailing newline.
pub fn render_markdown(input: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut renderer = Renderer::default();
    for event in Parser::new_ext(input, options) {
        renderer.handle(event);
    }
    renderer.finish()
}
