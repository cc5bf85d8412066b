use pulldown_cmark::{Event, HeadingLevel, Parser, Tag};

use crate::session::{ConversationThread, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayRole {
    User,
    Assistant,
}

impl DisplayRole {
    pub fn label(&self) -> &'static str {
        match self {
            DisplayRole::User => "user",
            DisplayRole::Assistant => "assistant",
        }
    }
}

impl From<Role> for DisplayRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => DisplayRole::User,
            Role::Model => DisplayRole::Assistant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderedTurn<'a> {
    pub role: DisplayRole,
    pub content: &'a str,
}

/// Display order of a thread. Pure; calling it twice gives the same result.
pub fn render_thread(thread: &ConversationThread) -> Vec<RenderedTurn<'_>> {
    thread
        .turns()
        .iter()
        .map(|turn| RenderedTurn {
            role: turn.role().into(),
            content: turn.content(),
        })
        .collect()
}

/// Flattened markdown, enough to lay out a chat bubble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading(u8, String),
    Paragraph(String),
    ListItem(String),
    Code(String),
    Rule,
}

#[derive(Clone, Copy)]
enum Kind {
    Heading(u8),
    Paragraph,
    ListItem,
    Code,
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn flush(blocks: &mut Vec<Block>, buf: &mut String, kind: Option<Kind>) {
    let text = buf.trim_end();
    if !text.trim_start().is_empty() {
        let text = text.to_string();
        blocks.push(match kind.unwrap_or(Kind::Paragraph) {
            Kind::Heading(level) => Block::Heading(level, text),
            Kind::Paragraph => Block::Paragraph(text),
            Kind::ListItem => Block::ListItem(text),
            Kind::Code => Block::Code(text),
        });
    }
    buf.clear();
}

pub fn markdown_blocks(source: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut buf = String::new();
    let mut current: Option<Kind> = None;
    let mut item_depth = 0usize;

    for event in Parser::new(source) {
        match event {
            Event::Start(Tag::Heading(level, ..)) => {
                flush(&mut blocks, &mut buf, current);
                current = Some(Kind::Heading(heading_level(level)));
            }
            Event::Start(Tag::Paragraph) => {
                if item_depth == 0 {
                    flush(&mut blocks, &mut buf, current);
                    current = Some(Kind::Paragraph);
                }
            }
            Event::Start(Tag::Item) => {
                flush(&mut blocks, &mut buf, current);
                item_depth += 1;
                current = Some(Kind::ListItem);
            }
            Event::Start(Tag::CodeBlock(_)) => {
                flush(&mut blocks, &mut buf, current);
                current = Some(Kind::Code);
            }
            Event::End(Tag::Heading(..)) | Event::End(Tag::CodeBlock(_)) => {
                flush(&mut blocks, &mut buf, current);
                current = (item_depth > 0).then_some(Kind::ListItem);
            }
            Event::End(Tag::Paragraph) => {
                if item_depth == 0 {
                    flush(&mut blocks, &mut buf, current);
                    current = None;
                } else {
                    buf.push('\n');
                }
            }
            Event::End(Tag::Item) => {
                flush(&mut blocks, &mut buf, current);
                item_depth = item_depth.saturating_sub(1);
                current = (item_depth > 0).then_some(Kind::ListItem);
            }
            Event::Text(text) | Event::Code(text) => buf.push_str(&text),
            Event::SoftBreak => buf.push(' '),
            Event::HardBreak => buf.push('\n'),
            Event::Rule => {
                flush(&mut blocks, &mut buf, current);
                blocks.push(Block::Rule);
            }
            _ => {}
        }
    }
    flush(&mut blocks, &mut buf, current);

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionStore, ThreadKey, Turn};

    #[test]
    fn test_render_maps_roles() {
        let mut store = SessionStore::new();
        let thread = store.get_or_create_thread(ThreadKey::Chat);
        thread.append_exchange(Turn::user("Hello"), Turn::model("Hi there"));

        let rendered = render_thread(thread);
        assert_eq!(rendered[0].role.label(), "user");
        assert_eq!(rendered[1].role.label(), "assistant");
        assert_eq!(rendered[1].content, "Hi there");
        assert_eq!(render_thread(thread), rendered);
    }

    #[test]
    fn test_render_empty_thread() {
        let mut store = SessionStore::new();
        assert!(render_thread(store.get_or_create_thread(ThreadKey::Pdf)).is_empty());
    }

    #[test]
    fn test_markdown_blocks() {
        let source = "## Summary\n\nThe paper is about **rust**\nand `borrowck`.\n\n- one\n- two\n\n```\nfn main() {}\n```\n";
        assert_eq!(
            markdown_blocks(source),
            vec![
                Block::Heading(2, "Summary".into()),
                Block::Paragraph("The paper is about rust and borrowck.".into()),
                Block::ListItem("one".into()),
                Block::ListItem("two".into()),
                Block::Code("fn main() {}".into()),
            ]
        );
    }

    #[test]
    fn test_markdown_plain_text() {
        assert_eq!(markdown_blocks("Hi there"), vec![Block::Paragraph("Hi there".into())]);
        assert!(markdown_blocks("").is_empty());
    }
}
