use pulldown_cmark::{Event, Options, Parser, Tag};

/// A displayable chunk of a bot reply. Inline emphasis is flattened into plain text.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph(String),
    ListItem { marker: String, depth: usize, text: String },
    Quote(String),
    Code(String),
    Rule,
}

#[derive(Default)]
struct Builder {
    blocks: Vec<Block>,
    text: String,
    lists: Vec<Option<u64>>,
    markers: Vec<String>,
    heading: Option<u8>,
    quote_depth: usize,
}

impl Builder {
    fn flush(&mut self) {
        let text = self.text.trim().to_string();
        self.text.clear();
        if text.is_empty() {
            return;
        }

        let block = if let Some(level) = self.heading {
            Block::Heading { level, text }
        } else if let Some(marker) = self.markers.last() {
            Block::ListItem {
                marker: marker.clone(),
                depth: self.markers.len() - 1,
                text,
            }
        } else if self.quote_depth > 0 {
            Block::Quote(text)
        } else {
            Block::Paragraph(text)
        };
        self.blocks.push(block);
    }

    fn next_marker(&mut self) -> String {
        match self.lists.last_mut() {
            Some(Some(number)) => {
                let marker = format!("{}.", number);
                *number += 1;
                marker
            }
            _ => "•".to_string(),
        }
    }
}

pub fn parse(markdown: &str) -> Vec<Block> {
    let mut builder = Builder::default();
    let mut in_code = false;

    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES | Options::ENABLE_TASKLISTS;

    for event in Parser::new_ext(markdown, options) {
        match event {
            Event::Start(Tag::Heading(level, _, _)) => {
                builder.flush();
                builder.heading = Some(level as u8);
            }
            Event::End(Tag::Heading(..)) => {
                builder.flush();
                builder.heading = None;
            }
            Event::Start(Tag::Paragraph) | Event::End(Tag::Paragraph) => builder.flush(),
            Event::Start(Tag::List(start)) => {
                builder.flush();
                builder.lists.push(start);
            }
            Event::End(Tag::List(_)) => {
                builder.flush();
                builder.lists.pop();
            }
            Event::Start(Tag::Item) => {
                builder.flush();
                let marker = builder.next_marker();
                builder.markers.push(marker);
            }
            Event::End(Tag::Item) => {
                builder.flush();
                builder.markers.pop();
            }
            Event::Start(Tag::BlockQuote) => {
                builder.flush();
                builder.quote_depth += 1;
            }
            Event::End(Tag::BlockQuote) => {
                builder.flush();
                builder.quote_depth = builder.quote_depth.saturating_sub(1);
            }
            Event::Start(Tag::CodeBlock(_)) => {
                builder.flush();
                in_code = true;
            }
            Event::End(Tag::CodeBlock(_)) => {
                let code = builder.text.trim_end_matches('\n').to_string();
                builder.text.clear();
                builder.blocks.push(Block::Code(code));
                in_code = false;
            }
            Event::End(Tag::TableCell) => builder.text.push_str("  "),
            Event::End(Tag::TableHead) | Event::End(Tag::TableRow) => builder.flush(),
            Event::Text(text) | Event::Code(text) | Event::Html(text) => builder.text.push_str(&text),
            Event::SoftBreak if in_code => builder.text.push('\n'),
            Event::SoftBreak => builder.text.push(' '),
            Event::HardBreak => builder.text.push('\n'),
            Event::TaskListMarker(done) => builder.text.push_str(if done { "[x] " } else { "[ ] " }),
            Event::Rule => {
                builder.flush();
                builder.blocks.push(Block::Rule);
            }
            _ => {}
        }
    }

    builder.flush();
    builder.blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(text: &str) -> Block {
        Block::Paragraph(text.to_string())
    }

    fn item(marker: &str, depth: usize, text: &str) -> Block {
        Block::ListItem {
            marker: marker.to_string(),
            depth,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(parse("Olá! Como posso ajudar?"), vec![paragraph("Olá! Como posso ajudar?")]);
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_heading_and_inline_markup() {
        let blocks = parse("## Resumo\n\nA imagem mostra **um gato** com `chapéu`\nem *cima* da mesa.");
        assert_eq!(
            blocks,
            vec![
                Block::Heading {
                    level: 2,
                    text: "Resumo".to_string()
                },
                paragraph("A imagem mostra um gato com chapéu em cima da mesa."),
            ]
        );
    }

    #[test]
    fn test_lists() {
        let blocks = parse("3. three\n4. four\n\n- a\n  - nested\n- b");
        assert_eq!(
            blocks,
            vec![
                item("3.", 0, "three"),
                item("4.", 0, "four"),
                item("•", 0, "a"),
                item("•", 1, "nested"),
                item("•", 0, "b"),
            ]
        );
    }

    #[test]
    fn test_loose_list_items_stay_items() {
        let blocks = parse("- first\n\n- second\n");
        assert_eq!(blocks, vec![item("•", 0, "first"), item("•", 0, "second")]);
    }

    #[test]
    fn test_code_block_keeps_layout() {
        let blocks = parse("```rust\nfn main() {\n    println!(\"hi\");\n}\n```\ndone");
        assert_eq!(
            blocks,
            vec![
                Block::Code("fn main() {\n    println!(\"hi\");\n}".to_string()),
                paragraph("done"),
            ]
        );
    }

    #[test]
    fn test_quote_and_rule() {
        let blocks = parse("> citado\n\n---\n\nfim");
        assert_eq!(blocks, vec![Block::Quote("citado".to_string()), Block::Rule, paragraph("fim")]);
    }
}
