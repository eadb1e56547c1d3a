//! Markdown rendering for summaries: HTML for mail bodies, plain text for
//! terminals.
//!
//! HTML output follows CommonMark with tables and strikethrough; headings
//! get a slug `id` and links open in a new tab.

use pulldown_cmark::{html, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

fn options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

/// Lowercase, alphanumerics kept, runs of anything else collapsed to `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn to_html(markdown: &str) -> String {
    let mut events: Vec<Event> = Parser::new_ext(markdown, options()).collect();

    // Give headings an id derived from their text.
    let mut i = 0;
    while i < events.len() {
        if let Event::Start(Tag::Heading { id: None, .. }) = &events[i] {
            let mut text = String::new();
            for event in &events[i + 1..] {
                match event {
                    Event::Text(t) | Event::Code(t) => text.push_str(t),
                    Event::End(TagEnd::Heading(_)) => break,
                    _ => {}
                }
            }
            if let Event::Start(Tag::Heading { id, .. }) = &mut events[i] {
                *id = Some(CowStr::from(slugify(&text)));
            }
        }
        i += 1;
    }

    let events = events.into_iter().map(|event| match event {
        Event::Start(Tag::Link {
            dest_url, title, ..
        }) => {
            let title = if title.is_empty() {
                String::new()
            } else {
                format!(" title=\"{}\"", escape_attr(&title))
            };
            Event::InlineHtml(CowStr::from(format!(
                "<a href=\"{}\"{} target=\"_blank\">",
                escape_attr(&dest_url),
                title
            )))
        }
        Event::End(TagEnd::Link) => Event::InlineHtml(CowStr::Borrowed("</a>")),
        other => other,
    });

    let mut out = String::new();
    html::push_html(&mut out, events);
    out
}

/// Render Markdown as readable plain text.
///
/// Headings are underlined, list items get a bullet or their number, and
/// links keep their target in parentheses.
pub fn to_text(markdown: &str) -> String {
    let mut out = String::new();
    let mut lists: Vec<Option<u64>> = Vec::new();
    let mut heading: Option<(HeadingLevel, usize)> = None;
    let mut link_targets: Vec<String> = Vec::new();

    for event in Parser::new_ext(markdown, options()) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                block_gap(&mut out);
                heading = Some((level, out.len()));
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, start)) = heading.take() {
                    let width = out[start..].chars().count();
                    let rule = if level == HeadingLevel::H1 { '=' } else { '-' };
                    out.push('\n');
                    out.extend(std::iter::repeat(rule).take(width));
                }
                out.push('\n');
            }
            Event::Start(Tag::Paragraph) => {
                if lists.is_empty() {
                    block_gap(&mut out);
                }
            }
            Event::End(TagEnd::Paragraph) => {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Event::Start(Tag::List(start)) => {
                if lists.is_empty() {
                    block_gap(&mut out);
                } else if !out.ends_with('\n') {
                    out.push('\n');
                }
                lists.push(start);
            }
            Event::End(TagEnd::List(_)) => {
                lists.pop();
            }
            Event::Start(Tag::Item) => {
                let depth = lists.len().saturating_sub(1);
                out.push_str(&"  ".repeat(depth));
                match lists.last_mut() {
                    Some(Some(n)) => {
                        out.push_str(&format!("{}. ", n));
                        *n += 1;
                    }
                    _ => out.push_str("- "),
                }
            }
            Event::End(TagEnd::Item) => {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Event::Start(Tag::CodeBlock(_)) => block_gap(&mut out),
            Event::Start(Tag::Link { dest_url, .. }) => link_targets.push(dest_url.to_string()),
            Event::End(TagEnd::Link) => {
                if let Some(target) = link_targets.pop() {
                    out.push_str(&format!(" ({})", target));
                }
            }
            Event::Start(Tag::TableRow) | Event::Start(Tag::TableHead) => {}
            Event::End(TagEnd::TableCell) => out.push('\t'),
            Event::End(TagEnd::TableRow) | Event::End(TagEnd::TableHead) => {
                let trimmed = out.trim_end_matches('\t').len();
                out.truncate(trimmed);
                out.push('\n');
            }
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Rule => {
                block_gap(&mut out);
                out.push_str("----\n");
            }
            Event::TaskListMarker(done) => out.push_str(if done { "[x] " } else { "[ ] " }),
            _ => {}
        }
    }

    out
}

/// Separate a new block from the previous one by a blank line.
fn block_gap(out: &mut String) {
    if out.is_empty() {
        return;
    }
    while !out.ends_with("\n\n") {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_basics() {
        assert_eq!(to_html("This is a paragraph."), "<p>This is a paragraph.</p>\n");
        assert_eq!(to_html("This is **bold** text."), "<p>This is <strong>bold</strong> text.</p>\n");
        assert_eq!(to_html("* Item 1\n* Item 2"), "<ul>\n<li>Item 1</li>\n<li>Item 2</li>\n</ul>\n");
        assert_eq!(to_html(""), "");
        assert_eq!(to_html("  \n\n"), "");
    }

    #[test]
    fn test_html_heading_ids() {
        assert_eq!(to_html("# Heading 1"), "<h1 id=\"heading-1\">Heading 1</h1>\n");
        assert_eq!(
            to_html("## Another Heading"),
            "<h2 id=\"another-heading\">Another Heading</h2>\n"
        );
        assert_eq!(to_html("# Daily `plan`"), "<h1 id=\"daily-plan\">Daily <code>plan</code></h1>\n");
    }

    #[test]
    fn test_html_links_open_in_new_tab() {
        assert_eq!(
            to_html("[Google](http://www.google.com)"),
            "<p><a href=\"http://www.google.com\" target=\"_blank\">Google</a></p>\n"
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Weather 🌤 today "), "weather-today");
    }

    #[test]
    fn test_text_rendering() {
        let md = "# Good morning\n\nToday is **sunny**.\n\n* Dentist at 09:00\n* Call [Bob](tel:123)\n\n1. First\n2. Second\n";
        let text = to_text(md);
        assert_eq!(
            text,
            "Good morning\n============\n\nToday is sunny.\n\n- Dentist at 09:00\n- Call Bob (tel:123)\n\n1. First\n2. Second\n"
        );
    }

    #[test]
    fn test_text_nested_list() {
        let text = to_text("- Monday\n  - Gym\n- Tuesday\n");
        assert_eq!(text, "- Monday\n  - Gym\n- Tuesday\n");
    }
}
