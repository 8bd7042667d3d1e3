//! Minimal HTML to markdown rendering for article bodies.

use scraper::{ElementRef, Html, Node};

/// Rendering switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownOptions<'a> {
    /// Emit `![alt](src)` for images; otherwise images are dropped.
    pub images: bool,
    /// Elements carrying any of these classes are skipped with their subtree.
    pub skip_classes: &'a [&'a str],
    /// Keep text-node line breaks, for bodies laid out as preformatted text.
    pub preformatted: bool,
}

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "iframe", "template"];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "figure", "figcaption", "ul", "ol", "table", "tr",
    "blockquote", "header", "footer", "aside",
];

/// Render an HTML fragment as markdown text.
pub fn html_to_markdown(html: &str, options: MarkdownOptions<'_>) -> String {
    let fragment = Html::parse_fragment(html);
    element_to_markdown(fragment.root_element(), options)
}

/// Render one element's content as markdown text.
pub fn element_to_markdown(element: ElementRef<'_>, options: MarkdownOptions<'_>) -> String {
    let mut out = String::new();
    render_children(element, options, &mut out);
    tidy(&out)
}

fn render_children(element: ElementRef<'_>, options: MarkdownOptions<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) if options.preformatted => out.push_str(text),
            Node::Text(text) => push_inline(out, text),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    render_element(child_el, options, out);
                }
            }
            _ => {}
        }
    }
}

fn render_element(element: ElementRef<'_>, options: MarkdownOptions<'_>, out: &mut String) {
    let value = element.value();
    let name = value.name();

    if SKIPPED_TAGS.contains(&name) || value.classes().any(|c| options.skip_classes.contains(&c)) {
        return;
    }

    match name {
        "br" => out.push('\n'),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            block_break(out);
            out.push_str(&"#".repeat(level));
            out.push(' ');
            render_children(element, options, out);
            block_break(out);
        }
        "li" => {
            line_break(out);
            out.push_str("- ");
            render_children(element, options, out);
            line_break(out);
        }
        "a" => {
            let mut inner = String::new();
            render_children(element, options, &mut inner);
            let inner = inner.trim();
            match value.attr("href").map(str::trim) {
                Some(href) if !inner.is_empty() && !href.is_empty() && !href.starts_with("javascript:") => {
                    out.push_str(&format!("[{inner}]({href})"));
                }
                _ => out.push_str(inner),
            }
        }
        "img" => {
            if options.images {
                let src = value
                    .attr("src")
                    .or_else(|| value.attr("data-src"))
                    .map(str::trim)
                    .unwrap_or("");
                if !src.is_empty() {
                    let alt = value.attr("alt").unwrap_or("").trim();
                    out.push_str(&format!("![{alt}]({src})"));
                }
            }
        }
        "strong" | "b" => {
            let mut inner = String::new();
            render_children(element, options, &mut inner);
            let inner = inner.trim();
            if !inner.is_empty() {
                out.push_str(&format!("**{inner}**"));
            }
        }
        _ if BLOCK_TAGS.contains(&name) => {
            block_break(out);
            render_children(element, options, out);
            block_break(out);
        }
        _ => render_children(element, options, out),
    }
}

/// Append text with whitespace runs collapsed.
fn push_inline(out: &mut String, text: &str) {
    let at_line_start = out.is_empty() || out.ends_with('\n');
    let starts_with_space = text.starts_with(char::is_whitespace);
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        if starts_with_space && !at_line_start && !out.ends_with(' ') {
            out.push(' ');
        }
        return;
    }
    if starts_with_space && !at_line_start && !out.ends_with(' ') {
        out.push(' ');
    }
    out.push_str(&words.join(" "));
    if text.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

fn line_break(out: &mut String) {
    trim_trailing_spaces(out);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn block_break(out: &mut String) {
    trim_trailing_spaces(out);
    if out.is_empty() {
        return;
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    if !out.ends_with("\n\n") {
        out.push('\n');
    }
}

fn trim_trailing_spaces(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
}

/// Trim lines and collapse runs of blank lines.
fn tidy(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut blank = false;
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !blank && !lines.is_empty() {
                lines.push("");
            }
            blank = true;
        } else {
            lines.push(line);
            blank = false;
        }
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n")
}
