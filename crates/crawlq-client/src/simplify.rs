use scraper::{ElementRef, Html, Node, Selector};

/// Elements dropped from the reader view together with their subtree.
const NOISE_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript", "iframe", "form", "svg",
];

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Reader-mode rendering of a page.
///
/// Keeps the document `<title>` and the main content block (`<article>`,
/// else `<main>`, else `<body>`), with navigation chrome, scripts and
/// styling removed. The output is still an HTML document, so extraction
/// expressions such as `//title/text()` keep working on it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReaderView;

impl ReaderView {
    pub fn new() -> Self {
        Self
    }

    pub fn simplify(&self, html: &str) -> String {
        let doc = Html::parse_document(html);

        let title = first_match(&doc, "title")
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        let mut out = String::with_capacity(html.len() / 2);
        out.push_str("<html><head>");
        if let Some(title) = &title {
            out.push_str("<title>");
            push_escaped(&mut out, title);
            out.push_str("</title>");
        }
        out.push_str("</head><body>");

        if let Some(content) = first_match(&doc, "article").or_else(|| first_match(&doc, "main")) {
            write_element(&mut out, content);
        } else if let Some(body) = first_match(&doc, "body") {
            write_children(&mut out, body);
        }

        out.push_str("</body></html>");
        out
    }
}

fn first_match<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector).next()
}

fn write_element(out: &mut String, element: ElementRef<'_>) {
    let name = element.value().name();
    if NOISE_TAGS.contains(&name) {
        return;
    }

    out.push('<');
    out.push_str(name);
    for (attr, value) in element.value().attrs() {
        // Inline handlers and styling are not content.
        if attr.starts_with("on") || attr == "style" {
            continue;
        }
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        push_escaped(out, value);
        out.push('"');
    }
    out.push('>');

    if VOID_TAGS.contains(&name) {
        return;
    }

    write_children(out, element);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn write_children(out: &mut String, element: ElementRef<'_>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_escaped(out, text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(out, child);
                }
            }
            _ => {}
        }
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}
