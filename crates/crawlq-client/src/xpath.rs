use std::collections::HashMap;

use crawlq_core::error::AppError;
use crawlq_core::traits::Extractor;
use scraper::{ElementRef, Html};

/// Extractor for the location-path subset of XPath 1.0.
///
/// Supported:
/// - absolute paths built from `/` (child) and `//` (descendant) steps
/// - name tests and `*`
/// - predicates `[n]`, `[@attr]`, `[@attr='value']` (any number, applied in order)
/// - a final `text()` or `@attr` step
///
/// Element matches are returned as their outer HTML, text and attribute
/// matches as their string value. Results are in document order without
/// duplicates. Anything outside the subset is rejected with
/// [`AppError::ExtractionError`].
#[derive(Debug, Default, Clone, Copy)]
pub struct XPathExtractor;

impl XPathExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for XPathExtractor {
    fn extract(&self, page: &str, expression: &str) -> Result<Vec<String>, AppError> {
        let path = parse(expression)
            .map_err(|e| AppError::ExtractionError(format!("{expression}: {e}")))?;
        let doc = Html::parse_document(page);
        Ok(evaluate(&doc, &path))
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Any,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    HasAttr(String),
    AttrEquals(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Terminal {
    Text,
    Attr(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LocationPath {
    steps: Vec<Step>,
    terminal: Option<(Axis, Terminal)>,
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn eat(&mut self, token: &str) -> bool {
        match self.rest.strip_prefix(token) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    fn name(&mut self) -> Option<&'a str> {
        let end = self
            .rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(self.rest.len());
        if end == 0 {
            return None;
        }
        let (name, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(name)
    }

    fn until(&mut self, delimiter: char) -> Option<&'a str> {
        let end = self.rest.find(delimiter)?;
        let (inner, rest) = self.rest.split_at(end);
        self.rest = &rest[delimiter.len_utf8()..];
        Some(inner)
    }

    /// Body of a predicate up to its closing `]`, skipping brackets inside quotes.
    fn predicate_body(&mut self) -> Option<&'a str> {
        let mut quote = None;
        for (i, c) in self.rest.char_indices() {
            match (quote, c) {
                (None, '\'' | '"') => quote = Some(c),
                (Some(open), _) if c == open => quote = None,
                (None, ']') => {
                    let (inner, rest) = self.rest.split_at(i);
                    self.rest = &rest[1..];
                    return Some(inner);
                }
                _ => {}
            }
        }
        None
    }
}

fn parse(expression: &str) -> Result<LocationPath, String> {
    let mut cursor = Cursor {
        rest: expression.trim(),
    };
    if !cursor.rest.starts_with('/') {
        return Err("only absolute location paths are supported".into());
    }

    let mut steps = Vec::new();
    while !cursor.is_empty() {
        let axis = if cursor.eat("//") {
            Axis::Descendant
        } else if cursor.eat("/") {
            Axis::Child
        } else {
            return Err(format!("unexpected input at '{}'", cursor.rest));
        };

        if cursor.eat("text()") {
            return finish(cursor, steps, axis, Terminal::Text);
        }
        if cursor.eat("@") {
            let name = cursor.name().ok_or("missing attribute name")?;
            return finish(cursor, steps, axis, Terminal::Attr(name.to_string()));
        }

        let test = if cursor.eat("*") {
            NodeTest::Any
        } else {
            let name = cursor.name().ok_or_else(|| {
                if cursor.is_empty() {
                    "path ends with a separator".to_string()
                } else {
                    format!("unsupported step at '{}'", cursor.rest)
                }
            })?;
            if cursor.rest.starts_with("::") || cursor.rest.starts_with('(') {
                return Err(format!("unsupported axis or function '{name}'"));
            }
            NodeTest::Name(name.to_ascii_lowercase())
        };

        let mut predicates = Vec::new();
        while cursor.eat("[") {
            let inner = cursor.predicate_body().ok_or("unterminated predicate")?;
            predicates.push(parse_predicate(inner.trim())?);
        }

        steps.push(Step {
            axis,
            test,
            predicates,
        });
    }

    Ok(LocationPath {
        steps,
        terminal: None,
    })
}

fn finish(
    cursor: Cursor<'_>,
    steps: Vec<Step>,
    axis: Axis,
    terminal: Terminal,
) -> Result<LocationPath, String> {
    if !cursor.is_empty() {
        return Err(format!("unexpected input after final step: '{}'", cursor.rest));
    }
    Ok(LocationPath {
        steps,
        terminal: Some((axis, terminal)),
    })
}

fn parse_predicate(inner: &str) -> Result<Predicate, String> {
    if let Ok(position) = inner.parse::<usize>() {
        if position == 0 {
            return Err("positions start at 1".into());
        }
        return Ok(Predicate::Position(position));
    }

    let mut cursor = Cursor { rest: inner };
    if !cursor.eat("@") {
        return Err(format!("unsupported predicate '[{inner}]'"));
    }
    let name = cursor.name().ok_or("missing attribute name in predicate")?;
    cursor.rest = cursor.rest.trim_start();
    if cursor.is_empty() {
        return Ok(Predicate::HasAttr(name.to_string()));
    }
    if !cursor.eat("=") {
        return Err(format!("unsupported predicate '[{inner}]'"));
    }
    cursor.rest = cursor.rest.trim();
    let quote = cursor
        .rest
        .chars()
        .next()
        .filter(|c| matches!(c, '"' | '\''))
        .ok_or("attribute value must be quoted")?;
    cursor.rest = &cursor.rest[1..];
    let value = cursor.until(quote).ok_or("unterminated string literal")?;
    if !cursor.rest.trim().is_empty() {
        return Err(format!("unsupported predicate '[{inner}]'"));
    }
    Ok(Predicate::AttrEquals(name.to_string(), value.to_string()))
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn evaluate(doc: &Html, path: &LocationPath) -> Vec<String> {
    let order: HashMap<_, usize> = doc
        .tree
        .root()
        .descendants()
        .enumerate()
        .map(|(i, node)| (node.id(), i))
        .collect();

    // `None` is the document node itself.
    let mut context: Option<Vec<ElementRef<'_>>> = None;
    for step in &path.steps {
        let mut matched = apply_step(doc, context.as_deref(), step);
        matched.sort_by_key(|el| order[&el.id()]);
        matched.dedup_by_key(|el| el.id());
        context = Some(matched);
    }

    let scope: Vec<ElementRef<'_>> = match &context {
        Some(elements) => elements.clone(),
        None => vec![doc.root_element()],
    };

    let mut results: Vec<(usize, String)> = match &path.terminal {
        None => scope
            .iter()
            .map(|el| (order[&el.id()], el.html()))
            .collect(),
        Some((axis, Terminal::Text)) => {
            let mut texts = Vec::new();
            for el in &scope {
                let nodes: Vec<_> = match (axis, context.is_some()) {
                    (Axis::Child, true) => el.children().collect(),
                    // `/text()` on the document: the root has no text children.
                    (Axis::Child, false) => Vec::new(),
                    (Axis::Descendant, _) => el.descendants().collect(),
                };
                for node in nodes {
                    if let Some(text) = node.value().as_text() {
                        let text: &str = text;
                        texts.push((order[&node.id()], text.to_owned()));
                    }
                }
            }
            texts
        }
        Some((axis, Terminal::Attr(name))) => {
            let mut values = Vec::new();
            for el in &scope {
                let candidates: Vec<ElementRef<'_>> = match (axis, context.is_some()) {
                    (Axis::Child, true) => vec![*el],
                    (Axis::Child, false) => Vec::new(),
                    (Axis::Descendant, _) => el.descendants().filter_map(ElementRef::wrap).collect(),
                };
                for candidate in candidates {
                    if let Some(value) = candidate.value().attr(name) {
                        values.push((order[&candidate.id()], value.to_string()));
                    }
                }
            }
            values
        }
    };

    results.sort_by_key(|(position, _)| *position);
    results.dedup_by_key(|(position, _)| *position);
    results.into_iter().map(|(_, value)| value).collect()
}

fn apply_step<'a>(
    doc: &'a Html,
    context: Option<&[ElementRef<'a>]>,
    step: &Step,
) -> Vec<ElementRef<'a>> {
    // Each group holds the matching children of one parent, so positional
    // predicates count siblings the way XPath does.
    let mut groups: Vec<Vec<ElementRef<'a>>> = Vec::new();
    let root = doc.root_element();

    match context {
        None => {
            groups.push(vec![root]);
            if step.axis == Axis::Descendant {
                for parent in root.descendants().filter_map(ElementRef::wrap) {
                    groups.push(parent.children().filter_map(ElementRef::wrap).collect());
                }
            }
        }
        Some(elements) => {
            for el in elements {
                match step.axis {
                    Axis::Child => {
                        groups.push(el.children().filter_map(ElementRef::wrap).collect());
                    }
                    Axis::Descendant => {
                        for parent in el.descendants().filter_map(ElementRef::wrap) {
                            groups.push(parent.children().filter_map(ElementRef::wrap).collect());
                        }
                    }
                }
            }
        }
    }

    groups
        .into_iter()
        .flat_map(|group| {
            let mut matched: Vec<ElementRef<'a>> =
                group.into_iter().filter(|el| test_matches(&step.test, el)).collect();
            for predicate in &step.predicates {
                matched = apply_predicate(predicate, matched);
            }
            matched
        })
        .collect()
}

fn test_matches(test: &NodeTest, el: &ElementRef<'_>) -> bool {
    match test {
        NodeTest::Any => true,
        NodeTest::Name(name) => el.value().name().eq_ignore_ascii_case(name),
    }
}

fn apply_predicate<'a>(predicate: &Predicate, elements: Vec<ElementRef<'a>>) -> Vec<ElementRef<'a>> {
    match predicate {
        Predicate::Position(n) => elements.into_iter().nth(n - 1).into_iter().collect(),
        Predicate::HasAttr(name) => elements
            .into_iter()
            .filter(|el| el.value().attr(name).is_some())
            .collect(),
        Predicate::AttrEquals(name, value) => elements
            .into_iter()
            .filter(|el| el.value().attr(name) == Some(value.as_str()))
            .collect(),
    }
}
