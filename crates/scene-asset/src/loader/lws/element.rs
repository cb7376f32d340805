use log::debug;

use super::LwsLoadError;

/// One line of a scene file: a keyword, the rest of the line and the lines
/// of the `{ ... }` block it opens, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub key: String,
    pub value: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            children: Vec::new(),
        }
    }
}

fn split_line(line: &str) -> (&str, &str) {
    match line.split_once([' ', '\t']) {
        Some((key, value)) => (key, value.trim()),
        None => (line, ""),
    }
}

/// Parses the block structure of a scene file into a tree below an unnamed root.
///
/// Plugin sections up to their `EndPlugin` line are kept as a single
/// element without children, since their content follows no common syntax.
/// A closing brace at the top level ends the document.
pub fn parse(text: &str, max_depth: usize) -> Result<Element, LwsLoadError> {
    let mut stack = vec![Element::default()];
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('}') {
            if stack.len() == 1 {
                break;
            }
            close_block(&mut stack);
            continue;
        }

        let (opens_block, line) = match line.strip_prefix('{') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, line),
        };
        let (key, value) = split_line(line);
        let element = Element::new(key, value);

        if key == "Plugin" {
            debug!("LWS: skipping over plugin-specific data");
            for line in lines.by_ref() {
                if line.trim_start().starts_with("EndPlugin") {
                    break;
                }
            }
            push_child(&mut stack, element);
        } else if opens_block {
            if stack.len() > max_depth {
                return Err(LwsLoadError::TooDeep(max_depth));
            }
            stack.push(element);
        } else {
            push_child(&mut stack, element);
        }
    }

    while stack.len() > 1 {
        close_block(&mut stack);
    }
    Ok(stack.pop().unwrap_or_default())
}

fn push_child(stack: &mut [Element], element: Element) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    }
}

fn close_block(stack: &mut Vec<Element>) {
    if let Some(block) = stack.pop() {
        push_child(stack, block);
    }
}
