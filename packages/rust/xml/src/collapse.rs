//! Line-break collapsing over text segments.

use std::borrow::Cow;

use crate::document::{Element, Node, XmlDocument};

/// Replace `\r\n`, then lone `\r`, then lone `\n` with one space each.
///
/// `\r\n` goes first so a Windows line break yields one space, not two.
pub fn collapse_line_breaks(text: &str) -> Cow<'_, str> {
    if !text.contains(['\r', '\n']) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", " ").replace(['\r', '\n'], " "))
}

/// A segment is collapsed only when a line break survives right-trimming,
/// so indentation between elements is left alone.
pub fn needs_collapse(text: &str) -> bool {
    text.trim_end().contains(['\r', '\n'])
}

impl XmlDocument {
    /// Collapse line breaks in every text segment that carries content.
    ///
    /// Returns the number of segments rewritten.
    pub fn collapse_line_breaks(&mut self) -> usize {
        let mut changed = 0;
        let mut stack: Vec<&mut Element> = vec![&mut self.root];
        while let Some(element) = stack.pop() {
            for child in element.children.iter_mut() {
                match child {
                    Node::Text(text) if needs_collapse(text) => {
                        *text = collapse_line_breaks(text).into_owned();
                        changed += 1;
                    }
                    Node::Element(inner) => stack.push(inner),
                    _ => {}
                }
            }
        }
        changed
    }
}
