use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 1-based source location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Tag invocation: `#{name k=v/}` or `#{name k=v}body#{/name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNode {
    pub name: String,
    pub params: BTreeMap<String, String>,
    /// `None` for empty tags, `Some` (possibly empty) for body tags
    pub body: Option<Vec<Node>>,
    pub position: Position,
}

/// Template tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text {
        text: String,
        position: Position,
    },
    /// `${expr}` (escaped) or `<%= expr %>` (raw)
    Expr {
        source: String,
        escaped: bool,
        position: Position,
    },
    /// `@{Type.method(name=expr, ...)}`
    Url {
        target: String,
        args: Vec<(String, String)>,
        position: Position,
    },
    Tag(TagNode),
}

impl Node {
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Node::Text { position, .. }
            | Node::Expr { position, .. }
            | Node::Url { position, .. } => *position,
            Node::Tag(tag) => tag.position,
        }
    }
}

/// Parsed template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateAst {
    pub nodes: Vec<Node>,
}

impl TemplateAst {
    /// Every node in document order, descending into tag bodies
    #[must_use]
    pub fn walk(&self) -> Vec<&Node> {
        let mut found = Vec::new();
        let mut pending: Vec<std::slice::Iter<'_, Node>> = vec![self.nodes.iter()];
        while let Some(iter) = pending.last_mut() {
            match iter.next() {
                Some(node) => {
                    found.push(node);
                    if let Node::Tag(TagNode { body: Some(body), .. }) = node {
                        pending.push(body.iter());
                    }
                }
                None => {
                    pending.pop();
                }
            }
        }
        found
    }

    /// Every tag in document order
    #[must_use]
    pub fn tags(&self) -> Vec<&TagNode> {
        self.walk()
            .into_iter()
            .filter_map(|node| match node {
                Node::Tag(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }

    /// Visit every tag mutably in document order, stopping at the first error
    pub fn visit_tags_mut<E>(
        &mut self,
        mut visit: impl FnMut(&mut TagNode) -> Result<(), E>,
    ) -> Result<(), E> {
        let mut pending: Vec<std::slice::IterMut<'_, Node>> = vec![self.nodes.iter_mut()];
        while let Some(iter) = pending.last_mut() {
            match iter.next() {
                Some(Node::Tag(tag)) => {
                    visit(tag)?;
                    if let Some(body) = tag.body.as_mut() {
                        pending.push(body.iter_mut());
                    }
                }
                Some(_) => {}
                None => {
                    pending.pop();
                }
            }
        }
        Ok(())
    }
}
