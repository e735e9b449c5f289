//! Parser for the `gtmpl` template syntax.
//!
//! - `${expr}` - HTML-escaped expression output
//! - `<%= expr %>` - raw expression output
//! - `#{name k=v k2="quoted" k3=${expr}/}` - empty tag
//! - `#{name ...}body#{/name}` - body tag
//! - `@{Type.method(arg=expr, ...)}` - controller URL
//! - `\$`, `\#`, `\@`, `\<` - literal character

use std::collections::BTreeMap;

use super::ast::{Node, Position, TagNode, TemplateAst};

/// Parse failure with the location it was detected at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub position: Position,
    pub message: String,
}

impl SyntaxError {
    fn new(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

struct Cursor {
    chars: Vec<char>,
    index: usize,
    line: u32,
    column: u32,
}

impl Cursor {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            index: 0,
            line: 1,
            column: 1,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            for _ in s.chars() {
                self.bump();
            }
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    /// Read up to the `}` matching an already consumed `{`, honouring nested
    /// braces and quoted strings. The closing brace is consumed, not returned.
    fn read_balanced(&mut self, open: Position, what: &str) -> Result<String, SyntaxError> {
        let mut out = String::new();
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        loop {
            let Some(c) = self.bump() else {
                return Err(SyntaxError::new(open, format!("unclosed {what}")));
            };
            match quote {
                Some(q) => {
                    if c == '\\' {
                        out.push(c);
                        if let Some(next) = self.bump() {
                            out.push(next);
                        }
                        continue;
                    }
                    if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '"' | '\'' => quote = Some(c),
                    '{' => depth += 1,
                    '}' if depth == 0 => return Ok(out),
                    '}' => depth -= 1,
                    _ => {}
                },
            }
            out.push(c);
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

/// Parse `gtmpl` source.
pub fn parse(source: &str) -> Result<TemplateAst, SyntaxError> {
    let mut cursor = Cursor::new(source);
    let mut nodes: Vec<Node> = Vec::new();
    let mut open_tags: Vec<(TagNode, Vec<Node>)> = Vec::new();
    let mut text = String::new();
    let mut text_start = cursor.position();

    macro_rules! flush_text {
        () => {
            if !text.is_empty() {
                nodes.push(Node::Text {
                    text: std::mem::take(&mut text),
                    position: text_start,
                });
            }
        };
    }

    while let Some(c) = cursor.peek() {
        let position = cursor.position();
        if text.is_empty() {
            text_start = position;
        }

        if c == '\\' && matches!(cursor.peek_at(1), Some('$' | '#' | '@' | '<')) {
            cursor.bump();
            if let Some(escaped) = cursor.bump() {
                text.push(escaped);
            }
        } else if cursor.eat("${") {
            flush_text!();
            let source = cursor.read_balanced(position, "expression")?;
            let source = source.trim();
            if source.is_empty() {
                return Err(SyntaxError::new(position, "empty expression"));
            }
            nodes.push(Node::Expr {
                source: source.to_string(),
                escaped: true,
                position,
            });
        } else if cursor.eat("<%=") {
            flush_text!();
            let mut source = String::new();
            loop {
                if cursor.eat("%>") {
                    break;
                }
                match cursor.bump() {
                    Some(ch) => source.push(ch),
                    None => return Err(SyntaxError::new(position, "unclosed <%= block")),
                }
            }
            let source = source.trim();
            if source.is_empty() {
                return Err(SyntaxError::new(position, "empty expression"));
            }
            nodes.push(Node::Expr {
                source: source.to_string(),
                escaped: false,
                position,
            });
        } else if cursor.starts_with("<%") {
            return Err(SyntaxError::new(
                position,
                "script blocks are not supported, use ${expr} or <%= expr %>",
            ));
        } else if cursor.eat("@{") {
            flush_text!();
            let body = cursor.read_balanced(position, "controller URL")?;
            let (target, args) = parse_url(&body, position)?;
            nodes.push(Node::Url {
                target,
                args,
                position,
            });
        } else if cursor.eat("#{/") {
            flush_text!();
            let name = cursor.read_while(is_name_char);
            cursor.skip_whitespace();
            if !cursor.eat("}") {
                return Err(SyntaxError::new(position, "malformed closing tag"));
            }
            let Some((mut tag, parent)) = open_tags.pop() else {
                return Err(SyntaxError::new(
                    position,
                    format!("closing tag #{{/{name}}} without an opening tag"),
                ));
            };
            if tag.name != name {
                return Err(SyntaxError::new(
                    position,
                    format!("closing tag #{{/{name}}} does not match #{{{}}}", tag.name),
                ));
            }
            tag.body = Some(std::mem::replace(&mut nodes, parent));
            nodes.push(Node::Tag(tag));
        } else if cursor.eat("#{") {
            flush_text!();
            let name = cursor.read_while(is_name_char);
            if name.is_empty() {
                return Err(SyntaxError::new(position, "tag without a name"));
            }
            let (params, has_body) = parse_tag_params(&mut cursor, position)?;
            let tag = TagNode {
                name,
                params,
                body: None,
                position,
            };
            if has_body {
                open_tags.push((tag, std::mem::take(&mut nodes)));
            } else {
                nodes.push(Node::Tag(tag));
            }
        } else {
            text.push(c);
            cursor.bump();
        }
    }
    flush_text!();

    if let Some((tag, _)) = open_tags.pop() {
        return Err(SyntaxError::new(
            tag.position,
            format!("tag #{{{}}} is never closed", tag.name),
        ));
    }
    Ok(TemplateAst { nodes })
}

/// Parameters up to `/}` (empty tag) or `}` (body follows)
fn parse_tag_params(
    cursor: &mut Cursor,
    open: Position,
) -> Result<(BTreeMap<String, String>, bool), SyntaxError> {
    let mut params = BTreeMap::new();
    loop {
        cursor.skip_whitespace();
        if cursor.eat("/}") {
            return Ok((params, false));
        }
        if cursor.eat("}") {
            return Ok((params, true));
        }
        if cursor.peek().is_none() {
            return Err(SyntaxError::new(open, "unclosed tag"));
        }
        let key_position = cursor.position();
        let key = cursor.read_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-'));
        if key.is_empty() {
            return Err(SyntaxError::new(
                key_position,
                format!("unexpected character {:?} in tag", cursor.peek().unwrap_or(' ')),
            ));
        }
        cursor.skip_whitespace();
        let value = if cursor.eat("=") {
            cursor.skip_whitespace();
            read_param_value(cursor, key_position)?
        } else {
            "true".to_string()
        };
        params.insert(key, value);
    }
}

fn read_param_value(cursor: &mut Cursor, at: Position) -> Result<String, SyntaxError> {
    match cursor.peek() {
        Some(q @ ('"' | '\'')) => {
            cursor.bump();
            let mut value = String::new();
            loop {
                match cursor.bump() {
                    Some('\\') => {
                        if let Some(next) = cursor.bump() {
                            value.push(next);
                        }
                    }
                    Some(c) if c == q => return Ok(value),
                    Some(c) => value.push(c),
                    None => return Err(SyntaxError::new(at, "unterminated quoted value")),
                }
            }
        }
        _ if cursor.starts_with("${") => {
            cursor.eat("${");
            let inner = cursor.read_balanced(at, "expression")?;
            Ok(format!("${{{inner}}}"))
        }
        _ => {
            let mut value = String::new();
            while let Some(c) = cursor.peek() {
                if c.is_whitespace() || c == '}' || cursor.starts_with("/}") {
                    break;
                }
                value.push(c);
                cursor.bump();
            }
            if value.is_empty() {
                return Err(SyntaxError::new(at, "missing parameter value"));
            }
            Ok(value)
        }
    }
}

/// `Type.method(a=expr, b=expr)` or `Type.method`
fn parse_url(body: &str, at: Position) -> Result<(String, Vec<(String, String)>), SyntaxError> {
    let body = body.trim();
    let (target, rest) = match body.find('(') {
        Some(open) => {
            let Some(inner) = body[open + 1..].strip_suffix(')') else {
                return Err(SyntaxError::new(at, "unbalanced parentheses in controller URL"));
            };
            (body[..open].trim(), inner)
        }
        None => (body, ""),
    };
    if !target.contains('.') || target.starts_with('.') || target.ends_with('.') {
        return Err(SyntaxError::new(
            at,
            format!("controller URL target '{target}' must be Type.method"),
        ));
    }
    let mut args = Vec::new();
    for part in split_top_level(rest) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((name, expr)) = part.split_once('=') else {
            return Err(SyntaxError::new(
                at,
                format!("controller URL argument '{part}' must be name=expr"),
            ));
        };
        args.push((name.trim().to_string(), expr.trim().to_string()));
    }
    Ok((target.to_string(), args))
}

/// Split on commas outside quotes and brackets
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                ',' if depth == 0 => {
                    parts.push(&s[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    parts.push(&s[start..]);
    parts
}
