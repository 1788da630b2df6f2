//! Template parser.
//!
//! Assembles scanned chunks into a `Program`: block structure (`if`/`for`
//! bodies, `} else {`, closing `}`) is matched over the chunk stream, and
//! tag contents are parsed with winnow combinators. Hole tags are not
//! descended into; their source span (including a block body, when the tag
//! opens one) is captured verbatim as re-renderable input.

use winnow::combinator::{alt, delimited, not, opt, peek, preceded, separated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{any, take_while};

use crate::compiler::ast::{BinOp, Expr, Node, Program};
use crate::compiler::error::ParseError;
use crate::compiler::lexer::{Chunk, Tag, TagKind, scan};

/// Parse a template source string into a compiled program.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let chunks = scan(source)?;
    let mut parser = BlockParser {
        source,
        chunks: &chunks,
        pos: 0,
    };
    let (nodes, term) = parser.parse_nodes()?;
    match term {
        Terminator::Eof => Ok(Program { nodes }),
        Terminator::Close(line) | Terminator::ElseOpen(line) => Err(ParseError::Syntax {
            line,
            column: 1,
            message: "unmatched closing tag".to_string(),
        }),
    }
}

/// How a run of nodes ended.
enum Terminator {
    Eof,
    /// A bare `}` tag, carrying its line.
    Close(usize),
    /// A `} else {` tag, carrying its line.
    ElseOpen(usize),
}

struct BlockParser<'a> {
    source: &'a str,
    chunks: &'a [Chunk],
    pos: usize,
}

impl BlockParser<'_> {
    fn parse_nodes(&mut self) -> Result<(Vec<Node>, Terminator), ParseError> {
        let mut nodes = Vec::new();
        while self.pos < self.chunks.len() {
            match &self.chunks[self.pos] {
                Chunk::Text(text) => {
                    nodes.push(Node::Text(text.clone()));
                    self.pos += 1;
                }
                Chunk::Tag(tag) => {
                    let trimmed = tag.inner.trim();
                    if trimmed.is_empty() {
                        self.pos += 1;
                    } else if trimmed == "}" {
                        self.pos += 1;
                        return Ok((nodes, Terminator::Close(tag.line)));
                    } else if is_else_open(trimmed) {
                        self.pos += 1;
                        return Ok((nodes, Terminator::ElseOpen(tag.line)));
                    } else {
                        let tag = tag.clone();
                        nodes.push(self.parse_tag(&tag)?);
                    }
                }
            }
        }
        Ok((nodes, Terminator::Eof))
    }

    /// Parse the tag at the current position into a node, consuming any
    /// block body it opens.
    fn parse_tag(&mut self, tag: &Tag) -> Result<Node, ParseError> {
        let trimmed = tag.inner.trim();
        if tag.kind == TagKind::Hole {
            let end = if trimmed.ends_with('{') {
                self.pos += 1;
                self.skip_hole_block(tag)?
            } else {
                self.pos += 1;
                tag.end
            };
            // Rebuild the tag (and body) as an output tag: `<%H` becomes
            // `<%=`, so the hole re-renders through the normal path.
            let input = format!("<%={}", &self.source[tag.start + 3..end]);
            return Ok(Node::Hole {
                input,
                line: tag.line,
            });
        }

        let line = tag.line;
        if keyword(trimmed, "let") {
            let Some((name, value)) = run(let_stmt, trimmed) else {
                return Err(syntax_error(tag, format!("invalid let statement: {trimmed}")));
            };
            self.pos += 1;
            return Ok(Node::Let {
                name,
                expr: value,
                line,
            });
        }
        if keyword(trimmed, "if") {
            let Some(cond) = run(if_header, trimmed) else {
                return Err(syntax_error(tag, format!("invalid if block: {trimmed}")));
            };
            self.pos += 1;
            let (then, term) = self.parse_nodes()?;
            let otherwise = match term {
                Terminator::ElseOpen(_) => {
                    let (nodes, term) = self.parse_nodes()?;
                    if !matches!(term, Terminator::Close(_)) {
                        return Err(syntax_error(tag, "unclosed else block"));
                    }
                    nodes
                }
                Terminator::Close(_) => Vec::new(),
                Terminator::Eof => return Err(syntax_error(tag, "unclosed if block")),
            };
            return Ok(Node::If {
                cond,
                then,
                otherwise,
                emit: tag.kind == TagKind::Output,
                line,
            });
        }
        if keyword(trimmed, "for") {
            let Some((index, item, iterable)) = run(for_header, trimmed) else {
                return Err(syntax_error(tag, format!("invalid for block: {trimmed}")));
            };
            self.pos += 1;
            let (body, term) = self.parse_nodes()?;
            if !matches!(term, Terminator::Close(_)) {
                return Err(syntax_error(tag, "unclosed for block"));
            }
            return Ok(Node::For {
                index,
                item,
                iterable,
                body,
                emit: tag.kind == TagKind::Output,
                line,
            });
        }
        if trimmed.ends_with('{') {
            return Err(syntax_error(tag, format!("unexpected block: {trimmed}")));
        }
        if let Some((name, value)) = run(assign_stmt, trimmed) {
            self.pos += 1;
            return Ok(Node::Assign {
                name,
                expr: value,
                line,
            });
        }
        let Some(value) = run(expr, trimmed) else {
            return Err(syntax_error(tag, format!("invalid expression: {trimmed}")));
        };
        self.pos += 1;
        match tag.kind {
            TagKind::Output => Ok(Node::Output { expr: value, line }),
            _ => Ok(Node::ExprStmt { expr: value, line }),
        }
    }

    /// Skip the chunks of a hole's block body, balancing nested blocks,
    /// and return the byte offset one past its closing tag.
    fn skip_hole_block(&mut self, open_tag: &Tag) -> Result<usize, ParseError> {
        let mut depth = 1;
        while self.pos < self.chunks.len() {
            if let Chunk::Tag(tag) = &self.chunks[self.pos] {
                let trimmed = tag.inner.trim();
                let closes = trimmed.starts_with('}');
                let opens = trimmed.ends_with('{');
                if closes {
                    depth -= 1;
                }
                if depth == 0 && closes && !opens {
                    let end = tag.end;
                    self.pos += 1;
                    return Ok(end);
                }
                if opens {
                    depth += 1;
                }
            }
            self.pos += 1;
        }
        Err(syntax_error(open_tag, "unclosed hole block"))
    }
}

fn syntax_error(tag: &Tag, message: impl Into<String>) -> ParseError {
    ParseError::Syntax {
        line: tag.line,
        column: 1,
        message: message.into(),
    }
}

/// `} else {`, tolerant of inner spacing.
fn is_else_open(trimmed: &str) -> bool {
    let Some(rest) = trimmed.strip_prefix('}') else {
        return false;
    };
    let Some(rest) = rest.trim_start().strip_prefix("else") else {
        return false;
    };
    rest.trim() == "{"
}

/// Does `inner` start with `kw` as a standalone word?
fn keyword(inner: &str, kw: &str) -> bool {
    match inner.strip_prefix(kw) {
        Some("") => true,
        Some(rest) => !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'),
        None => false,
    }
}

/// Run a winnow parser over a whole tag body; trailing whitespace is the
/// only remainder allowed.
fn run<T>(parser: fn(&mut &str) -> ModalResult<T>, inner: &str) -> Option<T> {
    let mut rest = inner;
    let value = parser(&mut rest).ok()?;
    if rest.trim().is_empty() { Some(value) } else { None }
}

// === Tag-body grammar ===

fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., char::is_whitespace).void().parse_next(input)
}

fn ws1(input: &mut &str) -> ModalResult<()> {
    take_while(1.., char::is_whitespace).void().parse_next(input)
}

/// Parse an identifier: alphabetic or `_` start, alphanumeric or `_` rest.
fn identifier(input: &mut &str) -> ModalResult<String> {
    let first = peek(any).parse_next(input)?;
    if !(first.is_alphabetic() || first == '_') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    let _ = any.parse_next(input)?;
    let rest: &str =
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_').parse_next(input)?;
    let mut name = String::with_capacity(1 + rest.len());
    name.push(first);
    name.push_str(rest);
    Ok(name)
}

/// `let name = expr`
fn let_stmt(input: &mut &str) -> ModalResult<(String, Expr)> {
    let _ = (ws, "let", ws1).parse_next(input)?;
    let name = identifier.parse_next(input)?;
    let _ = (ws, '=', ws).parse_next(input)?;
    let value = expr.parse_next(input)?;
    Ok((name, value))
}

/// `name = expr` (but never `name == expr`)
fn assign_stmt(input: &mut &str) -> ModalResult<(String, Expr)> {
    let _ = ws(input)?;
    let name = identifier.parse_next(input)?;
    let _ = (ws, '=').parse_next(input)?;
    not('=').parse_next(input)?;
    let value = preceded(ws, expr).parse_next(input)?;
    Ok((name, value))
}

/// `if (cond) {`
fn if_header(input: &mut &str) -> ModalResult<Expr> {
    let _ = (ws, "if", ws, '(').parse_next(input)?;
    let cond = preceded(ws, expr).parse_next(input)?;
    let _ = (ws, ')', ws, '{', ws).parse_next(input)?;
    Ok(cond)
}

/// `for (item) in expr {` or `for (index, item) in expr {`
fn for_header(input: &mut &str) -> ModalResult<(Option<String>, String, Expr)> {
    let _ = (ws, "for", ws, '(').parse_next(input)?;
    let first = preceded(ws, identifier).parse_next(input)?;
    let second = opt(preceded((ws, ',', ws), identifier)).parse_next(input)?;
    let _ = (ws, ')', ws, "in", ws1).parse_next(input)?;
    let iterable = expr.parse_next(input)?;
    let _ = (ws, '{', ws).parse_next(input)?;
    match second {
        Some(item) => Ok((Some(first), item, iterable)),
        None => Ok((None, first, iterable)),
    }
}

/// Comparison tier, the loosest-binding operators.
fn expr(input: &mut &str) -> ModalResult<Expr> {
    let mut node = additive.parse_next(input)?;
    while let Some(op) = opt(preceded(ws, cmp_op)).parse_next(input)? {
        let rhs = preceded(ws, additive).parse_next(input)?;
        node = Expr::Infix {
            op,
            left: Box::new(node),
            right: Box::new(rhs),
        };
    }
    Ok(node)
}

fn cmp_op(input: &mut &str) -> ModalResult<BinOp> {
    alt((
        "==".value(BinOp::Eq),
        "!=".value(BinOp::Ne),
        ">=".value(BinOp::Ge),
        "<=".value(BinOp::Le),
        '>'.value(BinOp::Gt),
        '<'.value(BinOp::Lt),
    ))
    .parse_next(input)
}

fn additive(input: &mut &str) -> ModalResult<Expr> {
    let mut node = multiplicative.parse_next(input)?;
    while let Some(op) =
        opt(preceded(ws, alt(('+'.value(BinOp::Add), '-'.value(BinOp::Sub))))).parse_next(input)?
    {
        let rhs = preceded(ws, multiplicative).parse_next(input)?;
        node = Expr::Infix {
            op,
            left: Box::new(node),
            right: Box::new(rhs),
        };
    }
    Ok(node)
}

fn multiplicative(input: &mut &str) -> ModalResult<Expr> {
    let mut node = primary.parse_next(input)?;
    while let Some(op) =
        opt(preceded(ws, alt(('*'.value(BinOp::Mul), '/'.value(BinOp::Div))))).parse_next(input)?
    {
        let rhs = preceded(ws, primary).parse_next(input)?;
        node = Expr::Infix {
            op,
            left: Box::new(node),
            right: Box::new(rhs),
        };
    }
    Ok(node)
}

fn primary(input: &mut &str) -> ModalResult<Expr> {
    preceded(
        ws,
        alt((
            paren_expr,
            string_literal,
            number_literal,
            array_literal,
            map_literal,
            call_or_ident,
        )),
    )
    .parse_next(input)
}

fn paren_expr(input: &mut &str) -> ModalResult<Expr> {
    delimited('(', delimited(ws, expr, ws), ')').parse_next(input)
}

fn string_literal(input: &mut &str) -> ModalResult<Expr> {
    quoted_string.map(Expr::Str).parse_next(input)
}

/// Double-quoted string with `\"`, `\\`, `\n`, `\r`, `\t` escapes.
fn quoted_string(input: &mut &str) -> ModalResult<String> {
    let _ = '"'.parse_next(input)?;
    let mut out = String::new();
    loop {
        let c = any.parse_next(input)?;
        match c {
            '"' => return Ok(out),
            '\\' => {
                let escaped = any.parse_next(input)?;
                out.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
            }
            other => out.push(other),
        }
    }
}

fn number_literal(input: &mut &str) -> ModalResult<Expr> {
    let digits: &str = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let fraction: Option<&str> =
        opt(preceded('.', take_while(1.., |c: char| c.is_ascii_digit()))).parse_next(input)?;
    match fraction {
        Some(frac) => format!("{digits}.{frac}")
            .parse::<f64>()
            .map(Expr::Float)
            .map_err(|_| ErrMode::Backtrack(ContextError::new())),
        None => digits
            .parse::<i64>()
            .map(Expr::Number)
            .map_err(|_| ErrMode::Backtrack(ContextError::new())),
    }
}

fn array_literal(input: &mut &str) -> ModalResult<Expr> {
    let _ = '['.parse_next(input)?;
    let items: Vec<Expr> =
        separated(0.., preceded(ws, expr), preceded(ws, ',')).parse_next(input)?;
    let _ = (ws, ']').parse_next(input)?;
    Ok(Expr::Array(items))
}

fn map_literal(input: &mut &str) -> ModalResult<Expr> {
    let _ = '{'.parse_next(input)?;
    let entries: Vec<(String, Expr)> =
        separated(0.., map_entry, preceded(ws, ',')).parse_next(input)?;
    let _ = (ws, '}').parse_next(input)?;
    Ok(Expr::Map(entries))
}

fn map_entry(input: &mut &str) -> ModalResult<(String, Expr)> {
    let _ = ws(input)?;
    let key = alt((identifier, quoted_string)).parse_next(input)?;
    let _ = (ws, ':', ws).parse_next(input)?;
    let value = expr.parse_next(input)?;
    Ok((key, value))
}

fn call_or_ident(input: &mut &str) -> ModalResult<Expr> {
    let name = identifier.parse_next(input)?;
    match name.as_str() {
        "true" => return Ok(Expr::Bool(true)),
        "false" => return Ok(Expr::Bool(false)),
        _ => {}
    }
    if opt(peek(preceded(ws, '('))).parse_next(input)?.is_some() {
        let _ = (ws, '(').parse_next(input)?;
        let args: Vec<Expr> =
            separated(0.., preceded(ws, expr), preceded(ws, ',')).parse_next(input)?;
        let _ = (ws, ')').parse_next(input)?;
        return Ok(Expr::Call { name, args });
    }
    Ok(Expr::Ident(name))
}
