//! Builds a syntax tree from lexer tokens.

use std::collections::HashSet;

use super::expr::{self, Expr, ExprParser, Tok};
use super::lexer::{Span, TokenKind, tokenize};
use crate::domain::DomainError;

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Text(String),
    Output(Expr),
    If {
        arms: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    Block {
        name: String,
        body: Vec<Node>,
    },
    Include {
        name: String,
        span: Span,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        span: Span,
        /// File the call appears in, for errors raised after inlining.
        origin: String,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone)]
pub(crate) struct Document {
    pub extends: Option<(String, Span)>,
    pub macros: Vec<MacroDef>,
    pub nodes: Vec<Node>,
}

struct Closing {
    keyword: String,
    rest: String,
    span: Span,
}

struct Parser<'a> {
    path: &'a str,
    tokens: std::vec::IntoIter<super::lexer::Token>,
    depth: usize,
    in_macro: bool,
    extends: Option<(String, Span)>,
    macros: Vec<MacroDef>,
    blocks: HashSet<String>,
}

pub(crate) fn parse(src: &str, path: &str) -> Result<Document, DomainError> {
    let mut parser = Parser {
        path,
        tokens: tokenize(src, path)?.into_iter(),
        depth: 0,
        in_macro: false,
        extends: None,
        macros: Vec::new(),
        blocks: HashSet::new(),
    };
    let (nodes, _) = parser.parse_until(&[])?;
    Ok(Document {
        extends: parser.extends,
        macros: parser.macros,
        nodes,
    })
}

fn split_tag(src: &str) -> (&str, &str) {
    match src.find(char::is_whitespace) {
        Some(i) => (&src[..i], src[i..].trim()),
        None => (src, ""),
    }
}

impl Parser<'_> {
    fn error(&self, span: Span, message: impl Into<String>) -> DomainError {
        DomainError::TemplateSyntax {
            path: self.path.to_string(),
            line: span.line,
            column: span.column,
            message: message.into(),
        }
    }

    fn expr(&self, src: &str, span: Span) -> Result<Expr, DomainError> {
        expr::parse(src).map_err(|m| self.error(span, m))
    }

    /// Parse nodes until one of the `stop` tags (returned) or end of input.
    fn parse_until(&mut self, stop: &[&str]) -> Result<(Vec<Node>, Option<Closing>), DomainError> {
        let mut nodes = Vec::new();

        while let Some(token) = self.tokens.next() {
            let span = token.span;
            match token.kind {
                TokenKind::Text(text) => nodes.push(Node::Text(text)),
                TokenKind::Output(src) => nodes.push(Node::Output(self.expr(&src, span)?)),
                TokenKind::Tag(src) => {
                    let (keyword, rest) = split_tag(&src);
                    if stop.contains(&keyword) {
                        return Ok((
                            nodes,
                            Some(Closing {
                                keyword: keyword.to_string(),
                                rest: rest.to_string(),
                                span,
                            }),
                        ));
                    }
                    match keyword {
                        "if" => nodes.push(self.parse_if(rest, span)?),
                        "block" => nodes.push(self.parse_block(rest, span)?),
                        "macro" => self.parse_macro(rest, span)?,
                        "call" => nodes.push(self.parse_call(rest, span)?),
                        "include" => nodes.push(Node::Include {
                            name: self.quoted_arg(rest, span)?,
                            span,
                        }),
                        "extends" => {
                            let leading_text_only = nodes
                                .iter()
                                .all(|n| matches!(n, Node::Text(t) if t.trim().is_empty()));
                            if self.depth > 0 || !leading_text_only || self.extends.is_some() {
                                return Err(self.error(
                                    span,
                                    "'extends' must be the first tag in the file",
                                ));
                            }
                            self.extends = Some((self.quoted_arg(rest, span)?, span));
                        }
                        "elif" | "else" | "endif" | "endblock" | "endmacro" => {
                            return Err(self.error(span, format!("unexpected '{keyword}'")));
                        }
                        other => {
                            return Err(self.error(span, format!("unknown tag '{other}'")));
                        }
                    }
                }
            }
        }

        Ok((nodes, None))
    }

    fn nested(&mut self, stop: &[&str], open: Span, what: &str) -> Result<(Vec<Node>, Closing), DomainError> {
        self.depth += 1;
        let (body, closing) = self.parse_until(stop)?;
        self.depth -= 1;
        let closing = closing.ok_or_else(|| self.error(open, format!("unclosed '{what}'")))?;
        Ok((body, closing))
    }

    fn no_args(&self, closing: &Closing) -> Result<(), DomainError> {
        if closing.rest.is_empty() {
            Ok(())
        } else {
            Err(self.error(
                closing.span,
                format!("'{}' takes no arguments", closing.keyword),
            ))
        }
    }

    fn parse_if(&mut self, cond: &str, span: Span) -> Result<Node, DomainError> {
        let mut arms = Vec::new();
        let mut cond = self.expr(cond, span)?;

        loop {
            let (body, closing) = self.nested(&["elif", "else", "endif"], span, "if")?;
            arms.push((cond, body));
            match closing.keyword.as_str() {
                "elif" => cond = self.expr(&closing.rest, closing.span)?,
                "else" => {
                    self.no_args(&closing)?;
                    let (otherwise, end) = self.nested(&["endif"], span, "if")?;
                    self.no_args(&end)?;
                    return Ok(Node::If { arms, otherwise });
                }
                _ => {
                    self.no_args(&closing)?;
                    return Ok(Node::If {
                        arms,
                        otherwise: Vec::new(),
                    });
                }
            }
        }
    }

    fn parse_block(&mut self, rest: &str, span: Span) -> Result<Node, DomainError> {
        let name = self.single_ident(rest, span, "block")?;
        if !self.blocks.insert(name.clone()) {
            return Err(self.error(span, format!("block '{name}' defined twice")));
        }
        let (body, end) = self.nested(&["endblock"], span, "block")?;
        if !end.rest.is_empty() && end.rest != name {
            return Err(self.error(
                end.span,
                format!("'endblock {}' closes block '{name}'", end.rest),
            ));
        }
        Ok(Node::Block { name, body })
    }

    fn parse_macro(&mut self, rest: &str, span: Span) -> Result<(), DomainError> {
        if self.in_macro {
            return Err(self.error(span, "macros cannot be defined inside macros"));
        }
        let (name, params) = self.signature(rest).map_err(|m| self.error(span, m))?;
        if self.macros.iter().any(|m| m.name == name) {
            return Err(self.error(span, format!("macro '{name}' defined twice")));
        }

        self.in_macro = true;
        let parsed = self.nested(&["endmacro"], span, "macro");
        self.in_macro = false;
        let (body, end) = parsed?;
        self.no_args(&end)?;

        self.macros.push(MacroDef { name, params, body });
        Ok(())
    }

    fn signature(&self, rest: &str) -> Result<(String, Vec<String>), String> {
        let mut p = ExprParser::new(rest)?;
        let name = p.expect_ident()?;
        let mut params = Vec::new();
        if p.eat(&Tok::LParen) && !p.eat(&Tok::RParen) {
            loop {
                let param = p.expect_ident()?;
                if params.contains(&param) {
                    return Err(format!("duplicate parameter '{param}'"));
                }
                params.push(param);
                if p.eat(&Tok::Comma) {
                    continue;
                }
                p.expect(Tok::RParen)?;
                break;
            }
        }
        p.expect_end()?;
        Ok((name, params))
    }

    fn parse_call(&mut self, rest: &str, span: Span) -> Result<Node, DomainError> {
        let parse = || -> Result<(String, Vec<Expr>), String> {
            let mut p = ExprParser::new(rest)?;
            let name = p.expect_ident()?;
            let args = if p.eat(&Tok::LParen) {
                p.parse_args()?
            } else {
                Vec::new()
            };
            p.expect_end()?;
            Ok((name, args))
        };
        let (name, args) = parse().map_err(|m| self.error(span, m))?;
        Ok(Node::Call {
            name,
            args,
            span,
            origin: self.path.to_string(),
        })
    }

    fn quoted_arg(&self, rest: &str, span: Span) -> Result<String, DomainError> {
        let parse = || -> Result<String, String> {
            let mut p = ExprParser::new(rest)?;
            let name = p.expect_string()?;
            p.expect_end()?;
            Ok(name)
        };
        parse().map_err(|m| self.error(span, m))
    }

    fn single_ident(&self, rest: &str, span: Span, tag: &str) -> Result<String, DomainError> {
        let parse = || -> Result<String, String> {
            let mut p = ExprParser::new(rest)?;
            let name = p.expect_ident()?;
            p.expect_end()?;
            Ok(name)
        };
        parse().map_err(|m| self.error(span, format!("'{tag}': {m}")))
    }
}
