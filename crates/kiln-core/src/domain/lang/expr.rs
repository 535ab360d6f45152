//! Expression grammar used inside `{{ }}` and `{% if %}`.
//!
//! ```text
//! or      := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | compare
//! compare := filtered (("==" | "!=") filtered)?
//! filtered:= primary ("|" ident ("(" args ")")?)*
//! primary := ident | string | int | "true" | "false" | "(" or ")"
//! ```

use std::collections::BTreeSet;

use super::filters::Filter;
use crate::domain::VariableValue;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(VariableValue),
    Var(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Filter {
        filter: Filter,
        input: Box<Expr>,
        args: Vec<Expr>,
    },
}

/// Variable lookup during evaluation; `None` means undefined.
pub(crate) trait Lookup {
    fn lookup(&self, name: &str) -> Option<VariableValue>;
}

impl Expr {
    pub(crate) fn eval(&self, scope: &dyn Lookup) -> Option<VariableValue> {
        match self {
            Self::Literal(v) => Some(v.clone()),
            Self::Var(name) => scope.lookup(name),
            Self::Not(inner) => Some(VariableValue::Bool(!truthy(&inner.eval(scope)))),
            Self::And(l, r) => Some(VariableValue::Bool(
                truthy(&l.eval(scope)) && truthy(&r.eval(scope)),
            )),
            Self::Or(l, r) => Some(VariableValue::Bool(
                truthy(&l.eval(scope)) || truthy(&r.eval(scope)),
            )),
            Self::Eq(l, r) => Some(VariableValue::Bool(equal(&l.eval(scope), &r.eval(scope)))),
            Self::Ne(l, r) => Some(VariableValue::Bool(!equal(&l.eval(scope), &r.eval(scope)))),
            Self::Filter {
                filter,
                input,
                args,
            } => {
                let args: Vec<_> = args.iter().map(|a| a.eval(scope)).collect();
                filter.apply(input.eval(scope), &args)
            }
        }
    }

    pub(crate) fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Literal(_) => {}
            Self::Var(name) => {
                out.insert(name.clone());
            }
            Self::Not(inner) => inner.collect_variables(out),
            Self::And(l, r) | Self::Or(l, r) | Self::Eq(l, r) | Self::Ne(l, r) => {
                l.collect_variables(out);
                r.collect_variables(out);
            }
            Self::Filter { input, args, .. } => {
                input.collect_variables(out);
                for a in args {
                    a.collect_variables(out);
                }
            }
        }
    }
}

pub(crate) fn truthy(value: &Option<VariableValue>) -> bool {
    value.as_ref().is_some_and(VariableValue::is_truthy)
}

fn equal(l: &Option<VariableValue>, r: &Option<VariableValue>) -> bool {
    match (l, r) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b || a.to_string() == b.to_string(),
        _ => false,
    }
}

// ── tokens ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    EqEq,
    NotEq,
    Pipe,
    LParen,
    RParen,
    Comma,
}

pub(crate) fn lex(src: &str) -> Result<Vec<Tok>, String> {
    let mut out = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(i, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                out.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                out.push(Tok::RParen);
            }
            ',' => {
                chars.next();
                out.push(Tok::Comma);
            }
            '|' => {
                chars.next();
                out.push(Tok::Pipe);
            }
            '=' | '!' => {
                chars.next();
                match chars.next() {
                    Some((_, '=')) => out.push(if c == '=' { Tok::EqEq } else { Tok::NotEq }),
                    _ => return Err(format!("expected '{c}=' at offset {i}")),
                }
            }
            '"' | '\'' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, 'n')) => s.push('\n'),
                            Some((_, 't')) => s.push('\t'),
                            Some((_, other)) => s.push(other),
                            None => break,
                        },
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => s.push(ch),
                    }
                }
                if !closed {
                    return Err("unterminated string literal".into());
                }
                out.push(Tok::Str(s));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut s = String::new();
                s.push(c);
                chars.next();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = s
                    .parse::<i64>()
                    .map_err(|_| format!("invalid number '{s}'"))?;
                out.push(Tok::Int(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push(Tok::Ident(s));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(out)
}

// ── parser ──────────────────────────────────────────────────────────────────

/// Cursor over expression tokens; also used to parse tag arguments.
pub(crate) struct ExprParser {
    toks: Vec<Tok>,
    pos: usize,
}

impl ExprParser {
    pub(crate) fn new(src: &str) -> Result<Self, String> {
        Ok(Self {
            toks: lex(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Ident(s)) if s == kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    pub(crate) fn expect_end(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(format!("unexpected {} after expression", describe(t))),
        }
    }

    pub(crate) fn expect(&mut self, tok: Tok) -> Result<(), String> {
        match self.bump() {
            Some(t) if t == tok => Ok(()),
            Some(t) => Err(format!("expected {}, found {}", describe(&tok), describe(&t))),
            None => Err(format!("expected {}", describe(&tok))),
        }
    }

    pub(crate) fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_ident(&mut self) -> Result<String, String> {
        match self.bump() {
            Some(Tok::Ident(s)) => Ok(s),
            Some(t) => Err(format!("expected a name, found {}", describe(&t))),
            None => Err("expected a name".into()),
        }
    }

    pub(crate) fn expect_string(&mut self) -> Result<String, String> {
        match self.bump() {
            Some(Tok::Str(s)) => Ok(s),
            Some(t) => Err(format!("expected a quoted name, found {}", describe(&t))),
            None => Err("expected a quoted name".into()),
        }
    }

    pub(crate) fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("and") {
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_filtered()?;
        if self.eat(&Tok::EqEq) {
            let rhs = self.parse_filtered()?;
            return Ok(Expr::Eq(Box::new(lhs), Box::new(rhs)));
        }
        if self.eat(&Tok::NotEq) {
            let rhs = self.parse_filtered()?;
            return Ok(Expr::Ne(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_filtered(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        while self.eat(&Tok::Pipe) {
            let name = self.expect_ident()?;
            let filter = Filter::from_name(&name).ok_or_else(|| format!("unknown filter '{name}'"))?;
            let args = if self.eat(&Tok::LParen) {
                self.parse_args()?
            } else {
                Vec::new()
            };
            if args.len() != filter.arity() {
                return Err(format!(
                    "filter '{name}' takes {} argument(s), got {}",
                    filter.arity(),
                    args.len()
                ));
            }
            expr = Expr::Filter {
                filter,
                input: Box::new(expr),
                args,
            };
        }
        Ok(expr)
    }

    /// Comma-separated expressions; the opening paren is already consumed.
    pub(crate) fn parse_args(&mut self) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(&Tok::Comma) {
                continue;
            }
            self.expect(Tok::RParen)?;
            return Ok(args);
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.bump() {
            Some(Tok::Ident(s)) => Ok(match s.as_str() {
                "true" => Expr::Literal(VariableValue::Bool(true)),
                "false" => Expr::Literal(VariableValue::Bool(false)),
                "and" | "or" | "not" => return Err(format!("unexpected keyword '{s}'")),
                _ => Expr::Var(s),
            }),
            Some(Tok::Str(s)) => Ok(Expr::Literal(VariableValue::String(s))),
            Some(Tok::Int(n)) => Ok(Expr::Literal(VariableValue::Int(n))),
            Some(Tok::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Some(t) => Err(format!("unexpected {}", describe(&t))),
            None => Err("expected an expression".into()),
        }
    }
}

fn describe(t: &Tok) -> String {
    match t {
        Tok::Ident(s) => format!("'{s}'"),
        Tok::Str(s) => format!("\"{s}\""),
        Tok::Int(n) => n.to_string(),
        Tok::EqEq => "'=='".into(),
        Tok::NotEq => "'!='".into(),
        Tok::Pipe => "'|'".into(),
        Tok::LParen => "'('".into(),
        Tok::RParen => "')'".into(),
        Tok::Comma => "','".into(),
    }
}

/// Parse a complete expression.
pub(crate) fn parse(src: &str) -> Result<Expr, String> {
    let mut p = ExprParser::new(src)?;
    let expr = p.parse_expr()?;
    p.expect_end()?;
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Vars(HashMap<&'static str, VariableValue>);

    impl Lookup for Vars {
        fn lookup(&self, name: &str) -> Option<VariableValue> {
            self.0.get(name).cloned()
        }
    }

    fn vars() -> Vars {
        Vars(HashMap::from([
            ("db", VariableValue::from("postgres")),
            ("use_docker", VariableValue::Bool(true)),
            ("workers", VariableValue::Int(0)),
        ]))
    }

    fn eval(src: &str) -> Option<VariableValue> {
        parse(src).unwrap().eval(&vars())
    }

    #[test]
    fn boolean_logic_and_precedence() {
        assert_eq!(eval("use_docker and db == 'postgres'"), Some(true.into()));
        assert_eq!(eval("not use_docker or workers"), Some(false.into()));
        assert_eq!(eval("not (db != \"postgres\")"), Some(true.into()));
    }

    #[test]
    fn undefined_is_falsy_and_only_equals_undefined() {
        assert_eq!(eval("missing"), None);
        assert_eq!(eval("not missing"), Some(true.into()));
        assert_eq!(eval("missing == ''"), Some(false.into()));
    }

    #[test]
    fn mixed_types_compare_by_text() {
        assert_eq!(eval("workers == '0'"), Some(true.into()));
    }

    #[test]
    fn filters_chain_left_to_right() {
        assert_eq!(eval("db | upper | replace('GRES', '')"), Some("POST".into()));
        assert_eq!(eval("missing | default('x') | upper"), Some("X".into()));
    }

    #[test]
    fn errors_are_descriptive() {
        assert_eq!(parse("db | shout").unwrap_err(), "unknown filter 'shout'");
        assert!(parse("db | default").unwrap_err().contains("takes 1 argument"));
        assert!(parse("a b").unwrap_err().contains("unexpected 'b'"));
        assert!(parse("'open").is_err());
    }

    #[test]
    fn collects_every_variable() {
        let mut out = BTreeSet::new();
        parse("a and (b == c | default(d))")
            .unwrap()
            .collect_variables(&mut out);
        assert_eq!(out.into_iter().collect::<Vec<_>>(), ["a", "b", "c", "d"]);
    }
}
