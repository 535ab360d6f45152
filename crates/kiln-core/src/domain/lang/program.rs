//! Compiled template: a flat instruction tree with macros resolved to indices.

use std::collections::{BTreeSet, HashMap};

use super::expr::{Expr, Lookup, truthy};
use crate::domain::{VariableMap, VariableValue};

#[derive(Debug, Clone)]
pub(crate) enum Instr {
    Text(String),
    Emit(Expr),
    Branch {
        arms: Vec<(Expr, Vec<Instr>)>,
        otherwise: Vec<Instr>,
    },
    Call {
        target: usize,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Macro {
    pub params: Vec<String>,
    pub body: Vec<Instr>,
}

/// A template ready to render. Immutable and shareable across threads.
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) body: Vec<Instr>,
    pub(crate) macros: Vec<Macro>,
}

struct Scope<'a> {
    globals: &'a VariableMap,
    locals: Option<&'a HashMap<&'a str, Option<VariableValue>>>,
}

impl Lookup for Scope<'_> {
    fn lookup(&self, name: &str) -> Option<VariableValue> {
        if let Some(value) = self.locals.and_then(|l| l.get(name)) {
            return value.clone();
        }
        self.globals.get(name).cloned()
    }
}

impl Program {
    /// A program that renders `text` unchanged.
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            body: vec![Instr::Text(text.into())],
            macros: Vec::new(),
        }
    }

    /// Render against `vars`. Undefined variables render as empty text.
    pub fn render(&self, vars: &VariableMap) -> String {
        let mut out = String::new();
        let scope = Scope {
            globals: vars,
            locals: None,
        };
        self.exec(&self.body, &scope, &mut out);
        out
    }

    fn exec(&self, instrs: &[Instr], scope: &Scope<'_>, out: &mut String) {
        for instr in instrs {
            match instr {
                Instr::Text(text) => out.push_str(text),
                Instr::Emit(expr) => {
                    if let Some(value) = expr.eval(scope) {
                        out.push_str(&value.to_string());
                    }
                }
                Instr::Branch { arms, otherwise } => {
                    let taken = arms
                        .iter()
                        .find(|(cond, _)| truthy(&cond.eval(scope)))
                        .map(|(_, body)| body)
                        .unwrap_or(otherwise);
                    self.exec(taken, scope, out);
                }
                Instr::Call { target, args } => {
                    let mac = &self.macros[*target];
                    let locals: HashMap<&str, Option<VariableValue>> = mac
                        .params
                        .iter()
                        .map(String::as_str)
                        .zip(args.iter().map(|a| a.eval(scope)))
                        .collect();
                    let inner = Scope {
                        globals: scope.globals,
                        locals: Some(&locals),
                    };
                    self.exec(&mac.body, &inner, out);
                }
            }
        }
    }

    /// The literal text if the program contains no expressions.
    pub fn as_static(&self) -> Option<&str> {
        match &self.body[..] {
            [] => Some(""),
            [Instr::Text(text)] => Some(text),
            _ => None,
        }
    }

    /// Every global variable the program may read, including through macros.
    pub fn referenced_variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        let mut seen = vec![false; self.macros.len()];
        self.collect(&self.body, &[], &mut vars, &mut seen);
        vars
    }

    fn collect(
        &self,
        instrs: &[Instr],
        params: &[String],
        vars: &mut BTreeSet<String>,
        seen: &mut [bool],
    ) {
        let add = |expr: &Expr, vars: &mut BTreeSet<String>| {
            let mut found = BTreeSet::new();
            expr.collect_variables(&mut found);
            vars.extend(found.into_iter().filter(|v| !params.contains(v)));
        };

        for instr in instrs {
            match instr {
                Instr::Text(_) => {}
                Instr::Emit(expr) => add(expr, vars),
                Instr::Branch { arms, otherwise } => {
                    for (cond, body) in arms {
                        add(cond, vars);
                        self.collect(body, params, vars, seen);
                    }
                    self.collect(otherwise, params, vars, seen);
                }
                Instr::Call { target, args } => {
                    for arg in args {
                        add(arg, vars);
                    }
                    if !seen[*target] {
                        seen[*target] = true;
                        let mac = &self.macros[*target];
                        self.collect(&mac.body, &mac.params, vars, seen);
                    }
                }
            }
        }
    }
}
