//! Resolves `extends`, `include` and macros statically and lowers the tree
//! into a [`Program`].

use std::collections::HashMap;

use super::lexer::Span;
use super::parser::{MacroDef, Node, parse};
use super::program::{Instr, Macro, Program};
use crate::domain::DomainError;

/// Source of `extends` / `include` targets.
pub trait PartialSource {
    fn load(&self, name: &str) -> Option<String>;
}

impl PartialSource for HashMap<String, String> {
    fn load(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// A partial source with nothing in it.
pub struct NoPartials;

impl PartialSource for NoPartials {
    fn load(&self, _name: &str) -> Option<String> {
        None
    }
}

struct Resolved {
    macros: Vec<MacroDef>,
    nodes: Vec<Node>,
}

/// Compile `source`; `path` labels errors and anchors cycle detection.
pub fn compile(path: &str, source: &str, partials: &dyn PartialSource) -> Result<Program, DomainError> {
    let mut stack = vec![path.to_string()];
    let resolved = resolve(path, source, partials, &mut stack)?;
    lower(path, resolved)
}

fn syntax(path: &str, span: Span, message: impl Into<String>) -> DomainError {
    DomainError::TemplateSyntax {
        path: path.to_string(),
        line: span.line,
        column: span.column,
        message: message.into(),
    }
}

fn resolve(
    path: &str,
    source: &str,
    partials: &dyn PartialSource,
    stack: &mut Vec<String>,
) -> Result<Resolved, DomainError> {
    let doc = parse(source, path)?;

    let mut macros = Vec::new();
    let nodes = inline(path, doc.nodes, partials, stack, &mut macros)?;
    for mut def in doc.macros {
        def.body = inline(path, def.body, partials, stack, &mut macros)?;
        override_macro(&mut macros, def);
    }

    let Some((parent_name, span)) = doc.extends else {
        return Ok(Resolved { macros, nodes });
    };

    let parent_src = enter(path, &parent_name, span, partials, stack)?;
    let parent = resolve(&parent_name, &parent_src, partials, stack);
    stack.pop();
    let parent = parent?;

    let mut overrides = HashMap::new();
    collect_blocks(&nodes, &mut overrides);
    let nodes = substitute(parent.nodes, &overrides);

    let mut merged = parent.macros;
    for def in macros {
        override_macro(&mut merged, def);
    }
    Ok(Resolved {
        macros: merged,
        nodes,
    })
}

/// Push `name` onto the resolution stack and load its source.
fn enter(
    path: &str,
    name: &str,
    span: Span,
    partials: &dyn PartialSource,
    stack: &mut Vec<String>,
) -> Result<String, DomainError> {
    if stack.iter().any(|p| p == name) {
        let mut chain = stack.clone();
        chain.push(name.to_string());
        return Err(syntax(
            path,
            span,
            format!("template cycle: {}", chain.join(" -> ")),
        ));
    }
    let src = partials
        .load(name)
        .ok_or_else(|| syntax(path, span, format!("partial '{name}' not found")))?;
    stack.push(name.to_string());
    Ok(src)
}

fn override_macro(macros: &mut Vec<MacroDef>, def: MacroDef) {
    match macros.iter_mut().find(|m| m.name == def.name) {
        Some(existing) => *existing = def,
        None => macros.push(def),
    }
}

fn inline(
    path: &str,
    nodes: Vec<Node>,
    partials: &dyn PartialSource,
    stack: &mut Vec<String>,
    macros: &mut Vec<MacroDef>,
) -> Result<Vec<Node>, DomainError> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Include { name, span } => {
                let src = enter(path, &name, span, partials, stack)?;
                let included = resolve(&name, &src, partials, stack);
                stack.pop();
                let included = included?;
                for def in included.macros {
                    override_macro(macros, def);
                }
                out.extend(included.nodes);
            }
            Node::If { arms, otherwise } => {
                let mut new_arms = Vec::with_capacity(arms.len());
                for (cond, body) in arms {
                    new_arms.push((cond, inline(path, body, partials, stack, macros)?));
                }
                out.push(Node::If {
                    arms: new_arms,
                    otherwise: inline(path, otherwise, partials, stack, macros)?,
                });
            }
            Node::Block { name, body } => out.push(Node::Block {
                name,
                body: inline(path, body, partials, stack, macros)?,
            }),
            other => out.push(other),
        }
    }
    Ok(out)
}

fn collect_blocks(nodes: &[Node], out: &mut HashMap<String, Vec<Node>>) {
    for node in nodes {
        match node {
            Node::Block { name, body } => {
                out.insert(name.clone(), body.clone());
                collect_blocks(body, out);
            }
            Node::If { arms, otherwise } => {
                for (_, body) in arms {
                    collect_blocks(body, out);
                }
                collect_blocks(otherwise, out);
            }
            _ => {}
        }
    }
}

/// Replace parent blocks with child overrides. The `Block` wrapper is kept so
/// a grandchild can override the same name again.
fn substitute(nodes: Vec<Node>, overrides: &HashMap<String, Vec<Node>>) -> Vec<Node> {
    nodes
        .into_iter()
        .map(|node| match node {
            Node::Block { name, body } => match overrides.get(&name) {
                Some(child) => Node::Block {
                    name,
                    body: child.clone(),
                },
                None => Node::Block {
                    name,
                    body: substitute(body, overrides),
                },
            },
            Node::If { arms, otherwise } => Node::If {
                arms: arms
                    .into_iter()
                    .map(|(cond, body)| (cond, substitute(body, overrides)))
                    .collect(),
                otherwise: substitute(otherwise, overrides),
            },
            other => other,
        })
        .collect()
}

// ── lowering ────────────────────────────────────────────────────────────────

fn lower(path: &str, resolved: Resolved) -> Result<Program, DomainError> {
    let index: HashMap<String, usize> = resolved
        .macros
        .iter()
        .enumerate()
        .map(|(i, m)| (m.name.clone(), i))
        .collect();
    let arity: Vec<usize> = resolved.macros.iter().map(|m| m.params.len()).collect();

    let ctx = Lowering {
        index: &index,
        arity: &arity,
    };

    let body = ctx.lower_nodes(resolved.nodes)?;
    let mut macros = Vec::with_capacity(resolved.macros.len());
    for def in resolved.macros {
        macros.push(Macro {
            params: def.params,
            body: ctx.lower_nodes(def.body)?,
        });
    }

    if let Some(name) = recursive_macro(&macros, &resolved_names(&index)) {
        return Err(DomainError::TemplateSyntax {
            path: path.to_string(),
            line: 1,
            column: 1,
            message: format!("macro '{name}' calls itself recursively"),
        });
    }

    Ok(Program { body, macros })
}

fn resolved_names(index: &HashMap<String, usize>) -> Vec<String> {
    let mut names = vec![String::new(); index.len()];
    for (name, &i) in index {
        names[i] = name.clone();
    }
    names
}

struct Lowering<'a> {
    index: &'a HashMap<String, usize>,
    arity: &'a [usize],
}

impl Lowering<'_> {
    fn lower_nodes(&self, nodes: Vec<Node>) -> Result<Vec<Instr>, DomainError> {
        let mut out: Vec<Instr> = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Text(text) => push_text(&mut out, text),
                Node::Output(expr) => out.push(Instr::Emit(expr)),
                Node::If { arms, otherwise } => {
                    let mut lowered = Vec::with_capacity(arms.len());
                    for (cond, body) in arms {
                        lowered.push((cond, self.lower_nodes(body)?));
                    }
                    out.push(Instr::Branch {
                        arms: lowered,
                        otherwise: self.lower_nodes(otherwise)?,
                    });
                }
                Node::Block { body, .. } => {
                    for instr in self.lower_nodes(body)? {
                        match instr {
                            Instr::Text(text) => push_text(&mut out, text),
                            other => out.push(other),
                        }
                    }
                }
                Node::Call {
                    name,
                    args,
                    span,
                    origin,
                } => {
                    let target = *self
                        .index
                        .get(&name)
                        .ok_or_else(|| syntax(&origin, span, format!("unknown macro '{name}'")))?;
                    if args.len() != self.arity[target] {
                        return Err(syntax(
                            &origin,
                            span,
                            format!(
                                "macro '{name}' takes {} argument(s), got {}",
                                self.arity[target],
                                args.len()
                            ),
                        ));
                    }
                    out.push(Instr::Call { target, args });
                }
                Node::Include { .. } => unreachable!("includes are inlined before lowering"),
            }
        }
        Ok(out)
    }
}

fn push_text(out: &mut Vec<Instr>, text: String) {
    if let Some(Instr::Text(prev)) = out.last_mut() {
        prev.push_str(&text);
    } else if !text.is_empty() {
        out.push(Instr::Text(text));
    }
}

/// Name of a macro that can reach itself through calls.
fn recursive_macro(macros: &[Macro], names: &[String]) -> Option<String> {
    fn calls(instrs: &[Instr], out: &mut Vec<usize>) {
        for instr in instrs {
            match instr {
                Instr::Call { target, .. } => out.push(*target),
                Instr::Branch { arms, otherwise } => {
                    for (_, body) in arms {
                        calls(body, out);
                    }
                    calls(otherwise, out);
                }
                _ => {}
            }
        }
    }

    let edges: Vec<Vec<usize>> = macros
        .iter()
        .map(|m| {
            let mut out = Vec::new();
            calls(&m.body, &mut out);
            out
        })
        .collect();

    // 0 = unvisited, 1 = on stack, 2 = done
    fn visit(n: usize, edges: &[Vec<usize>], state: &mut [u8]) -> bool {
        state[n] = 1;
        for &m in &edges[n] {
            if state[m] == 1 || (state[m] == 0 && visit(m, edges, state)) {
                return true;
            }
        }
        state[n] = 2;
        false
    }

    let mut state = vec![0u8; macros.len()];
    (0..macros.len())
        .find(|&n| state[n] == 0 && visit(n, &edges, &mut state))
        .map(|n| names[n].clone())
}
