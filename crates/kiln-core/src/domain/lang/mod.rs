//! The template language.
//!
//! ```text
//! {{ expr }}                          output, e.g. {{ project_name | kebab }}
//! {% if expr %} {% elif expr %} {% else %} {% endif %}
//! {% extends "layout.txt" %} {% block name %}...{% endblock %}
//! {% macro name(a, b) %}...{% endmacro %} {% call name(x, "y") %}
//! {% include "snippet.txt" %}
//! {% raw %}...{% endraw %}            literal text
//! {# comment #}
//! ```
//!
//! Sources are compiled once into a [`Program`]: includes are inlined, child
//! blocks are substituted into their parent and macro calls are bound to
//! their definitions, so rendering never touches the filesystem and cannot
//! fail. Undefined variables render as empty text; the loader rejects
//! templates that reference undeclared variables before anything renders.

mod compiler;
mod expr;
mod filters;
mod lexer;
mod parser;
mod program;

pub use compiler::{NoPartials, PartialSource, compile};
pub use filters::{Filter, split_words, to_camel_case, to_kebab_case, to_pascal_case, to_snake_case};
pub use program::Program;

use crate::domain::{DomainError, VariableMap};

/// Compile and render a standalone string, e.g. a templated default.
pub fn render_str(source: &str, vars: &VariableMap) -> Result<String, DomainError> {
    Ok(compile("<inline>", source, &NoPartials)?.render(vars))
}
