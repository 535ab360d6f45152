// ============================================================================
// String filters available after `|` in expressions
// ============================================================================

use crate::domain::VariableValue;

/// A filter applied with `{{ value | name }}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Lower,
    Upper,
    Snake,
    Kebab,
    Pascal,
    Camel,
    Trim,
    /// `default("x")`: substitute when the input is undefined or empty.
    Default,
    /// `replace("from", "to")`.
    Replace,
}

impl Filter {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "lower" => Self::Lower,
            "upper" => Self::Upper,
            "snake" | "snake_case" => Self::Snake,
            "kebab" | "kebab_case" => Self::Kebab,
            "pascal" | "pascal_case" => Self::Pascal,
            "camel" | "camel_case" => Self::Camel,
            "trim" => Self::Trim,
            "default" => Self::Default,
            "replace" => Self::Replace,
            _ => return None,
        })
    }

    /// Number of arguments the filter takes.
    pub fn arity(self) -> usize {
        match self {
            Self::Default => 1,
            Self::Replace => 2,
            _ => 0,
        }
    }

    pub(crate) fn apply(
        self,
        input: Option<VariableValue>,
        args: &[Option<VariableValue>],
    ) -> Option<VariableValue> {
        if self == Self::Default {
            return match input {
                Some(v) if !matches!(&v, VariableValue::String(s) if s.is_empty()) => Some(v),
                _ => args.first().cloned().flatten(),
            };
        }

        let text = input?.to_string();
        let out = match self {
            Self::Lower => text.to_lowercase(),
            Self::Upper => text.to_uppercase(),
            Self::Snake => to_snake_case(&text),
            Self::Kebab => to_kebab_case(&text),
            Self::Pascal => to_pascal_case(&text),
            Self::Camel => to_camel_case(&text),
            Self::Trim => text.trim().to_string(),
            Self::Replace => {
                let from = args.first().cloned().flatten().map(|v| v.to_string());
                let to = args.get(1).cloned().flatten().map(|v| v.to_string());
                match (from, to) {
                    (Some(from), Some(to)) if !from.is_empty() => text.replace(&from, &to),
                    _ => text,
                }
            }
            Self::Default => unreachable!("handled above"),
        };
        Some(VariableValue::String(out))
    }
}

// ============================================================================
// String Case Conversion Helpers
// ============================================================================

/// Convert a string to snake_case.
///
/// | Input | Output |
/// |-------|--------|
/// | "MyApp" | "my_app" |
/// | "my-app" | "my_app" |
/// | "HTTPRequest" | "http_request" |
pub fn to_snake_case(s: &str) -> String {
    split_words(s).join("_")
}

/// Same as `to_snake_case` but joins with `-`.
pub fn to_kebab_case(s: &str) -> String {
    split_words(s).join("-")
}

/// Convert a string to PascalCase.
pub fn to_pascal_case(s: &str) -> String {
    split_words(s).iter().map(|w| capitalize(w)).collect()
}

/// Convert a string to camelCase.
pub fn to_camel_case(s: &str) -> String {
    let words = split_words(s);
    let mut out = String::new();
    for (i, w) in words.iter().enumerate() {
        if i == 0 {
            out.push_str(w);
        } else {
            out.push_str(&capitalize(w));
        }
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            let mut out = String::new();
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
            out
        }
        None => String::new(),
    }
}

/// Split a string into lowercase words.
///
/// 1. `_`, `-`, `.` and whitespace always split
/// 2. lowercase -> uppercase splits (`myApp`)
/// 3. acronym boundary splits (`HTTPServer` -> `http`, `server`)
pub fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '_' || c == '-' || c == '.' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(current.to_lowercase());
                current.clear();
            }
            continue;
        }

        if let Some(next) = chars.peek() {
            if c.is_lowercase() && next.is_uppercase() {
                current.push(c);
                words.push(current.to_lowercase());
                current.clear();
                continue;
            }

            if c.is_uppercase()
                && next.is_uppercase()
                && chars.clone().nth(1).is_some_and(|n| n.is_lowercase())
            {
                current.push(c);
                words.push(current.to_lowercase());
                current.clear();
                continue;
            }
        }

        current.push(c);
    }

    if !current.is_empty() {
        words.push(current.to_lowercase());
    }

    words
}
