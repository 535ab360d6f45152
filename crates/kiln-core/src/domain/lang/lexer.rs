//! Splits template source into text, output, and tag tokens.

use crate::domain::DomainError;

/// Source position, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Text(String),
    /// Contents of `{{ ... }}`.
    Output(String),
    /// Contents of `{% ... %}`.
    Tag(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

struct Locator {
    line_starts: Vec<usize>,
}

impl Locator {
    fn new(src: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(src.match_indices('\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    fn span(&self, src: &str, offset: usize) -> Span {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line];
        Span {
            line: line + 1,
            column: src[start..offset].chars().count() + 1,
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Delim {
    Output,
    Tag,
    Comment,
}

impl Delim {
    fn close(self) -> &'static str {
        match self {
            Self::Output => "}}",
            Self::Tag => "%}",
            Self::Comment => "#}",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Output => "'{{'",
            Self::Tag => "'{%'",
            Self::Comment => "'{#'",
        }
    }
}

fn next_open(src: &str, from: usize) -> Option<(usize, Delim)> {
    let bytes = src.as_bytes();
    let mut i = from;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' {
            match bytes[i + 1] {
                b'{' => return Some((i, Delim::Output)),
                b'%' => return Some((i, Delim::Tag)),
                b'#' => return Some((i, Delim::Comment)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Tokenize `src`. `path` only labels errors.
///
/// Whitespace control: `{%-` / `{{-` strip whitespace before the tag, `-%}` /
/// `-}}` strip whitespace after it. A single newline directly after a block
/// tag or comment is always dropped so control lines leave no blank lines.
pub(crate) fn tokenize(src: &str, path: &str) -> Result<Vec<Token>, DomainError> {
    let locator = Locator::new(src);
    let mut tokens: Vec<Token> = Vec::new();
    let mut text = String::new();
    let mut text_start = 0usize;
    let mut cursor = 0usize;
    let mut trim_next = false;
    let mut eat_newline = false;

    let syntax = |offset: usize, message: String| {
        let span = locator.span(src, offset);
        DomainError::TemplateSyntax {
            path: path.to_string(),
            line: span.line,
            column: span.column,
            message,
        }
    };

    while cursor < src.len() {
        let Some((open, delim)) = next_open(src, cursor) else {
            push_text(&mut text, &src[cursor..], &mut trim_next, &mut eat_newline);
            break;
        };

        push_text(&mut text, &src[cursor..open], &mut trim_next, &mut eat_newline);

        let mut inner_start = open + 2;
        if src[inner_start..].starts_with('-') {
            let trimmed = text.trim_end().len();
            text.truncate(trimmed);
            inner_start += 1;
        }

        let close = src[inner_start..]
            .find(delim.close())
            .map(|i| inner_start + i)
            .ok_or_else(|| syntax(open, format!("unclosed {}", delim.describe())))?;

        let mut inner = &src[inner_start..close];
        if inner.ends_with('-') {
            inner = &inner[..inner.len() - 1];
            trim_next = true;
        }
        let inner = inner.trim();
        cursor = close + 2;

        if delim == Delim::Comment {
            eat_newline = !trim_next;
            continue;
        }

        if !text.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Text(std::mem::take(&mut text)),
                span: locator.span(src, text_start),
            });
        }
        text_start = cursor;

        let span = locator.span(src, open);
        match delim {
            Delim::Output => {
                if inner.is_empty() {
                    return Err(syntax(open, "empty expression".into()));
                }
                tokens.push(Token {
                    kind: TokenKind::Output(inner.to_string()),
                    span,
                });
            }
            Delim::Tag if inner == "raw" => {
                let (body, end) = find_endraw(src, cursor)
                    .ok_or_else(|| syntax(open, "unclosed {% raw %}".into()))?;
                text.push_str(&src[cursor..body]);
                cursor = end;
                text_start = cursor;
                eat_newline = !trim_next;
            }
            Delim::Tag => {
                tokens.push(Token {
                    kind: TokenKind::Tag(inner.to_string()),
                    span,
                });
                eat_newline = !trim_next;
            }
            Delim::Comment => unreachable!("comments are skipped above"),
        }
    }

    if !text.is_empty() {
        tokens.push(Token {
            kind: TokenKind::Text(text),
            span: locator.span(src, text_start),
        });
    }
    Ok(tokens)
}

fn push_text(out: &mut String, mut chunk: &str, trim_next: &mut bool, eat_newline: &mut bool) {
    if *trim_next {
        chunk = chunk.trim_start();
        *trim_next = false;
    } else if *eat_newline {
        chunk = chunk
            .strip_prefix("\r\n")
            .or_else(|| chunk.strip_prefix('\n'))
            .unwrap_or(chunk);
    }
    *eat_newline = false;
    out.push_str(chunk);
}

/// Locate `{% endraw %}` at or after `from`; returns (body end, resume offset).
fn find_endraw(src: &str, from: usize) -> Option<(usize, usize)> {
    let mut at = from;
    while let Some(rel) = src[at..].find("{%") {
        let open = at + rel;
        let close = open + 2 + src[open + 2..].find("%}")?;
        let inner = src[open + 2..close].trim_matches('-').trim();
        if inner == "endraw" {
            return Some((open, close + 2));
        }
        at = open + 2;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, "t").unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn splits_text_output_and_tags() {
        assert_eq!(
            kinds("a {{ name }} b{% if x %}c{% endif %}"),
            vec![
                TokenKind::Text("a ".into()),
                TokenKind::Output("name".into()),
                TokenKind::Text(" b".into()),
                TokenKind::Tag("if x".into()),
                TokenKind::Text("c".into()),
                TokenKind::Tag("endif".into()),
            ]
        );
    }

    #[test]
    fn comments_vanish() {
        assert_eq!(kinds("a{# note #}b"), vec![TokenKind::Text("ab".into())]);
    }

    #[test]
    fn newline_after_block_tag_is_dropped() {
        assert_eq!(
            kinds("{% if x %}\nline\n{% endif %}\n"),
            vec![
                TokenKind::Tag("if x".into()),
                TokenKind::Text("line\n".into()),
                TokenKind::Tag("endif".into()),
            ]
        );
    }

    #[test]
    fn dash_trims_surrounding_whitespace() {
        assert_eq!(
            kinds("a   {{- x -}}   b"),
            vec![
                TokenKind::Text("a".into()),
                TokenKind::Output("x".into()),
                TokenKind::Text("b".into()),
            ]
        );
    }

    #[test]
    fn raw_blocks_are_literal() {
        assert_eq!(
            kinds("{% raw %}${{ secrets.TOKEN }}{% endraw %}"),
            vec![TokenKind::Text("${{ secrets.TOKEN }}".into())]
        );
    }

    #[test]
    fn unclosed_tag_reports_line_and_column() {
        let err = tokenize("ok\n  {{ name", "README.md").unwrap_err();
        assert_eq!(
            err,
            DomainError::TemplateSyntax {
                path: "README.md".into(),
                line: 2,
                column: 3,
                message: "unclosed '{{'".into(),
            }
        );
    }
}
