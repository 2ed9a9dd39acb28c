//! Finds the top-level declarations of a cell.
//!
//! A declaration starts at a declaration keyword that is the first token of
//! its line at bracket depth zero, and ends at the first line break (again
//! at depth zero) after which Go would insert a semicolon. Comment lines
//! directly above it are its doc comment and travel with it.
//!
//! An explicit `;` does not end a declaration: anything sharing its line is
//! folded into it, though each declaration folded in still yields its own
//! entries.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use super::lexer::{lex, Token, TokenKind};
use super::store::{DeclKey, DeclKind};

const DECL_KEYWORDS: [&str; 5] = ["import", "func", "type", "var", "const"];

/// One storable unit produced by a declaration. Grouped declarations yield
/// one entry per spec, except constant groups whose specs depend on their
/// position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclEntry {
    pub key: DeclKey,
    pub names: Vec<String>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDecl {
    pub kind: DeclKind,
    /// Cell lines covered, doc comment included.
    pub lines: RangeInclusive<usize>,
    pub entries: Vec<DeclEntry>,
    /// `func main`: the program's own entry point, never memorized.
    pub entry_point: bool,
}

/// Scan `lines` for top-level declarations, in source order.
///
/// Callers blank out lines that are not program source before scanning, so
/// line indices in the result are cell line indices.
pub fn scan<S: AsRef<str>>(lines: &[S]) -> Vec<ParsedDecl> {
    let lines: Vec<&str> = lines.iter().map(AsRef::as_ref).collect();
    let lexed = lex(&lines);
    let text: Vec<char> = lines.join("\n").chars().collect();

    let mut decls = Vec::new();
    let mut pending: Option<Vec<Token>> = None;
    let mut depth = 0usize;
    let mut line_start = true;

    for tok in lexed.tokens {
        if tok.kind == TokenKind::Newline {
            line_start = true;
            if depth > 0 {
                if let Some(toks) = pending.as_mut() {
                    toks.push(tok);
                }
                continue;
            }
            let terminated = pending
                .as_ref()
                .and_then(|toks| toks.last())
                .is_some_and(Token::ends_statement);
            if terminated {
                if let Some(toks) = pending.take() {
                    decls.extend(finish(&toks, &text, &lines, &lexed.comment_lines));
                }
            }
            continue;
        }

        let starts_decl = pending.is_none()
            && depth == 0
            && line_start
            && tok.ident().is_some_and(|word| DECL_KEYWORDS.contains(&word));
        if starts_decl {
            pending = Some(Vec::new());
        }
        match tok.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
        line_start = false;
        if let Some(toks) = pending.as_mut() {
            toks.push(tok);
        }
    }
    if let Some(toks) = pending {
        decls.extend(finish(&toks, &text, &lines, &lexed.comment_lines));
    }

    tracing::trace!(count = decls.len(), "scanned declarations");
    decls
}

fn finish(
    toks: &[Token],
    text: &[char],
    lines: &[&str],
    comment_lines: &BTreeSet<usize>,
) -> Option<ParsedDecl> {
    let start = toks.first()?.line;
    let end = toks.last()?.end_line;

    let mut first = start;
    while first > 0 && comment_lines.contains(&(first - 1)) {
        first -= 1;
    }
    let doc = lines[first..start].join("\n");

    let segments = split_folded(toks);
    let mut kind = None;
    let mut entries = Vec::new();
    let mut entry_point = false;
    for (idx, segment) in segments.iter().enumerate() {
        let seg_doc = if idx == 0 { doc.as_str() } else { "" };
        let source = if segments.len() == 1 {
            lines[first..=end].join("\n")
        } else {
            with_doc(seg_doc, span_text(text, segment))
        };
        let Some((seg_kind, seg_entries, main)) = segment_entries(segment, text, source, seg_doc) else {
            continue;
        };
        kind.get_or_insert(seg_kind);
        entries.extend(seg_entries);
        entry_point |= main;
    }

    Some(ParsedDecl {
        kind: kind?,
        lines: first..=end,
        entries,
        entry_point,
    })
}

/// Split at each `;` that is followed by another declaration keyword.
fn split_folded(toks: &[Token]) -> Vec<&[Token]> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut from = 0;
    for (idx, tok) in toks.iter().enumerate() {
        match tok.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(_) => depth = depth.saturating_sub(1),
            TokenKind::Semi if depth == 0 => {
                let next_is_decl = toks
                    .get(idx + 1)
                    .and_then(Token::ident)
                    .is_some_and(|word| DECL_KEYWORDS.contains(&word));
                if next_is_decl {
                    segments.push(&toks[from..idx]);
                    from = idx + 1;
                }
            }
            _ => {}
        }
    }
    segments.push(&toks[from..]);
    segments
}

/// Source text covered by `toks`.
fn span_text(text: &[char], toks: &[Token]) -> String {
    match (toks.first(), toks.last()) {
        (Some(first), Some(last)) => text[first.start..last.end.max(first.start)].iter().collect(),
        _ => String::new(),
    }
}

fn with_doc(doc: &str, source: String) -> String {
    if doc.is_empty() {
        source
    } else {
        format!("{doc}\n{source}")
    }
}

/// Entries of one declaration. `source` is its full text, `doc` the comment
/// lines above it (also contained in `source`).
fn segment_entries(
    segment: &[Token],
    text: &[char],
    source: String,
    doc: &str,
) -> Option<(DeclKind, Vec<DeclEntry>, bool)> {
    let keyword = segment.first()?.ident()?;
    let body = &segment[1..];

    match keyword {
        "import" => Some((DeclKind::Import, import_entries(body), false)),
        "func" => {
            let (key, names) = func_key(body)?;
            match key {
                None => Some((DeclKind::Func, Vec::new(), true)),
                Some(key) => {
                    let kind = key.kind();
                    Some((kind, vec![DeclEntry { key, names, source }], false))
                }
            }
        }
        "type" | "var" | "const" => {
            let kind = match keyword {
                "type" => DeclKind::Type,
                "var" => DeclKind::Var,
                _ => DeclKind::Const,
            };
            let specs = specs(body);
            let grouped = skip_newlines(body).first().map(|t| &t.kind) == Some(&TokenKind::Open('('));
            let entries: Vec<DeclEntry> = if grouped && splittable(kind, &specs) {
                specs
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, spec)| {
                        let own = format!("{keyword} {}", span_text(text, spec));
                        let label_text = own.clone();
                        let source = with_doc(if idx == 0 { doc } else { "" }, own);
                        spec_entry(kind, &[*spec], &label_text, source)
                    })
                    .collect()
            } else {
                let label_text = format!("{keyword} {}", span_text(text, body));
                spec_entry(kind, &specs, &label_text, source).into_iter().collect()
            };
            if entries.is_empty() {
                return None;
            }
            Some((kind, entries, false))
        }
        _ => None,
    }
}

/// Whether each spec of a group can stand alone. Constant groups relying on
/// `iota` or on implicit repetition of the previous expression cannot.
fn splittable(kind: DeclKind, specs: &[&[Token]]) -> bool {
    if kind != DeclKind::Const {
        return true;
    }
    specs.iter().all(|spec| {
        let assigns = spec.iter().any(|t| matches!(&t.kind, TokenKind::Op(op) if op == "="));
        let uses_iota = spec.iter().any(|t| t.ident() == Some("iota"));
        assigns && !uses_iota
    })
}

/// One store entry covering `specs`. Blank-only var and const
/// declarations are identified by their whitespace-normalized text.
fn spec_entry(kind: DeclKind, specs: &[&[Token]], label_text: &str, source: String) -> Option<DeclEntry> {
    let declared: Vec<String> = if kind == DeclKind::Type {
        specs
            .iter()
            .filter_map(|spec| spec.first().and_then(Token::ident))
            .map(str::to_string)
            .collect()
    } else {
        specs.iter().flat_map(|spec| leading_names(spec)).collect()
    };
    if declared.is_empty() {
        return None;
    }
    let names: Vec<String> = declared.into_iter().filter(|n| n != "_").collect();
    let label = if names.is_empty() {
        label_text.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        names.join(", ")
    };
    let key = match kind {
        DeclKind::Type => DeclKey::Type(label),
        DeclKind::Var => DeclKey::Var(label),
        _ => DeclKey::Const(label),
    };
    Some(DeclEntry { key, names, source })
}

fn skip_newlines(toks: &[Token]) -> &[Token] {
    let skip = toks.iter().take_while(|t| t.kind == TokenKind::Newline).count();
    &toks[skip..]
}

/// Index of the bracket closing the one at `toks[0]`.
fn matching_close(toks: &[Token]) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, tok) in toks.iter().enumerate() {
        match tok.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split the body of a possibly grouped declaration into its specs.
fn specs(body: &[Token]) -> Vec<&[Token]> {
    let body = skip_newlines(body);
    if body.first().map(|t| &t.kind) != Some(&TokenKind::Open('(')) {
        return vec![body];
    }
    let close = matching_close(body).unwrap_or(body.len());
    let inner = &body[1..close.max(1)];

    let mut specs = Vec::new();
    let mut depth = 0usize;
    let mut from = 0;
    for (idx, tok) in inner.iter().enumerate() {
        match tok.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(_) => depth = depth.saturating_sub(1),
            TokenKind::Newline | TokenKind::Semi if depth == 0 => {
                if idx > from {
                    specs.push(&inner[from..idx]);
                }
                from = idx + 1;
            }
            _ => {}
        }
    }
    if inner.len() > from {
        specs.push(&inner[from..]);
    }
    specs
}

fn import_entries(body: &[Token]) -> Vec<DeclEntry> {
    specs(body)
        .into_iter()
        .filter_map(|spec| {
            let (alias, path) = match (spec.first().map(|t| &t.kind), spec.get(1).map(|t| &t.kind)) {
                (Some(TokenKind::Literal(path)), _) => (None, path),
                (Some(TokenKind::Ident(alias)), Some(TokenKind::Literal(path))) => (Some(alias.as_str()), path),
                (Some(TokenKind::Op(dot)), Some(TokenKind::Literal(path))) if dot == "." => (Some("."), path),
                _ => return None,
            };
            let unquoted = path.trim_matches(|c| c == '"' || c == '`');
            let (binding, source) = match alias {
                Some(alias @ ("_" | ".")) => (format!("{alias} {unquoted}"), format!("import {alias} {path}")),
                Some(alias) => (alias.to_string(), format!("import {alias} {path}")),
                None => (unquoted.to_string(), format!("import {path}")),
            };
            Some(DeclEntry {
                key: DeclKey::Import(binding),
                names: Vec::new(),
                source,
            })
        })
        .collect()
}

/// Key of a function or method; `Some((None, _))` for `func main`.
fn func_key(body: &[Token]) -> Option<(Option<DeclKey>, Vec<String>)> {
    match body.first()?.kind {
        TokenKind::Open('(') => {
            let close = matching_close(body)?;
            let receiver = receiver_type(&body[1..close])?;
            let name = body.get(close + 1)?.ident()?.to_string();
            Some((Some(DeclKey::Method { receiver, name }), Vec::new()))
        }
        TokenKind::Ident(ref name) if name == "main" => Some((None, Vec::new())),
        TokenKind::Ident(ref name) => Some((Some(DeclKey::Func(name.clone())), vec![name.clone()])),
        _ => None,
    }
}

/// Base type name of a receiver list, ignoring `*` and type parameters.
fn receiver_type(toks: &[Token]) -> Option<String> {
    let mut depth = 0usize;
    let mut last = None;
    for tok in toks {
        match &tok.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(_) => depth = depth.saturating_sub(1),
            TokenKind::Ident(name) if depth == 0 => last = Some(name.clone()),
            _ => {}
        }
    }
    last
}

/// `a, b, c` at the start of a var/const spec.
fn leading_names(spec: &[Token]) -> Vec<String> {
    let mut names = Vec::new();
    let mut toks = spec.iter();
    while let Some(name) = toks.next().and_then(Token::ident) {
        names.push(name.to_string());
        if toks.next().map(|t| &t.kind) != Some(&TokenKind::Comma) {
            break;
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_src(src: &str) -> Vec<ParsedDecl> {
        let lines: Vec<&str> = src.split('\n').collect();
        scan(&lines)
    }

    fn keys(decls: &[ParsedDecl]) -> Vec<DeclKey> {
        decls
            .iter()
            .flat_map(|d| d.entries.iter().map(|e| e.key.clone()))
            .collect()
    }

    #[test]
    fn functions_methods_and_types() {
        let src = "type Kg int\n\nfunc (k *Kg) Gain(lasagna Kg) {\n\t*k += lasagna\n}\n\nfunc Double(x int) int { return 2 * x }";
        let decls = scan_src(src);
        assert_eq!(
            keys(&decls),
            vec![
                DeclKey::Type("Kg".into()),
                DeclKey::Method {
                    receiver: "Kg".into(),
                    name: "Gain".into()
                },
                DeclKey::Func("Double".into()),
            ]
        );
        assert_eq!(decls[1].lines, 2..=4);
        assert_eq!(decls[1].entries[0].source, "func (k *Kg) Gain(lasagna Kg) {\n\t*k += lasagna\n}");
        assert_eq!(decls[2].entries[0].names, vec!["Double"]);
    }

    #[test]
    fn value_and_pointer_receivers_share_a_key() {
        let value = scan_src("func (k Kg) Gain() {}");
        let pointer = scan_src("func (k *Kg) Gain() {}");
        let generic = scan_src("func (k *Kg[T]) Gain() {}");
        assert_eq!(keys(&value), keys(&pointer));
        assert_eq!(keys(&value), keys(&generic));
    }

    #[test]
    fn grouped_imports_split_per_spec() {
        let decls = scan_src("import (\n\t\"fmt\"\n\tstr \"strings\"\n\t_ \"embed\"\n)\nimport . \"math\"");
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].lines, 0..=4);
        let sources: Vec<&str> = decls
            .iter()
            .flat_map(|d| d.entries.iter().map(|e| e.source.as_str()))
            .collect();
        assert_eq!(
            sources,
            vec![
                "import \"fmt\"",
                "import str \"strings\"",
                "import _ \"embed\"",
                "import . \"math\""
            ]
        );
        assert_eq!(
            keys(&decls),
            vec![
                DeclKey::Import("fmt".into()),
                DeclKey::Import("str".into()),
                DeclKey::Import("_ embed".into()),
                DeclKey::Import(". math".into()),
            ]
        );
    }

    #[test]
    fn var_and_const_groups() {
        let decls = scan_src("var a, b = 1, 2\nconst (\n\tX = iota\n\tY\n)\nvar _ = fmt.Sprintf");
        assert_eq!(
            keys(&decls),
            vec![
                DeclKey::Var("a, b".into()),
                DeclKey::Const("X, Y".into()),
                DeclKey::Var("var _ = fmt.Sprintf".into()),
            ]
        );
        assert!(decls[2].entries[0].names.is_empty());
    }

    #[test]
    fn multiline_expression_continues_until_statement_end() {
        let decls = scan_src("var total = 1 +\n\t2\nvar f = func() int {\n\treturn 3\n}\nfunc g() {}");
        assert_eq!(decls.len(), 3);
        assert_eq!(decls[0].lines, 0..=1);
        assert_eq!(decls[1].lines, 2..=4);
        assert_eq!(decls[2].lines, 5..=5);
    }

    #[test]
    fn doc_comments_are_attached() {
        let decls = scan_src("// Unrelated.\n\n// Double doubles.\n/* and more */\nfunc Double() {}");
        assert_eq!(decls[0].lines, 2..=4);
        assert!(decls[0].entries[0].source.starts_with("// Double doubles."));
    }

    #[test]
    fn main_is_an_entry_point() {
        let decls = scan_src("func main() {\n\tprintln(1)\n}");
        assert_eq!(decls.len(), 1);
        assert!(decls[0].entry_point);
        assert!(decls[0].entries.is_empty());
    }

    #[test]
    fn keywords_inside_bodies_are_ignored() {
        let decls = scan_src("func f() {\n\tvar x = \"}\"\n\ttype T int\n\t_ = x\n}\nfunc g() {}");
        assert_eq!(
            keys(&decls),
            vec![DeclKey::Func("f".into()), DeclKey::Func("g".into())]
        );
    }

    #[test]
    fn semicolon_folds_rest_of_line() {
        let decls = scan_src("var a = 1; var b = 2\nvar c = 3");
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].lines, 0..=0);
        assert_eq!(
            keys(&decls),
            vec![
                DeclKey::Var("a".into()),
                DeclKey::Var("b".into()),
                DeclKey::Var("c".into()),
            ]
        );
        assert_eq!(decls[0].entries[0].source, "var a = 1");
        assert_eq!(decls[0].entries[1].source, "var b = 2");
        assert_eq!(decls[0].entries[1].names, vec!["b"]);
    }

    #[test]
    fn folded_imports_are_all_kept() {
        let decls = scan_src("import \"fmt\"; import \"os\"");
        assert_eq!(
            keys(&decls),
            vec![DeclKey::Import("fmt".into()), DeclKey::Import("os".into())]
        );
    }

    #[test]
    fn var_and_type_groups_split_per_spec() {
        let decls = scan_src("// Settings.\nvar (\n\ta = 1\n\tb, c = 2, 3\n)\ntype (\n\tID int\n\tPoint struct {\n\t\tX int\n\t}\n)");
        assert_eq!(decls.len(), 2);
        assert_eq!(
            keys(&decls),
            vec![
                DeclKey::Var("a".into()),
                DeclKey::Var("b, c".into()),
                DeclKey::Type("ID".into()),
                DeclKey::Type("Point".into()),
            ]
        );
        let sources: Vec<&str> = decls
            .iter()
            .flat_map(|d| d.entries.iter().map(|e| e.source.as_str()))
            .collect();
        assert_eq!(
            sources,
            vec![
                "// Settings.\nvar a = 1",
                "var b, c = 2, 3",
                "type ID int",
                "type Point struct {\n\t\tX int\n\t}",
            ]
        );
    }

    #[test]
    fn positional_const_groups_stay_whole() {
        let decls = scan_src("const (\n\tLow = 1\n\tHigh = 9\n)\nconst (\n\tA = iota\n\tB\n)");
        assert_eq!(
            keys(&decls),
            vec![
                DeclKey::Const("Low".into()),
                DeclKey::Const("High".into()),
                DeclKey::Const("A, B".into()),
            ]
        );
        assert_eq!(decls[1].entries[0].source, "const (\n\tA = iota\n\tB\n)");
    }

    #[test]
    fn statements_are_not_declarations() {
        let decls = scan_src("x := 1\nfmt.Println(x)\n");
        assert!(decls.is_empty());
    }

    #[test]
    fn generic_function_name() {
        let decls = scan_src("func Map[T, U any](xs []T, f func(T) U) []U { return nil }");
        assert_eq!(keys(&decls), vec![DeclKey::Func("Map".into())]);
    }
}
