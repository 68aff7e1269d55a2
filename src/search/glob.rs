//! Glob-to-SQL translation: `lex_glob`, `glob_to_sql`, `looks_like_glob`.
//!
//! Applied in that order, with [`super::normalise::normalise`] sandwiched
//! between the first two steps: lex the raw operator input into a composite
//! string (so `?`/`*` survive as symbols), normalise the TEXT parts for the
//! field's casemap, then translate into a `LIKE` pattern. Doing the SQL
//! translation last means a literal `%` or `_` the operator typed is escaped
//! (`\%`, `\_`) rather than accidentally becoming a wildcard.

use super::composite::{CompositeString, Part};

/// Lex a glob pattern into a composite string. `\` escapes the following
/// character (so `\*` is literal text, not a wildcard); unescaped `?` and
/// `*` become `Symbol` parts, everything else becomes `Text`.
pub fn lex_glob(s: &str) -> CompositeString {
    let mut out = CompositeString::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                push_text(&mut out, escaped);
            } else {
                // Trailing lone backslash: keep it literally.
                push_text(&mut out, '\\');
            }
        } else if c == '?' || c == '*' {
            out.push(Part::Symbol(c.to_string()));
        } else {
            push_text(&mut out, c);
        }
    }

    out
}

fn push_text(out: &mut CompositeString, c: char) {
    // Coalesce adjacent TEXT parts so normalisation's stateful '@' tracking
    // (see FieldKind::Mask) sees contiguous runs rather than one-char parts.
    if let Some(Part::Text(last)) = out.0.last_mut() {
        last.push(c);
    } else {
        out.push(Part::Text(c.to_string()));
    }
}

/// Translate a (normalised) composite string into SQL `LIKE` syntax.
///
/// - glob `?` -> SQL `_`, glob `*` -> SQL `%` (both become `Symbol`s).
/// - a TEXT part that is literally `_` or `%` is escaped to `\_` / `\%`
///   (turned into a `Symbol` so later stages leave it alone).
/// - every other TEXT part passes through unchanged.
///
/// Must run AFTER normalisation, not before, or the escaped `\_`/`\%`
/// symbols would be casefolded along with ordinary text.
pub fn glob_to_sql(input: &CompositeString) -> CompositeString {
    let mut out = CompositeString::new();

    for part in input.iter() {
        match part {
            Part::Symbol(sym) => {
                let translated = match sym.as_str() {
                    "?" => "_",
                    "*" => "%",
                    other => other, // already-translated symbol, e.g. from a prior pass
                };
                out.push(Part::Symbol(translated.to_string()));
            }
            Part::Text(text) => {
                // A TEXT part may contain a run of characters where only
                // some are literal SQL metacharacters; split those out so
                // escaping is correct character-by-character.
                for c in text.chars() {
                    if c == '_' || c == '%' {
                        out.push(Part::Symbol(format!("\\{c}")));
                    } else {
                        push_text_sql(&mut out, c);
                    }
                }
            }
        }
    }

    out
}

fn push_text_sql(out: &mut CompositeString, c: char) {
    if let Some(Part::Text(last)) = out.0.last_mut() {
        last.push(c);
    } else {
        out.push(Part::Text(c.to_string()));
    }
}

/// True iff `s` contains an unescaped `?` or `*`.
pub fn looks_like_glob(s: &str) -> bool {
    lex_glob(s)
        .iter()
        .any(|p| matches!(p, Part::Symbol(sym) if sym == "?" || sym == "*"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::normalise::{normalise, FieldKind};

    #[test]
    fn lex_glob_splits_symbols_and_coalesces_text() {
        let cs = lex_glob("FOO*bar?baz");
        assert_eq!(
            cs.0,
            vec![
                Part::Text("FOO".into()),
                Part::Symbol("*".into()),
                Part::Text("bar".into()),
                Part::Symbol("?".into()),
                Part::Text("baz".into()),
            ]
        );
    }

    #[test]
    fn lex_glob_honours_backslash_escapes() {
        let cs = lex_glob(r"\*literal");
        assert_eq!(cs.0, vec![Part::Text("*literal".into())]);
    }

    #[test]
    fn literal_percent_and_underscore_are_escaped_glob_wildcards_translated() {
        let lexed = lex_glob("50%_off*");
        let sql = glob_to_sql(&lexed);
        assert_eq!(sql.to_string(), r"50\%\_off%");
    }

    #[test]
    fn full_pipeline_lowercases_but_preserves_wildcards() {
        let lexed = lex_glob("FOO*");
        let normalised = normalise(&lexed, FieldKind::Nick);
        let sql = glob_to_sql(&normalised);
        assert_eq!(sql.to_string(), "foo%");
    }

    #[test]
    fn underscore_in_query_does_not_become_a_sql_wildcard() {
        // "foo_bar" must not match "fooXbar" - the literal underscore has to
        // survive as an escaped literal all the way through.
        let lexed = lex_glob("foo_bar");
        let normalised = normalise(&lexed, FieldKind::Nick);
        let sql = glob_to_sql(&normalised);
        assert_eq!(sql.to_string(), r"foo\_bar");
    }

    #[test]
    fn looks_like_glob_detects_unescaped_wildcards_only() {
        assert!(looks_like_glob("foo*"));
        assert!(looks_like_glob("foo?bar"));
        assert!(!looks_like_glob(r"foo\*bar"));
        assert!(!looks_like_glob("plainhost.example.com"));
    }
}
