//! Casemap-aware normalisation of composite strings into search keys.
//!
//! Every searchable column in the store (`search_nick`, `search_host`, ...)
//! is populated by running the raw value through [`normalise`] with the
//! [`FieldKind`] appropriate to that column, so that equivalent nicknames
//! (`foobar` / `FOOBAR` under RFC1459) or hosts (mixed-case DNS labels) land
//! on the same key regardless of how an operator typed their query.

use super::composite::{CompositeString, Part};

/// Which casemap policy applies to a field, per spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Nick,
    User,
    Real,
    Host,
    Tag,
    Mask,
    Email,
}

/// RFC1459 casefold: ASCII lowercase plus `{}|^` folded onto `[]\~`.
///
/// This is the fold Solanum (and most TS6 ircds) use for nicknames and
/// usernames; `{`, `}`, `|`, `^` are the lowercase siblings of `[`, `]`,
/// `\`, `~` so that e.g. `Nick[away]` and `nick{away}` collide.
pub fn rfc1459_fold(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'A'..='Z' => c.to_ascii_lowercase(),
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            other => other,
        })
        .collect()
}

/// Normalise a composite string into a search key for the given field kind.
///
/// `Symbol` parts (wildcard metacharacters) always pass through untouched;
/// only `Text` parts are casefolded. For `Mask`, the `@` boundary is tracked
/// across the whole composite (a glob can split `user@host` across multiple
/// parts if the `@` itself sits next to a wildcard), folding the user side
/// with RFC1459 and lowercasing the host side.
pub fn normalise(input: &CompositeString, kind: FieldKind) -> CompositeString {
    let mut out = CompositeString::new();
    let mut seen_at = false;

    for part in input.iter() {
        match part {
            Part::Symbol(_) => out.push(part.clone()),
            Part::Text(text) => {
                let folded = match kind {
                    FieldKind::Nick | FieldKind::User | FieldKind::Tag => rfc1459_fold(text),
                    FieldKind::Mask => fold_mask_part(text, &mut seen_at),
                    FieldKind::Real | FieldKind::Host | FieldKind::Email => text.to_lowercase(),
                };
                out.push(Part::Text(folded));
            }
        }
    }

    out
}

fn fold_mask_part(text: &str, seen_at: &mut bool) -> String {
    if *seen_at {
        return text.to_lowercase();
    }

    match text.find('@') {
        None => rfc1459_fold(text),
        Some(idx) => {
            *seen_at = true;
            let (user, rest) = text.split_at(idx);
            let host = &rest[1..]; // skip the '@' itself
            format!("{}@{}", rfc1459_fold(user), host.to_lowercase())
        }
    }
}

/// Convenience: normalise a plain (non-glob) string for a field kind,
/// returning a plain `String` search key. Used for fields that never carry
/// wildcards, e.g. the source/oper attribution on a kline row.
pub fn normalise_plain(s: &str, kind: FieldKind) -> String {
    normalise(&CompositeString::plain(s), kind).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::composite::Part;

    #[test]
    fn nick_folds_but_preserves_symbols() {
        let cs = CompositeString(vec![Part::Text("FOO".into()), Part::Symbol("*".into())]);
        let out = normalise(&cs, FieldKind::Nick);
        assert_eq!(out.to_string(), "foo*");
    }

    #[test]
    fn nick_fold_is_idempotent() {
        let once = normalise_plain("Nick[Away]", FieldKind::Nick);
        let twice = normalise_plain(&once, FieldKind::Nick);
        assert_eq!(once, twice);
    }

    #[test]
    fn rfc1459_maps_bracket_siblings_together() {
        assert_eq!(rfc1459_fold("Nick[Away]"), rfc1459_fold("nick{away}"));
    }

    #[test]
    fn mask_folds_user_and_lowercases_host_across_at_boundary() {
        let cs = CompositeString(vec![Part::Text("Alice@Host.Example".into())]);
        let out = normalise(&cs, FieldKind::Mask);
        assert_eq!(out.to_string(), "alice@host.example");
    }

    #[test]
    fn mask_at_straddling_a_wildcard_still_folds_correctly() {
        // "*Alice*@Host*" lexed as glob: Symbol(*) Text(Alice) Symbol(*) Text(@) Symbol
        // is contrived; the realistic case is the '@' sitting whole inside one
        // TEXT part while wildcards bracket it, which `lex_glob` always produces
        // since '@' is not a glob metacharacter.
        let cs = CompositeString(vec![
            Part::Symbol("*".into()),
            Part::Text("Alice".into()),
            Part::Symbol("*".into()),
            Part::Text("@Host".into()),
            Part::Symbol("*".into()),
        ]);
        let out = normalise(&cs, FieldKind::Mask);
        assert_eq!(out.to_string(), "*alice*@host*");
    }

    #[test]
    fn real_and_host_are_plain_ascii_lowercase() {
        assert_eq!(normalise_plain("Example.COM", FieldKind::Host), "example.com");
        assert_eq!(normalise_plain("Jane Doe", FieldKind::Real), "jane doe");
    }
}
