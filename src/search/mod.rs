//! Casemap normalisation and glob-to-SQL translation (spec §4.1-4.2).
//!
//! The three submodules form a small pipeline: [`composite`] carries a
//! string through the other two without losing track of which parts are
//! wildcard metacharacters, [`normalise`] applies the per-field casemap,
//! and [`glob`] lexes operator-typed globs and rewrites them into `LIKE`
//! patterns.

mod composite;
mod glob;
mod normalise;

pub use composite::{CompositeString, Part};
pub use glob::{glob_to_sql, lex_glob, looks_like_glob};
pub use normalise::{normalise, normalise_plain, rfc1459_fold, FieldKind};

/// Build a `LIKE`-ready search pattern from raw operator input: lex as a
/// glob, casefold the text parts for `kind`, translate to SQL syntax, and
/// flatten to a plain string ready for a bound `$n` parameter.
pub fn build_like_pattern(raw: &str, kind: FieldKind) -> String {
    let lexed = lex_glob(raw);
    let normalised = normalise(&lexed, kind);
    glob_to_sql(&normalised).to_string()
}
