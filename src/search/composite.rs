//! Composite strings: the text/wildcard-symbol carrier used by [`super::normalise`]
//! and [`super::glob`].
//!
//! A glob like `*Alice*@Host*` has to survive casefolding without its `*`s
//! being touched, and then has to survive SQL-`LIKE` translation without its
//! already-folded text being touched either. Representing the string as a
//! sequence of tagged parts instead of a plain `String` lets each stage treat
//! `Symbol` parts as opaque while it rewrites `Text` parts.

use std::fmt;

/// One part of a [`CompositeString`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// Ordinary text, subject to casefolding.
    Text(String),
    /// A wildcard metacharacter (or its SQL/escaped counterpart), passed
    /// through every transformation verbatim.
    Symbol(String),
}

impl Part {
    pub fn text(&self) -> &str {
        match self {
            Part::Text(s) | Part::Symbol(s) => s,
        }
    }
}

/// An ordered sequence of [`Part`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeString(pub Vec<Part>);

impl CompositeString {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, part: Part) {
        self.0.push(part);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Part> {
        self.0.iter()
    }

    /// A composite string with a single `Text` part, useful for fields that
    /// never carry wildcards (plain nicknames, hostnames, etc).
    pub fn plain(s: impl Into<String>) -> Self {
        Self(vec![Part::Text(s.into())])
    }
}

impl fmt::Display for CompositeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.0 {
            f.write_str(part.text())?;
        }
        Ok(())
    }
}

impl From<&str> for CompositeString {
    fn from(s: &str) -> Self {
        Self::plain(s)
    }
}

impl From<String> for CompositeString {
    fn from(s: String) -> Self {
        Self::plain(s)
    }
}
