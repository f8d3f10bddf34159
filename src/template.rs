// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of monitor-output.
//
// monitor-output is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// monitor-output is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See
// the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with monitor-output.  If
// not, see <http://www.gnu.org/licenses/>.

//! Field substitution in user-authored templates.
//!
//! # Introduction
//!
//! Trapper keys & values are configured as templates like `app.%(facility).errors` or
//! `%(message) (%(exception))`. At send time, each `%(name)` placeholder is replaced with the
//! value of the event field `name`.
//!
//! The substitution policy is "best effort": templates are written by people, and will
//! routinely reference fields that only some events carry. A placeholder naming an absent field
//! is therefore left in the output verbatim rather than failing the send.
//!
//! # Rules
//!
//! - a placeholder is exactly `%(` name `)`, where the name contains no parentheses
//! - names match exactly; `%(level)` has nothing to do with `%(level2)`
//! - substitution is a single pass: text inserted from a field is never re-scanned, so a field
//!   whose value happens to look like `%(other)` is inserted as-is
//! - since every placeholder is resolved independently, the order in which fields are stored
//!   cannot change the result
//! - a `%(` with no closing parenthesis is just text
//!
//! # Examples
//!
//! ```rust
//! use monitor_output::template::render;
//! use std::collections::BTreeMap;
//!
//! let mut fields = BTreeMap::new();
//! fields.insert("a".to_string(), "x".to_string());
//! assert_eq!(render("%(a)-%(b)", &fields), "x-%(b)");
//! ```

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// Anything against which placeholder names can be resolved.
pub trait Lookup {
    /// Return the string value of field `name`, if present.
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>>;
}

impl Lookup for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|s| Cow::Borrowed(s.as_str()))
    }
}

impl<S: std::hash::BuildHasher> Lookup for HashMap<String, String, S> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|s| Cow::Borrowed(s.as_str()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A template, split once into literal text & placeholders so that rendering is a simple walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn new<S: Into<String>>(source: S) -> Template {
        let source = source.into();
        let mut segments: Vec<Segment> = Vec::new();

        fn push_literal(segments: &mut Vec<Segment>, text: &str) {
            if text.is_empty() {
                return;
            }
            match segments.last_mut() {
                Some(Segment::Literal(last)) => last.push_str(text),
                _ => segments.push(Segment::Literal(text.to_string())),
            }
        }

        let mut rest = source.as_str();
        while let Some(start) = rest.find("%(") {
            let after = &rest[start + 2..];
            match after.find(')') {
                Some(end) if !after[..end].contains('(') => {
                    push_literal(&mut segments, &rest[..start]);
                    segments.push(Segment::Field(after[..end].to_string()));
                    rest = &after[end + 1..];
                }
                // Something like `%(a%(b)`: this `%(` can't open a placeholder, but a later one
                // might.
                Some(_) => {
                    push_literal(&mut segments, &rest[..start + 2]);
                    rest = after;
                }
                None => break,
            }
        }
        push_literal(&mut segments, rest);

        Template { source, segments }
    }
    /// The template text, as configured
    pub fn as_str(&self) -> &str {
        &self.source
    }
    /// True if the template contains no text at all
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
    /// The names of all fields this template references, in order of appearance
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|seg| match seg {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
    /// Substitute every placeholder whose name `fields` knows; leave the others untouched.
    pub fn render(&self, fields: &impl Lookup) -> String {
        let mut out = String::with_capacity(self.source.len());
        for seg in &self.segments {
            match seg {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => match fields.lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push_str("%(");
                        out.push_str(name);
                        out.push(')');
                    }
                },
            }
        }
        out
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::convert::From<&str> for Template {
    fn from(x: &str) -> Self {
        Template::new(x)
    }
}

impl std::convert::From<String> for Template {
    fn from(x: String) -> Self {
        Template::new(x)
    }
}

/// Render `template` against `fields` in one go.
pub fn render(template: &str, fields: &impl Lookup) -> String {
    Template::new(template).render(fields)
}
