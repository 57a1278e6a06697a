// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Path helpers using the canonical `/` separator.

/// Separator used when joining node names into paths.
pub const SEPARATOR: char = '/';

/// Joins a parent path and a child name.
#[must_use]
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        return name.to_owned();
    }
    let mut out = String::with_capacity(parent.len() + 1 + name.len());
    out.push_str(parent);
    if !parent.ends_with(SEPARATOR) {
        out.push(SEPARATOR);
    }
    out.push_str(name);
    out
}

/// Returns `path` relative to `base`, or `None` if `path` is not `base` or
/// below it. `base` itself maps to the empty string.
#[must_use]
pub fn relative<'a>(base: &str, path: &'a str) -> Option<&'a str> {
    let rest = path.strip_prefix(base)?;
    if rest.is_empty() || base.is_empty() {
        return Some(rest);
    }
    if base.ends_with(SEPARATOR) {
        return Some(rest);
    }
    rest.strip_prefix(SEPARATOR)
}

/// Returns `true` if `path` is rooted.
#[must_use]
pub fn is_absolute(path: &str) -> bool {
    path.starts_with(SEPARATOR)
}

/// Iterates the non-empty segments of `path`.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty() && *s != ".")
}
