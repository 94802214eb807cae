//! Document paths and path-level mutations
//!
//! # Path Syntax
//!
//! - Dot-separated keys: `metadata.counters.commits`
//! - Array indexing: `metadata.history[0].event`
//! - Literal keys for names containing dots or slashes:
//!   `repositorySnapshot.branches[acme/feature/v1.2].head`
//!
//! A bracket holding only digits is an index, anything else is a key.
//!
//! ```
//! use gitstate_core::path::{DocPath, Segment};
//!
//! let path = DocPath::parse("repositorySnapshot.branches[acme/v1.2].exists").unwrap();
//! assert_eq!(path.segments()[2], Segment::Key("acme/v1.2".to_string()));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Parsed, non-empty path into the state document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocPath {
    raw: String,
    segments: Vec<Segment>,
}

impl DocPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut key = String::new();
        let mut after_bracket = false;
        let mut chars = raw.chars();

        while let Some(ch) = chars.next() {
            match ch {
                '.' => {
                    if key.is_empty() && !after_bracket {
                        return Err(Error::invalid_path(raw, "empty key"));
                    }
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    after_bracket = false;
                }
                '[' => {
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err(Error::invalid_path(raw, "unterminated '['"));
                    }
                    if inner.is_empty() {
                        return Err(Error::invalid_path(raw, "empty brackets"));
                    }
                    let segment = if inner.bytes().all(|b| b.is_ascii_digit()) {
                        let index = inner
                            .parse()
                            .map_err(|_| Error::invalid_path(raw, "index out of range"))?;
                        Segment::Index(index)
                    } else {
                        Segment::Key(inner)
                    };
                    segments.push(segment);
                    after_bracket = true;
                }
                ']' => return Err(Error::invalid_path(raw, "unexpected ']'")),
                _ => {
                    if after_bracket {
                        return Err(Error::invalid_path(raw, "expected '.' or '[' after ']'"));
                    }
                    key.push(ch);
                }
            }
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key));
        } else if raw.ends_with('.') {
            return Err(Error::invalid_path(raw, "trailing '.'"));
        }
        if segments.is_empty() {
            return Err(Error::invalid_path(raw, "path is empty"));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// First key of the path, the document section it touches.
    pub fn section(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(k)) => Some(k),
            _ => None,
        }
    }

    pub fn get<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.segments.iter().try_fold(root, |value, segment| match segment {
            Segment::Key(k) => value.get(k),
            Segment::Index(i) => value.get(*i),
        })
    }

    /// Set the value, creating intermediate objects. An index may address an
    /// existing element or one past the end (append).
    pub fn set(&self, root: &mut Value, new_value: Value) -> Result<Option<Value>> {
        let (last, parents) = self.split_last()?;
        let parent = self.walk_mut(root, parents, true)?;
        match last {
            Segment::Key(k) => match parent {
                Value::Object(map) => Ok(map.insert(k.clone(), new_value)),
                _ => Err(self.mismatch("an object")),
            },
            Segment::Index(i) => match parent {
                Value::Array(items) if *i < items.len() => {
                    Ok(Some(std::mem::replace(&mut items[*i], new_value)))
                }
                Value::Array(items) if *i == items.len() => {
                    items.push(new_value);
                    Ok(None)
                }
                Value::Array(items) => Err(Error::invalid_path(
                    &self.raw,
                    format!("index {i} out of bounds (length {})", items.len()),
                )),
                _ => Err(self.mismatch("an array")),
            },
        }
    }

    /// Remove and return the value, `None` when nothing was there.
    pub fn remove(&self, root: &mut Value) -> Result<Option<Value>> {
        let (last, parents) = self.split_last()?;
        let Ok(parent) = self.walk_mut(root, parents, false) else {
            return Ok(None);
        };
        Ok(match (last, parent) {
            (Segment::Key(k), Value::Object(map)) => map.remove(k),
            (Segment::Index(i), Value::Array(items)) if *i < items.len() => {
                Some(items.remove(*i))
            }
            _ => None,
        })
    }

    /// Add `by` to an integer, treating a missing value as zero.
    pub fn increment(&self, root: &mut Value, by: i64) -> Result<i64> {
        let current = match self.get(root) {
            None | Some(Value::Null) => 0,
            Some(v) => v.as_i64().ok_or_else(|| self.mismatch("an integer"))?,
        };
        let next = current
            .checked_add(by)
            .ok_or_else(|| self.mismatch("an integer within range"))?;
        self.set(root, Value::from(next))?;
        Ok(next)
    }

    /// Push onto an array, dropping the oldest entries beyond `max`.
    /// A missing value starts a new array. Returns the resulting length.
    pub fn append_bounded(&self, root: &mut Value, item: Value, max: usize) -> Result<usize> {
        if max == 0 {
            return Err(Error::invalid_path(&self.raw, "bound must be at least 1"));
        }
        if matches!(self.get(root), None | Some(Value::Null)) {
            self.set(root, Value::Array(Vec::new()))?;
        }
        let (last, parents) = self.split_last()?;
        let parent = self.walk_mut(root, parents, false)?;
        let target = match last {
            Segment::Key(k) => parent.get_mut(k),
            Segment::Index(i) => parent.get_mut(*i),
        };
        let Some(Value::Array(items)) = target else {
            return Err(self.mismatch("an array"));
        };
        items.push(item);
        if items.len() > max {
            let excess = items.len() - max;
            items.drain(..excess);
        }
        Ok(items.len())
    }

    fn split_last(&self) -> Result<(&Segment, &[Segment])> {
        self.segments
            .split_last()
            .ok_or_else(|| Error::invalid_path(&self.raw, "path is empty"))
    }

    fn walk_mut<'v>(
        &self,
        root: &'v mut Value,
        segments: &[Segment],
        create: bool,
    ) -> Result<&'v mut Value> {
        let mut value = root;
        for segment in segments {
            value = match segment {
                Segment::Key(k) => {
                    let Value::Object(map) = value else {
                        return Err(self.mismatch("an object"));
                    };
                    if create {
                        map.entry(k.clone())
                            .or_insert_with(|| Value::Object(Default::default()))
                    } else {
                        map.get_mut(k).ok_or_else(|| {
                            Error::invalid_path(&self.raw, format!("'{k}' does not exist"))
                        })?
                    }
                }
                Segment::Index(i) => {
                    let Value::Array(items) = value else {
                        return Err(self.mismatch("an array"));
                    };
                    let len = items.len();
                    items.get_mut(*i).ok_or_else(|| {
                        Error::invalid_path(
                            &self.raw,
                            format!("index {i} out of bounds (length {len})"),
                        )
                    })?
                }
            };
        }
        Ok(value)
    }

    fn mismatch(&self, expected: &str) -> Error {
        Error::TypeMismatch {
            path: self.raw.clone(),
            expected: expected.to_string(),
        }
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One path-level change to the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Mutation {
    Set { path: String, value: Value },
    Remove { path: String },
    Increment { path: String, by: i64 },
    Append { path: String, value: Value, max: usize },
}

impl Mutation {
    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Self::Set {
            path: path.into(),
            value,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Set { path, .. }
            | Self::Remove { path }
            | Self::Increment { path, .. }
            | Self::Append { path, .. } => path,
        }
    }

    /// Apply to `root`.
    ///
    /// Returns the previous value for `Set`, the removed value for `Remove`,
    /// the new number for `Increment` and the new length for `Append`.
    pub fn apply(&self, root: &mut Value) -> Result<Value> {
        let path = DocPath::parse(self.path())?;
        match self {
            Self::Set { value, .. } => Ok(path.set(root, value.clone())?.unwrap_or(Value::Null)),
            Self::Remove { .. } => Ok(path.remove(root)?.unwrap_or(Value::Null)),
            Self::Increment { by, .. } => path.increment(root, *by).map(Value::from),
            Self::Append { value, max, .. } => {
                path.append_bounded(root, value.clone(), *max).map(Value::from)
            }
        }
    }
}
