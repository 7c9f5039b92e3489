//! Flattening of nested documents into dotted paths.
//!
//! Every field reachable within the depth budget gets one entry, including fields whose value is
//! itself a document. Only plain nested documents are descended into; arrays, dates, ids, and
//! binary payloads are recorded as they are.
//!
//! The depth budget counts remaining descents, so a budget of 0 records the top-level fields and
//! nothing else:
//!
//! ```
//! # use schema_variety::{doc, flatten};
//! let v = doc!({ "a": { "b": { "c": 1 } } });
//! let doc = v.as_map().unwrap();
//! assert_eq!(flatten(doc, 0).len(), 1);
//! assert!(flatten(doc, 1).contains_key("a.b"));
//! assert!(flatten(doc, 2).contains_key("a.b.c"));
//! ```

use indexmap::IndexMap;

use crate::{Document, Value, DEFAULT_MAX_DEPTH};

/// Flattened view of a document: path to the value found there, in traversal order.
pub type Flattened<'a> = IndexMap<String, &'a Value>;

/// Reusable flattening settings.
///
/// The exclusion prefix is matched against the raw path string, not against path segments:
/// excluding `"a.b"` also drops `"a.bc"`. An excluded path is neither recorded nor descended
/// into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Flattener {
    max_depth: usize,
    exclude_prefix: Option<String>,
}

impl Default for Flattener {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl Flattener {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            exclude_prefix: None,
        }
    }

    /// Set the maximum number of nested descents.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Skip every path starting with `prefix`. An empty prefix turns filtering off.
    pub fn exclude_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.exclude_prefix = if prefix.is_empty() { None } else { Some(prefix) };
        self
    }

    pub fn depth(&self) -> usize {
        self.max_depth
    }

    pub fn excluded(&self) -> Option<&str> {
        self.exclude_prefix.as_deref()
    }

    pub fn flatten<'a>(&self, doc: &'a Document) -> Flattened<'a> {
        let mut out = Flattened::new();
        self.walk(doc, None, self.max_depth, &mut out);
        out
    }

    fn walk<'a>(
        &self,
        doc: &'a Document,
        parent: Option<&str>,
        depth: usize,
        out: &mut Flattened<'a>,
    ) {
        for (key, value) in doc {
            let path = match parent {
                Some(parent) => format!("{}.{}", parent, key),
                None => key.clone(),
            };
            if let Some(ref prefix) = self.exclude_prefix {
                if path.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            // Later writes to the same path win, but keep the path's first position
            out.insert(path.clone(), value);
            if let Value::Map(child) = value {
                if depth > 0 {
                    self.walk(child, Some(&path), depth - 1, out);
                }
            }
        }
    }
}

/// Flatten `doc`, descending at most `max_depth` levels below the top.
pub fn flatten(doc: &Document, max_depth: usize) -> Flattened<'_> {
    Flattener::new(max_depth).flatten(doc)
}

/// Flatten `doc`, skipping every path that starts with `exclude_prefix`.
pub fn flatten_filtered<'a>(
    doc: &'a Document,
    max_depth: usize,
    exclude_prefix: &str,
) -> Flattened<'a> {
    Flattener::new(max_depth)
        .exclude_prefix(exclude_prefix)
        .flatten(doc)
}
