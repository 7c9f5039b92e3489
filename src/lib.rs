//! schema-variety tabulates which value types appear at which field paths across a collection of
//! semi-structured documents.
//!
//! A run has three stages:
//!
//! - Flattening: each document is walked depth-first, and every field reachable within a depth
//! 	budget becomes a dotted path (`a.b.c`). A raw string prefix can be used to exclude fields.
//! - Classification: the value at each path is given a [`TypeTag`], such as `Number`, `null`, or
//! 	`BinData-UUID`.
//! - Aggregation: tags and occurrence counts for the same path are merged. The merge is
//! 	associative and commutative, so documents can be split across threads or batches in any
//! 	way and the partial reports folded together afterwards.
//!
//! The result is a [`Report`] mapping each path to a [`TypeProfile`] of the types seen there
//! and how many times the path was seen:
//!
//! ```
//! # use schema_variety::*;
//! # fn main() -> Result<()> {
//! let docs: Vec<Document> = vec![
//!     doc!({ "_id": 1, "name": "a" }),
//!     doc!({ "_id": 2, "name": 2 }),
//!     doc!({ "_id": 3, "age": 5 }),
//! ]
//! .into_iter()
//! .filter_map(Value::into_map)
//! .collect();
//!
//! let out = VarietyJob::new(JobOptions::default()).run_parallel(&docs)?;
//! assert_eq!(out.report.get("_id").unwrap().occurrences, 3);
//! assert_eq!(out.report.get("name").unwrap().types.len(), 2);
//! assert_eq!(out.report.get("age").unwrap().occurrences, 1);
//! # Ok(())
//! # }
//! ```
//!
//! Documents can be built with the [`doc!`] macro or deserialized from the store's extended JSON
//! (`{"$date": ...}`, `{"$oid": ...}`, `{"$binary": ...}`) with any serde format.

#![recursion_limit = "256"]

#[macro_use]
mod macros;

mod aggregate;
mod binary;
mod classify;
mod error;
mod flatten;
mod job;
mod object_id;
mod options;
mod profile;
mod timestamp;
mod value;

pub use aggregate::*;
pub use binary::*;
pub use classify::*;
pub use error::{Error, Result};
pub use flatten::*;
pub use job::*;
pub use object_id::*;
pub use options::*;
pub use profile::*;
pub use timestamp::*;
pub use value::*;

#[doc(hidden)]
pub use serde_json as __serde_json;

/// Default number of nested descents the flattener makes below the top-level fields.
pub const DEFAULT_MAX_DEPTH: usize = 5;
