use std::collections::btree_set;
use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::{Document, TypeTag, Value};

/// Field name of the type list in a serialized profile.
pub const TYPES_FIELD: &str = "types";
/// Field name of the occurrence count in a serialized profile.
pub const OCCURRENCES_FIELD: &str = "occurrences";
/// Misspelled occurrence field still produced by older map functions. Accepted on input only.
pub const LEGACY_OCCURRENCES_FIELD: &str = "occurences";

/// A deduplicated set of type tags.
///
/// Order carries no meaning. Iteration and export are sorted so that reports come out the same
/// way every time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TypeSet(BTreeSet<TypeTag>);

impl TypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(tag: TypeTag) -> Self {
        let mut set = Self::new();
        set.add(tag);
        set
    }

    /// Add a tag. Returns false if it was already present.
    pub fn add(&mut self, tag: TypeTag) -> bool {
        self.0.insert(tag)
    }

    pub fn contains(&self, tag: &TypeTag) -> bool {
        self.0.contains(tag)
    }

    /// Remove a tag. Returns false if it wasn't present.
    pub fn remove(&mut self, tag: &TypeTag) -> bool {
        self.0.remove(tag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, TypeTag> {
        self.0.iter()
    }

    /// Export the set as a plain sequence.
    pub fn to_vec(&self) -> Vec<TypeTag> {
        self.0.iter().copied().collect()
    }

    /// Add every tag of `other` to this set.
    pub fn union_with(&mut self, other: &TypeSet) {
        self.0.extend(other.0.iter().copied());
    }
}

impl Extend<TypeTag> for TypeSet {
    fn extend<I: IntoIterator<Item = TypeTag>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl FromIterator<TypeTag> for TypeSet {
    fn from_iter<I: IntoIterator<Item = TypeTag>>(iter: I) -> Self {
        TypeSet(iter.into_iter().collect())
    }
}

impl IntoIterator for TypeSet {
    type Item = TypeTag;
    type IntoIter = btree_set::IntoIter<TypeTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a TypeSet {
    type Item = &'a TypeTag;
    type IntoIter = btree_set::Iter<'a, TypeTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for TypeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for TypeSet {
    /// Accepts any list of tags, duplicates included.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tags = Vec::<TypeTag>::deserialize(deserializer)?;
        Ok(tags.into_iter().collect())
    }
}

/// Per-path accumulator: which types were seen at a path, and how many times the path was seen.
///
/// Counts saturate at `u64::MAX` instead of wrapping.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProfileFields")]
pub struct TypeProfile {
    pub types: TypeSet,
    pub occurrences: u64,
}

/// Serialized profile, with the count under either spelling. `occurrences` wins if both are
/// present.
#[derive(Deserialize)]
struct ProfileFields {
    types: TypeSet,
    occurrences: Option<u64>,
    #[serde(rename = "occurences")]
    legacy_occurrences: Option<u64>,
}

impl TryFrom<ProfileFields> for TypeProfile {
    type Error = Error;

    fn try_from(fields: ProfileFields) -> Result<Self> {
        let occurrences = fields
            .occurrences
            .or(fields.legacy_occurrences)
            .ok_or_else(|| Error::MalformedProfile(format!("missing `{}`", OCCURRENCES_FIELD)))?;
        Ok(TypeProfile {
            types: fields.types,
            occurrences,
        })
    }
}

impl TypeProfile {
    /// Profile of a single observation.
    pub fn seed(tag: TypeTag) -> Self {
        Self {
            types: TypeSet::singleton(tag),
            occurrences: 1,
        }
    }

    /// Merge another profile into this one: union of types, sum of occurrences.
    pub fn absorb(&mut self, other: &TypeProfile) {
        self.types.union_with(&other.types);
        self.occurrences = self.occurrences.saturating_add(other.occurrences);
    }

    /// Merge any number of profiles into one. Grouping and order don't affect the result.
    pub fn merge<I>(profiles: I) -> TypeProfile
    where
        I: IntoIterator<Item = TypeProfile>,
    {
        profiles
            .into_iter()
            .fold(TypeProfile::default(), |mut acc, profile| {
                acc.types.extend(profile.types);
                acc.occurrences = acc.occurrences.saturating_add(profile.occurrences);
                acc
            })
    }

    /// Read a partial profile out of the host's document format.
    ///
    /// The value must be a map holding a `types` list of tag names and a non-negative integer
    /// `occurrences` (or the legacy `occurences`). Duplicate tags are folded together.
    pub fn from_value(value: &Value) -> Result<TypeProfile> {
        let map = value.as_map().ok_or_else(|| {
            Error::MalformedProfile(format!("expected a map, got {:?}", value))
        })?;

        let types = match map.get(TYPES_FIELD) {
            Some(Value::Array(list)) => list
                .iter()
                .map(|v| match v {
                    Value::Str(s) => s.parse::<TypeTag>(),
                    other => Err(Error::MalformedProfile(format!(
                        "type tags must be strings, got {:?}",
                        other
                    ))),
                })
                .collect::<Result<TypeSet>>()?,
            Some(other) => {
                return Err(Error::MalformedProfile(format!(
                    "`{}` must be a list, got {:?}",
                    TYPES_FIELD, other
                )))
            }
            None => {
                return Err(Error::MalformedProfile(format!(
                    "missing `{}`",
                    TYPES_FIELD
                )))
            }
        };

        let count = map
            .get(OCCURRENCES_FIELD)
            .or_else(|| map.get(LEGACY_OCCURRENCES_FIELD))
            .ok_or_else(|| Error::MalformedProfile(format!("missing `{}`", OCCURRENCES_FIELD)))?;
        let occurrences = count.as_u64().ok_or_else(|| {
            Error::MalformedProfile(format!(
                "`{}` must be a non-negative integer, got {:?}",
                OCCURRENCES_FIELD, count
            ))
        })?;

        Ok(TypeProfile { types, occurrences })
    }

    /// Write the profile in the host's document format.
    pub fn to_value(&self) -> Value {
        let mut map = Document::with_capacity(2);
        map.insert(
            TYPES_FIELD.to_string(),
            self.types.iter().map(|t| Value::Str(t.to_string())).collect(),
        );
        map.insert(OCCURRENCES_FIELD.to_string(), Value::from(self.occurrences));
        Value::Map(map)
    }
}
