//! Accumulators for per-path results.
//!
//! [`Report`] and [`PresenceReport`] are plain owned maps, one per worker or batch. They merge
//! with each other in any order and any grouping. [`SharedReport`] is the accumulator for the
//! final fold when partial results arrive from several threads at once.

use std::collections::{btree_map, BTreeMap};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{Document, TypeProfile, TypeTag, Value};

/// Reduce a list of partial profiles in the host's document format into one profile.
///
/// Each partial may carry duplicate tags, and may itself be the output of an earlier reduce.
/// Any malformed partial fails the whole reduce.
pub fn reduce_partials(values: &[Value]) -> Result<TypeProfile> {
    let profiles = values
        .iter()
        .map(TypeProfile::from_value)
        .collect::<Result<Vec<TypeProfile>>>()?;
    Ok(TypeProfile::merge(profiles))
}

/// The full variety report: path to the types seen there and the number of occurrences.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report {
    entries: BTreeMap<String, TypeProfile>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a single observation of `tag` at `path`.
    pub fn insert_seed(&mut self, path: impl Into<String>, tag: TypeTag) {
        self.fold_in(path, TypeProfile::seed(tag));
    }

    /// Merge a profile into whatever is already recorded at `path`.
    pub fn fold_in(&mut self, path: impl Into<String>, profile: TypeProfile) {
        match self.entries.entry(path.into()) {
            btree_map::Entry::Occupied(mut e) => e.get_mut().absorb(&profile),
            btree_map::Entry::Vacant(e) => {
                e.insert(profile);
            }
        }
    }

    /// Merge another report into this one.
    pub fn merge(&mut self, other: Report) {
        for (path, profile) in other.entries {
            self.fold_in(path, profile);
        }
    }

    pub fn get(&self, path: &str) -> Option<&TypeProfile> {
        self.entries.get(path)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths and their profiles, sorted by path.
    pub fn iter(&self) -> btree_map::Iter<'_, String, TypeProfile> {
        self.entries.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Write the report in the host's document format.
    pub fn to_value(&self) -> Value {
        let map: Document = self
            .entries
            .iter()
            .map(|(path, profile)| (path.clone(), profile.to_value()))
            .collect();
        Value::Map(map)
    }

    /// Read a report back from the host's document format, e.g. the output collection of an
    /// earlier run, so it can be folded into a new one.
    pub fn from_value(value: &Value) -> Result<Report> {
        let map = value.as_map().ok_or_else(|| {
            Error::MalformedProfile(format!("expected a map of profiles, got {:?}", value))
        })?;
        let mut report = Report::new();
        for (path, partial) in map {
            report.fold_in(path.as_str(), TypeProfile::from_value(partial)?);
        }
        Ok(report)
    }
}

impl FromIterator<(String, TypeProfile)> for Report {
    fn from_iter<I: IntoIterator<Item = (String, TypeProfile)>>(iter: I) -> Self {
        let mut report = Report::new();
        for (path, profile) in iter {
            report.fold_in(path, profile);
        }
        report
    }
}

impl IntoIterator for Report {
    type Item = (String, TypeProfile);
    type IntoIter = btree_map::IntoIter<String, TypeProfile>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Report {
    type Item = (&'a String, &'a TypeProfile);
    type IntoIter = btree_map::Iter<'a, String, TypeProfile>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// The counting-only report: path to the number of documents holding it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceReport {
    counts: BTreeMap<String, u64>,
}

impl PresenceReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold_in(&mut self, path: impl Into<String>, count: u64) {
        let total = self.counts.entry(path.into()).or_insert(0);
        *total = total.saturating_add(count);
    }

    pub fn merge(&mut self, other: PresenceReport) {
        for (path, count) in other.counts {
            self.fold_in(path, count);
        }
    }

    pub fn get(&self, path: &str) -> Option<u64> {
        self.counts.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, u64> {
        self.counts.iter()
    }

    pub fn to_value(&self) -> Value {
        let map: Document = self
            .counts
            .iter()
            .map(|(path, count)| (path.clone(), Value::from(*count)))
            .collect();
        Value::Map(map)
    }
}

/// Concurrent accumulator for the final fold.
///
/// Each merge into a path runs under that path's shard lock, so a reader either sees a profile
/// before a merge or after it, never halfway through.
#[derive(Debug, Default)]
pub struct SharedReport {
    entries: DashMap<String, TypeProfile>,
}

impl SharedReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold_in(&self, path: impl Into<String>, profile: TypeProfile) {
        match self.entries.entry(path.into()) {
            Entry::Occupied(mut e) => e.get_mut().absorb(&profile),
            Entry::Vacant(e) => {
                e.insert(profile);
            }
        }
    }

    pub fn merge(&self, report: Report) {
        for (path, profile) in report {
            self.fold_in(path, profile);
        }
    }

    /// Copy of the profile currently recorded at `path`.
    pub fn snapshot(&self, path: &str) -> Option<TypeProfile> {
        self.entries.get(path).map(|p| p.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_report(self) -> Report {
        self.entries.into_iter().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::prelude::*;
    use std::sync::Arc;

    const TAGS: [TypeTag; 5] = [
        TypeTag::String,
        TypeTag::Number,
        TypeTag::Null,
        TypeTag::Object,
        TypeTag::Array,
    ];

    fn random_profiles<R: Rng>(rng: &mut R, n: usize) -> Vec<TypeProfile> {
        (0..n)
            .map(|_| {
                let mut p = TypeProfile::seed(*TAGS.choose(rng).unwrap());
                p.occurrences = rng.gen_range(1..5);
                if rng.gen_bool(0.3) {
                    p.types.add(*TAGS.choose(rng).unwrap());
                }
                p
            })
            .collect()
    }

    #[test]
    fn merge_grouping_and_order_dont_matter() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let n = rng.gen_range(0..20);
            let profiles = random_profiles(&mut rng, n);
            let whole = TypeProfile::merge(profiles.clone());

            let split = rng.gen_range(0..=n);
            let (g1, g2) = profiles.split_at(split);
            let left = TypeProfile::merge(g1.to_vec());
            let right = TypeProfile::merge(g2.to_vec());
            assert_eq!(TypeProfile::merge(vec![left.clone(), right.clone()]), whole);
            assert_eq!(TypeProfile::merge(vec![right, left]), whole);

            let mut shuffled = profiles;
            shuffled.shuffle(&mut rng);
            assert_eq!(TypeProfile::merge(shuffled), whole);
        }
    }

    #[test]
    fn report_merge_in_any_order() {
        let mut rng = rand::thread_rng();
        let paths = ["a", "b", "a.b", "c"];
        let mut parts = Vec::new();
        for _ in 0..30 {
            let mut r = Report::new();
            for p in random_profiles(&mut rng, 5) {
                r.fold_in(*paths.choose(&mut rng).unwrap(), p);
            }
            parts.push(r);
        }
        let mut forward = Report::new();
        for r in parts.iter().cloned() {
            forward.merge(r);
        }
        parts.shuffle(&mut rng);
        let mut pairs = Vec::new();
        for chunk in parts.chunks(4) {
            let mut r = Report::new();
            for c in chunk.iter().cloned() {
                r.merge(c);
            }
            pairs.push(r);
        }
        let mut regrouped = Report::new();
        for r in pairs {
            regrouped.merge(r);
        }
        assert_eq!(forward, regrouped);
    }

    #[test]
    fn reduce_partials_dedupes_on_ingestion() {
        let partials = vec![
            doc!({ "types": ["String"], "occurences": 1 }),
            doc!({ "types": ["Number"], "occurences": 1 }),
            doc!({ "types": ["String"], "occurences": 1 }),
            doc!({ "types": ["Object"], "occurences": 1 }),
            doc!({ "types": ["Number"], "occurences": 1 }),
        ];
        let p = reduce_partials(&partials).unwrap();
        assert_eq!(
            p.types.to_vec(),
            vec![TypeTag::Number, TypeTag::String, TypeTag::Object]
        );
        assert_eq!(p.occurrences, 5);
    }

    #[test]
    fn reduce_accepts_its_own_output() {
        let first = reduce_partials(&[
            doc!({ "types": ["String", "String"], "occurrences": 2 }),
            doc!({ "types": ["Number"], "occurrences": 1 }),
        ])
        .unwrap();
        let again = reduce_partials(&[
            first.to_value(),
            doc!({ "types": ["String"], "occurrences": 1 }),
        ])
        .unwrap();
        assert_eq!(again.types.len(), 2);
        assert_eq!(again.occurrences, 4);
    }

    #[test]
    fn reduce_fails_on_malformed_partial() {
        let res = reduce_partials(&[
            doc!({ "types": ["String"], "occurrences": 1 }),
            doc!({ "types": ["String"] }),
        ]);
        assert!(matches!(res, Err(Error::MalformedProfile(_))));
    }

    #[test]
    fn report_value_roundtrip() {
        let mut r = Report::new();
        r.insert_seed("name", TypeTag::String);
        r.insert_seed("name", TypeTag::Number);
        r.insert_seed("_id", TypeTag::ObjectId);
        let v = r.to_value();
        assert_eq!(v["name"]["occurrences"], Value::Int(2));
        assert_eq!(Report::from_value(&v).unwrap(), r);
        assert!(Report::from_value(&doc!([1])).is_err());
    }

    #[test]
    fn report_serde() {
        let mut r = Report::new();
        r.insert_seed("age", TypeTag::Number);
        let enc = serde_json::to_string(&r).unwrap();
        assert_eq!(enc, r#"{"age":{"types":["Number"],"occurrences":1}}"#);
        let dec: Report = serde_json::from_str(&enc).unwrap();
        assert_eq!(dec, r);
    }

    #[test]
    fn presence_counts_sum() {
        let mut a = PresenceReport::new();
        a.fold_in("x", 1);
        a.fold_in("x", 1);
        let mut b = PresenceReport::new();
        b.fold_in("x", 3);
        b.fold_in("y", 1);
        a.merge(b);
        assert_eq!(a.get("x"), Some(5));
        assert_eq!(a.get("y"), Some(1));
        assert_eq!(a.get("z"), None);
        assert_eq!(a.to_value()["x"], Value::Int(5));
    }

    #[test]
    fn reduce_near_max_count_saturates() {
        let big = doc!({ "types": ["String"], "occurrences": i64::MAX });
        let p = reduce_partials(&[big.clone(), big.clone(), big]).unwrap();
        assert_eq!(p.occurrences, u64::MAX);
        let mut presence = PresenceReport::new();
        presence.fold_in("x", u64::MAX);
        presence.fold_in("x", 1);
        assert_eq!(presence.get("x"), Some(u64::MAX));
    }

    #[test]
    fn shared_report_from_many_threads() {
        let shared = Arc::new(SharedReport::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let shared = shared.clone();
            handles.push(std::thread::spawn(move || {
                for j in 0..1000 {
                    let tag = TAGS[(i + j) % TAGS.len()];
                    shared.fold_in("hot", TypeProfile::seed(tag));
                    shared.fold_in(format!("cold.{}", i), TypeProfile::seed(tag));
                    if let Some(p) = shared.snapshot("hot") {
                        assert!(!p.types.is_empty());
                        assert!(p.occurrences >= 1);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let shared = Arc::try_unwrap(shared).unwrap();
        assert_eq!(shared.len(), 9);
        let report = shared.into_report();
        assert_eq!(report.get("hot").unwrap().occurrences, 8000);
        assert_eq!(report.get("hot").unwrap().types.len(), TAGS.len());
        assert_eq!(report.get("cold.3").unwrap().occurrences, 1000);
    }
}
