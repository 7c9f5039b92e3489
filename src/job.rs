//! Map/reduce drivers for a variety run.
//!
//! The map step turns one document into `(path, profile)` pairs, each profile seeded from a
//! single classified value. The reduce step merges profiles sharing a path. Because the merge
//! is associative and commutative, the drivers are free to split the input however they like:
//! [`VarietyJob::run`] folds sequentially, [`VarietyJob::run_parallel`] fans documents out over
//! the rayon pool, and [`VarietyJob::run_batches`] reduces each batch on its own before folding
//! the partial reports together.
//!
//! ```
//! # use schema_variety::{doc, JobOptions, TypeTag, VarietyJob};
//! # fn main() -> schema_variety::Result<()> {
//! let docs = vec![
//!     doc!({ "_id": 1, "name": "a" }).into_map().unwrap(),
//!     doc!({ "_id": 2, "name": 2 }).into_map().unwrap(),
//! ];
//! let out = VarietyJob::new(JobOptions::default()).run(&docs)?;
//! let name = out.report.get("name").unwrap();
//! assert!(name.types.contains(&TypeTag::String));
//! assert!(name.types.contains(&TypeTag::Number));
//! assert_eq!(out.stats.emitted, 4);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::{
    classify, Document, Flattener, JobOptions, PresenceReport, Report, SharedReport, TypeProfile,
};

/// Map one document to a seeded profile per flattened path.
///
/// Siblings are not deduplicated here; that is the reduce step's job. Fails on the first value
/// that can't be classified.
pub fn map_document(doc: &Document, flattener: &Flattener) -> Result<Vec<(String, TypeProfile)>> {
    flattener
        .flatten(doc)
        .into_iter()
        .map(|(path, value)| match classify(value) {
            Ok(tag) => Ok((path, TypeProfile::seed(tag))),
            Err(e) => {
                debug!(path = %path, "value at path can't be classified");
                Err(e)
            }
        })
        .collect()
}

/// Reduce the profiles emitted for a single path.
pub fn reduce<I>(values: I) -> TypeProfile
where
    I: IntoIterator<Item = TypeProfile>,
{
    TypeProfile::merge(values)
}

/// Map one document to the paths it holds, for the counting-only report.
pub fn map_presence(doc: &Document, flattener: &Flattener) -> Vec<String> {
    flattener.flatten(doc).into_keys().collect()
}

/// Counters gathered over a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Documents read.
    pub input: u64,
    /// `(path, value)` pairs emitted by the map step.
    pub emitted: u64,
    /// Distinct paths in the final report.
    pub output: u64,
    pub duration: Duration,
}

impl fmt::Display for JobStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} documents, {} emitted, {} paths in {:?}",
            self.input, self.emitted, self.output, self.duration
        )
    }
}

/// The report of a run, plus its counters.
#[derive(Clone, Debug, PartialEq)]
pub struct JobOutput<R> {
    pub report: R,
    pub stats: JobStats,
}

/// A configured variety run.
#[derive(Clone, Debug, Default)]
pub struct VarietyJob {
    options: JobOptions,
    flattener: Flattener,
}

impl VarietyJob {
    pub fn new(options: JobOptions) -> Self {
        let flattener = options.flattener();
        Self { options, flattener }
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    pub fn flattener(&self) -> &Flattener {
        &self.flattener
    }

    /// Map and reduce every document on the calling thread.
    pub fn run<'a, I>(&self, documents: I) -> Result<JobOutput<Report>>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let start = Instant::now();
        debug!(max_depth = self.flattener.depth(), "starting sequential run");
        let (report, input, emitted) = self.fold(documents).map_err(abort)?;
        Ok(self.finish(report, input, emitted, start))
    }

    /// Map and reduce documents across the rayon pool. Each worker keeps its own partial report;
    /// partials are merged pairwise at the end.
    pub fn run_parallel(&self, documents: &[Document]) -> Result<JobOutput<Report>> {
        let start = Instant::now();
        debug!(
            documents = documents.len(),
            max_depth = self.flattener.depth(),
            "starting parallel run"
        );
        let (report, emitted) = documents
            .par_iter()
            .try_fold(
                || (Report::new(), 0u64),
                |(mut report, emitted), doc| -> Result<(Report, u64)> {
                    let pairs = map_document(doc, &self.flattener)?;
                    let emitted = emitted + pairs.len() as u64;
                    for (path, profile) in pairs {
                        report.fold_in(path, profile);
                    }
                    Ok((report, emitted))
                },
            )
            .try_reduce(
                || (Report::new(), 0u64),
                |(mut a, a_emitted), (b, b_emitted)| {
                    a.merge(b);
                    Ok((a, a_emitted + b_emitted))
                },
            )
            .map_err(abort)?;
        Ok(self.finish(report, documents.len() as u64, emitted, start))
    }

    /// Reduce each batch independently, then fold the partial reports into one shared report.
    pub fn run_batches<B>(&self, batches: &[B]) -> Result<JobOutput<Report>>
    where
        B: AsRef<[Document]> + Sync,
    {
        let start = Instant::now();
        let shared = SharedReport::new();
        let counts = batches
            .par_iter()
            .enumerate()
            .map(|(index, batch)| -> Result<(u64, u64)> {
                let batch = batch.as_ref();
                debug!(batch = index, documents = batch.len(), "reducing batch");
                let (report, input, emitted) = self.fold(batch)?;
                shared.merge(report);
                Ok((input, emitted))
            })
            .try_reduce(|| (0, 0), |a, b| Ok((a.0 + b.0, a.1 + b.1)))
            .map_err(abort)?;
        Ok(self.finish(shared.into_report(), counts.0, counts.1, start))
    }

    /// Count how many documents hold each path.
    pub fn count_presence<'a, I>(&self, documents: I) -> JobOutput<PresenceReport>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let start = Instant::now();
        debug!(max_depth = self.flattener.depth(), "starting presence count");
        let mut report = PresenceReport::new();
        let mut input = 0u64;
        let mut emitted = 0u64;
        for doc in documents {
            input += 1;
            for path in map_presence(doc, &self.flattener) {
                emitted += 1;
                report.fold_in(path, 1);
            }
        }
        let output = report.len() as u64;
        self.finish_with(report, output, input, emitted, start)
    }

    /// Count how many documents hold each path, across the rayon pool.
    pub fn count_presence_parallel(&self, documents: &[Document]) -> JobOutput<PresenceReport> {
        let start = Instant::now();
        debug!(documents = documents.len(), "starting parallel presence count");
        let (report, emitted) = documents
            .par_iter()
            .fold(
                || (PresenceReport::new(), 0u64),
                |(mut report, emitted), doc| {
                    let paths = map_presence(doc, &self.flattener);
                    let emitted = emitted + paths.len() as u64;
                    for path in paths {
                        report.fold_in(path, 1);
                    }
                    (report, emitted)
                },
            )
            .reduce(
                || (PresenceReport::new(), 0u64),
                |(mut a, a_emitted), (b, b_emitted)| {
                    a.merge(b);
                    (a, a_emitted + b_emitted)
                },
            );
        let output = report.len() as u64;
        self.finish_with(report, output, documents.len() as u64, emitted, start)
    }

    fn fold<'a, I>(&self, documents: I) -> Result<(Report, u64, u64)>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut report = Report::new();
        let mut input = 0u64;
        let mut emitted = 0u64;
        for doc in documents {
            input += 1;
            for (path, profile) in map_document(doc, &self.flattener)? {
                emitted += 1;
                report.fold_in(path, profile);
            }
        }
        Ok((report, input, emitted))
    }

    fn finish(&self, report: Report, input: u64, emitted: u64, start: Instant) -> JobOutput<Report> {
        let output = report.len() as u64;
        self.finish_with(report, output, input, emitted, start)
    }

    fn finish_with<R>(
        &self,
        report: R,
        output: u64,
        input: u64,
        emitted: u64,
        start: Instant,
    ) -> JobOutput<R> {
        let stats = JobStats {
            input,
            emitted,
            output,
            duration: start.elapsed(),
        };
        info!(
            input = stats.input,
            emitted = stats.emitted,
            output = stats.output,
            duration_ms = stats.duration.as_millis() as u64,
            "variety run complete"
        );
        JobOutput { report, stats }
    }
}

fn abort(err: crate::Error) -> crate::Error {
    warn!(error = %err, "variety run aborted");
    err
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Error, TypeTag, Value};
    use rand::prelude::*;

    fn docs(values: Vec<Value>) -> Vec<Document> {
        values.into_iter().map(|v| v.into_map().unwrap()).collect()
    }

    fn sample() -> Vec<Document> {
        docs(vec![
            doc!({ "_id": 1, "name": "a" }),
            doc!({ "_id": 2, "name": 2 }),
            doc!({ "_id": 3, "age": 5 }),
        ])
    }

    fn check_sample(report: &Report) {
        assert_eq!(report.len(), 3);
        let id = report.get("_id").unwrap();
        assert_eq!(id.types.to_vec(), vec![TypeTag::Number]);
        assert_eq!(id.occurrences, 3);
        let name = report.get("name").unwrap();
        assert_eq!(name.types.to_vec(), vec![TypeTag::Number, TypeTag::String]);
        assert_eq!(name.occurrences, 2);
        let age = report.get("age").unwrap();
        assert_eq!(age.types.to_vec(), vec![TypeTag::Number]);
        assert_eq!(age.occurrences, 1);
    }

    #[test]
    fn end_to_end() {
        let job = VarietyJob::default();
        let out = job.run(&sample()).unwrap();
        check_sample(&out.report);
        assert_eq!(out.stats.input, 3);
        assert_eq!(out.stats.emitted, 6);
        assert_eq!(out.stats.output, 3);
    }

    #[test]
    fn drivers_agree() {
        let job = VarietyJob::default();
        let documents = sample();
        let seq = job.run(&documents).unwrap();
        let par = job.run_parallel(&documents).unwrap();
        let batched = job.run_batches(&[documents[..1].to_vec(), documents[1..].to_vec()]).unwrap();
        check_sample(&par.report);
        assert_eq!(seq.report, par.report);
        assert_eq!(seq.report, batched.report);
        assert_eq!(seq.stats.emitted, par.stats.emitted);
        assert_eq!(seq.stats.emitted, batched.stats.emitted);
        assert_eq!(batched.stats.input, 3);
    }

    #[test]
    fn random_batching_matches_sequential() {
        let mut rng = rand::thread_rng();
        let tags = [doc!(1), doc!("s"), doc!(null), doc!([1]), doc!({ "x": true })];
        let fields = ["a", "b", "c", "d"];
        let mut documents = Vec::new();
        for _ in 0..200 {
            let mut doc = Document::new();
            for field in fields.iter() {
                if rng.gen_bool(0.6) {
                    doc.insert(field.to_string(), tags.choose(&mut rng).unwrap().clone());
                }
            }
            documents.push(doc);
        }
        let job = VarietyJob::default();
        let expected = job.run(&documents).unwrap().report;
        for _ in 0..10 {
            documents.shuffle(&mut rng);
            let mut batches = Vec::new();
            let mut rest = &documents[..];
            while !rest.is_empty() {
                let take = rng.gen_range(1..=rest.len().min(40));
                batches.push(rest[..take].to_vec());
                rest = &rest[take..];
            }
            assert_eq!(job.run_batches(&batches).unwrap().report, expected);
            assert_eq!(job.run_parallel(&documents).unwrap().report, expected);
        }
    }

    #[test]
    fn map_emits_every_path() {
        let doc = doc!({ "a": { "b": 1 }, "c": "x" }).into_map().unwrap();
        let pairs = map_document(&doc, &Flattener::default()).unwrap();
        let paths: Vec<&str> = pairs.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["a", "a.b", "c"]);
        assert_eq!(pairs[0].1, TypeProfile::seed(TypeTag::Object));
        assert!(pairs.iter().all(|(_, p)| p.occurrences == 1));
    }

    #[test]
    fn reduce_merges_emitted_values() {
        let p = reduce(vec![
            TypeProfile::seed(TypeTag::String),
            TypeProfile::seed(TypeTag::String),
            TypeProfile::seed(TypeTag::Null),
        ]);
        assert_eq!(p.types.to_vec(), vec![TypeTag::String, TypeTag::Null]);
        assert_eq!(p.occurrences, 3);
    }

    #[test]
    fn undefined_aborts_every_driver() {
        let mut documents = sample();
        documents.push(doc!({ "gone": Value::Undefined }).into_map().unwrap());
        let job = VarietyJob::default();
        assert_eq!(job.run(&documents).unwrap_err(), Error::Undefined);
        assert_eq!(job.run_parallel(&documents).unwrap_err(), Error::Undefined);
        assert_eq!(job.run_batches(&[documents]).unwrap_err(), Error::Undefined);
    }

    #[test]
    fn options_reach_the_flattener() {
        let documents = docs(vec![doc!({ "_dds": { "x": 1 }, "a": { "b": { "c": 1 } } })]);
        let job = VarietyJob::new(JobOptions::new().with_max_depth(1).with_exclude_prefix("_dds"));
        let report = job.run(&documents).unwrap().report;
        let paths: Vec<&str> = report.paths().collect();
        assert_eq!(paths, vec!["a", "a.b"]);
    }

    #[test]
    fn presence_counts() {
        let job = VarietyJob::default();
        let documents = sample();
        let out = job.count_presence(&documents);
        assert_eq!(out.report.get("_id"), Some(3));
        assert_eq!(out.report.get("name"), Some(2));
        assert_eq!(out.report.get("age"), Some(1));
        assert_eq!(out.stats.output, 3);
        assert_eq!(out.stats.emitted, 6);
        assert_eq!(job.count_presence_parallel(&documents).report, out.report);
    }

    #[test]
    fn presence_ignores_undefined() {
        let doc = doc!({ "gone": Value::Undefined }).into_map().unwrap();
        assert_eq!(map_presence(&doc, &Flattener::default()), vec!["gone".to_string()]);
    }

    #[test]
    fn empty_input() {
        let job = VarietyJob::default();
        let out = job.run(&Vec::new()).unwrap();
        assert!(out.report.is_empty());
        assert_eq!(out.stats.input, 0);
        let out = job.run_batches::<Vec<Document>>(&[]).unwrap();
        assert!(out.report.is_empty());
    }
}
