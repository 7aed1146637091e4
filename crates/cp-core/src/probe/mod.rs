//! Write-then-poll consistency probe.
//!
//! Each trial upserts a fresh record and then reads it back with the run's
//! [`ReadStrategy`] until exactly one record with the expected value comes
//! back, sleeping a fixed delay between attempts. The attempt count and the
//! milliseconds since the write land in two [`Summary`] accumulators.
//!
//! Outcomes per trial:
//! - visible: sample recorded
//! - exhausted (attempts exceed the ceiling): sample recorded anyway, logged
//! - write failed: logged, no sample, run continues
//!
//! Ancestor creation failures, read errors other than "not found", and
//! unbuildable queries abort the whole run.

pub mod log;

pub use log::{ProbeEvent, ProbeLog, RecordingProbeLog, Severity, TracingProbeLog};

use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use cp_common::record::fields;
use cp_common::{ProbeRecord, ReadStrategy, RunPrefix};
use cp_config::ProbeConfig;
use cp_math::Summary;
use thiserror::Error;

use crate::store::{Datastore, Entity, Key, Query, StoreError};

/// Fatal probe errors. Any of these ends the run without a result.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to create ancestor {name}: {source}")]
    AncestorCreate {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("read failed on trial {trial}, attempt {attempt}: {source}")]
    Read {
        trial: u32,
        attempt: u32,
        #[source]
        source: StoreError,
    },

    #[error("cannot build query for trial {trial}: {source}")]
    Query {
        trial: u32,
        #[source]
        source: StoreError,
    },
}

impl From<ProbeError> for cp_common::Error {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::AncestorCreate { .. } => cp_common::Error::AncestorCreate(err.to_string()),
            ProbeError::Read { .. } => cp_common::Error::ProbeRead(err.to_string()),
            ProbeError::Query { .. } => cp_common::Error::InvalidQuery(err.to_string()),
        }
    }
}

/// Parameters of one probe run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOptions {
    pub strategy: ReadStrategy,
    pub kind: String,
    pub trial_count: u32,
    pub attempt_delay: Duration,
    pub max_attempts: u32,
}

impl ProbeOptions {
    /// Options for `strategy` with the configured kind, counts, and delay.
    pub fn from_config(config: &ProbeConfig, strategy: ReadStrategy) -> Self {
        ProbeOptions {
            strategy,
            kind: config.kind.clone(),
            trial_count: config.trial_count,
            attempt_delay: Duration::from_millis(config.attempt_delay_ms),
            max_attempts: config.max_attempts,
        }
    }

    /// Upper bound on run time when nothing is ever visible.
    pub fn worst_case_duration(&self) -> Duration {
        self.attempt_delay
            .saturating_mul(self.max_attempts.saturating_add(1))
            .saturating_mul(self.trial_count)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub run_prefix: RunPrefix,
    pub strategy: ReadStrategy,
    /// Attempts until visible (or the ceiling), one sample per recorded trial.
    pub retry: Summary,
    /// Milliseconds from write to successful read (or to the ceiling).
    pub latency_ms: Summary,
    /// Trials that contributed a sample, exhausted ones included.
    pub recorded: u32,
    pub exhausted: u32,
    /// Trials whose write failed.
    pub skipped: u32,
    /// Parent key of every trial record, for ancestor-scoped runs.
    pub ancestor: Option<Key>,
}

/// How a trial's record is read back.
enum ReadPlan {
    Lookup(Key),
    Query(Query),
}

/// What one read attempt saw.
enum Observation {
    Visible,
    Unexpected(String),
}

/// Drives probe runs against a datastore.
pub struct ProbeRunner<'a, S: Datastore + ?Sized, L: ProbeLog + ?Sized> {
    store: &'a S,
    log: &'a L,
    options: ProbeOptions,
}

impl<'a, S: Datastore + ?Sized, L: ProbeLog + ?Sized> ProbeRunner<'a, S, L> {
    pub fn new(store: &'a S, log: &'a L, options: ProbeOptions) -> Self {
        ProbeRunner {
            store,
            log,
            options,
        }
    }

    pub fn options(&self) -> &ProbeOptions {
        &self.options
    }

    /// Run every trial under `prefix`.
    pub fn run(&self, prefix: RunPrefix) -> Result<ProbeResult, ProbeError> {
        let opts = &self.options;
        self.log.info(&ProbeEvent::RunStarted {
            strategy: opts.strategy,
            trials: opts.trial_count,
            max_attempts: opts.max_attempts,
        });

        let ancestor = if opts.strategy.needs_ancestor() {
            Some(self.create_ancestor(&prefix)?)
        } else {
            None
        };

        let mut result = ProbeResult {
            run_prefix: prefix,
            strategy: opts.strategy,
            retry: Summary::new(),
            latency_ms: Summary::new(),
            recorded: 0,
            exhausted: 0,
            skipped: 0,
            ancestor,
        };

        for trial in 0..opts.trial_count {
            if let Err(err) = self.run_trial(trial, &mut result) {
                self.log.error(&ProbeEvent::RunAborted {
                    error: err.to_string(),
                });
                return Err(err);
            }
        }

        self.log.info(&ProbeEvent::RunFinished {
            recorded: result.recorded,
            exhausted: result.exhausted,
            skipped: result.skipped,
        });
        Ok(result)
    }

    fn create_ancestor(&self, prefix: &RunPrefix) -> Result<Key, ProbeError> {
        let record = ProbeRecord::ancestor(prefix, Utc::now());
        let key = self.store.key_of(&self.options.kind, &record.name, None);
        match self.store.put(Entity::from_record(key, &record)) {
            Ok(key) => {
                self.log.info(&ProbeEvent::AncestorCreated {
                    key: key.to_string(),
                });
                Ok(key)
            }
            Err(source) => {
                self.log.error(&ProbeEvent::AncestorFailed {
                    error: source.to_string(),
                });
                Err(ProbeError::AncestorCreate {
                    name: record.name,
                    source,
                })
            }
        }
    }

    fn run_trial(&self, trial: u32, result: &mut ProbeResult) -> Result<(), ProbeError> {
        let opts = &self.options;
        let record = ProbeRecord::for_trial(&result.run_prefix, trial, Utc::now());
        let key = self
            .store
            .key_of(&opts.kind, &record.name, result.ancestor.as_ref());

        let written = match self.store.put(Entity::from_record(key, &record)) {
            Ok(written) => written,
            Err(err) => {
                self.log.error(&ProbeEvent::WriteFailed {
                    trial,
                    error: err.to_string(),
                });
                result.skipped += 1;
                return Ok(());
            }
        };
        let last_write = Instant::now();

        let plan = self.read_plan(trial, &record, written, result.ancestor.as_ref())?;

        // Read number `max_attempts + 1` is the last one.
        let final_attempt = opts.max_attempts.saturating_add(1);
        let mut attempts: u32 = 0;
        let mut logged = false;
        loop {
            attempts += 1;
            match self.observe(trial, attempts, &plan, &record.value)? {
                Observation::Visible => {
                    let elapsed_ms = elapsed_ms(last_write);
                    result.retry.add(f64::from(attempts));
                    result.latency_ms.add(elapsed_ms);
                    result.recorded += 1;
                    self.log.info(&ProbeEvent::TrialRecorded {
                        trial,
                        attempts,
                        elapsed_ms,
                    });
                    return Ok(());
                }
                Observation::Unexpected(observed) => {
                    if !logged {
                        self.log.info(&ProbeEvent::UnexpectedRead {
                            trial,
                            attempt: attempts,
                            observed,
                        });
                        logged = true;
                    }
                }
            }

            if !opts.attempt_delay.is_zero() {
                thread::sleep(opts.attempt_delay);
            }

            if attempts >= final_attempt {
                let elapsed_ms = elapsed_ms(last_write);
                result.retry.add(f64::from(attempts));
                result.latency_ms.add(elapsed_ms);
                result.recorded += 1;
                result.exhausted += 1;
                self.log.error(&ProbeEvent::TrialExhausted {
                    trial,
                    attempts,
                    elapsed_ms,
                });
                return Ok(());
            }
        }
    }

    fn read_plan(
        &self,
        trial: u32,
        record: &ProbeRecord,
        written: Key,
        ancestor: Option<&Key>,
    ) -> Result<ReadPlan, ProbeError> {
        let by_name = || Query::new(self.options.kind.as_str()).filter_eq(fields::NAME, record.name.as_str());
        let query = match self.options.strategy {
            ReadStrategy::LookupByKey => return Ok(ReadPlan::Lookup(written)),
            ReadStrategy::IndexedQuery => by_name(),
            ReadStrategy::ProjectionQuery => by_name().project(&[fields::VALUE, fields::UPDATED_AT]),
            ReadStrategy::AncestorQuery => match ancestor {
                Some(ancestor) => by_name().ancestor(ancestor),
                None => {
                    return Err(ProbeError::Query {
                        trial,
                        source: StoreError::InvalidKey("ancestor key missing".to_string()),
                    })
                }
            },
        };
        query
            .validate()
            .map_err(|source| ProbeError::Query { trial, source })?;
        Ok(ReadPlan::Query(query))
    }

    fn observe(
        &self,
        trial: u32,
        attempt: u32,
        plan: &ReadPlan,
        expected: &str,
    ) -> Result<Observation, ProbeError> {
        let found = match plan {
            ReadPlan::Lookup(key) => match self.store.get(key) {
                Ok(entity) => vec![entity],
                Err(err) if err.is_not_found() => Vec::new(),
                Err(source) => {
                    return Err(ProbeError::Read {
                        trial,
                        attempt,
                        source,
                    })
                }
            },
            ReadPlan::Query(query) => self.store.run_query(query).map_err(|source| match source {
                StoreError::InvalidQuery(_) => ProbeError::Query { trial, source },
                source => ProbeError::Read {
                    trial,
                    attempt,
                    source,
                },
            })?,
        };

        Ok(match found.as_slice() {
            [entity] => match entity.get_str(fields::VALUE) {
                Some(value) if value == expected => Observation::Visible,
                Some(value) => Observation::Unexpected(format!("value mismatch: got {:?}", value)),
                None => Observation::Unexpected("record has no value".to_string()),
            },
            [] => Observation::Unexpected("no record".to_string()),
            many => Observation::Unexpected(format!("{} records", many.len())),
        })
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
