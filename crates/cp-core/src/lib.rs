//! Consistency probe core.
//!
//! Writes a record, then polls the datastore until the write is observable,
//! recording how many attempts and how many milliseconds that took.
//!
//! - [`store`]: the datastore collaborator trait and an in-memory,
//!   eventually-consistent implementation
//! - [`probe`]: the write-then-poll runner and its logging capability
//! - [`inspect`]: entity counts and kind statistics
//! - [`report`]: html / md / json / summary renderings
//! - [`server`]: HTTP routes over the same operations
//! - [`logging`]: tracing setup, correlation context, event names
//! - [`exit_codes`]: stable process exit codes

pub mod exit_codes;
pub mod inspect;
pub mod logging;
pub mod probe;
pub mod report;
pub mod server;
pub mod store;

pub use exit_codes::ExitCode;
pub use probe::{ProbeError, ProbeOptions, ProbeResult, ProbeRunner};
pub use store::{Datastore, Entity, Key, MemoryStore, Query, StoreError};
