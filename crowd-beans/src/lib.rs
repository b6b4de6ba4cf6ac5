//! Long-format crowd labelling data: which worker gave which label to
//! which task.
//!
//! * `observations` - interned `(task, worker, label)` table with
//!   task/worker adjacency lists
//! * `io` - delimited text (optionally gzipped) readers and writers
//! * `simulate` - synthetic answers sampled from the GLAD model

pub mod io;
pub mod observations;
pub mod simulate;

pub use observations::{CrowdLabels, NameIndex, Observation};
