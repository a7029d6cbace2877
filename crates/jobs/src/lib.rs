//! Job postings domain module.
//!
//! Business rules for job postings: submission validation, the publish status
//! lifecycle, and the public visibility gate. Pure domain logic (no IO).

pub mod job;

pub use job::{Job, JobStatus, NewJob, MAX_TITLE_LEN};
