//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of a cache.
//!
//! # Tasks
//! - Age Sweeper: Trims entries past the age limit once per limit interval

mod sweeper;

pub(crate) use sweeper::spawn_age_sweeper;
