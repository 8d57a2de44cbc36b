//! vitalsync: an EMR backend over a hosted record store
//!
//! vitalsync serves patient, medical history and vitals records from a
//! hosted relational store, keeps a bounded day-indexed vitals history
//! through shift-on-insert rotation, and forwards clinical summaries to a
//! hosted language model for analysis.

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod records;
pub mod storage;
pub mod vitals;

pub use error::EmrError;
