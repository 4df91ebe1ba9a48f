//! # chron-core
//!
//! Core types, metadata resolution, and error types for Chronicle.
//!
//! This crate is pure: no I/O, no async. It provides:
//! - Scalar values and declared field types
//! - Entity mappings (the primary store's structural metadata)
//! - The metadata resolver deriving each tracked type's audit shape
//! - The immutable audit configuration shared by writer and reader
//! - Revisions, revision types, snapshots, and field diffs
//! - Cross-cutting error types

pub mod configuration;
pub mod entity;
pub mod errors;
pub mod mapping;
pub mod naming;
pub mod resolver;
pub mod revision;
pub mod snapshot;
pub mod tracked;
pub mod value;
