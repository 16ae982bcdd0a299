//! Slurmline Core
//!
//! Core types shared by the submitting host and the compute node.
//!
//! This crate contains:
//! - Domain types: Work Unit, work items, scheduler job state, provenance records
//! - Naming: filesystem-safe names for scratch directories and job names

pub mod domain;
pub mod naming;
