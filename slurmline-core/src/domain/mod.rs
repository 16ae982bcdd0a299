//! Core domain types
//!
//! These types cross process boundaries: the coordinator writes them into a
//! scratch directory and the runner on the compute node reads them back, so
//! every type here is serde-serializable.

pub mod job;
pub mod provenance;
pub mod record;
pub mod work_item;
pub mod work_unit;
