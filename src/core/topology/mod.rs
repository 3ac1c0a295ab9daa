// src/core/topology/mod.rs

//! Group topology beyond the flat case: aggregate fan-out (validated
//! membership + a cached stats view) and single-level child groups
//! (system-generated inbound key, parent-derived outbound credential, and
//! propagation of parent rename/proxy-key rotation).

pub mod aggregate;
pub mod child;

pub use aggregate::{validate_and_build_sub_groups, AggregateStatsCache, SubGroupSpec, MAX_SUB_GROUP_WEIGHT};
pub use child::ChildGroupService;
