//! Domain models for reliability allocation.
//!
//! This module contains the core types: the per-hardware-item allocation
//! record, the in-memory tree of records, goal conversion, the four
//! apportionment strategies, and the engine that orchestrates them.

/// Per-hardware-item allocation records and identifiers.
pub mod node;
pub use node::{AllocationNode, GoalMeasure, HardwareId, Method, ParseIdError};

mod config;
pub use config::AllocationConfig;

/// The in-memory tree of allocation records.
pub mod tree;
pub use tree::{AllocationTree, TreeError};

/// Goal conversion under the exponential reliability model.
pub mod goal;
pub use goal::{calculate_goals, GoalError};

/// The four apportionment strategies.
pub mod apportionment;
pub use apportionment::ApportionError;

/// Orchestration of allocation over a tree.
pub mod engine;
pub use engine::{AllocationEngine, AllocationReport, EngineError, Outcome};
