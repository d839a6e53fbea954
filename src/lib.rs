//! Hierarchical Reliability Allocation
//!
//! Apportions a system-level reliability or failure-rate goal down a
//! hardware breakdown structure, so each subordinate assembly and component
//! receives an individually achievable numeric goal. Worksheets are plain
//! YAML records stored in a directory.

pub mod domain;
pub use domain::{
    AllocationConfig, AllocationEngine, AllocationNode, AllocationReport, AllocationTree,
    ApportionError, EngineError, GoalError, GoalMeasure, HardwareId, Method, Outcome, TreeError,
};

/// Filesystem storage for allocation worksheets.
pub mod storage;
pub use storage::{Worksheet, WorksheetError};
