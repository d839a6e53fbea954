//! Orchestration of goal conversion, apportionment, and trickle-down.

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use thiserror::Error;
use tracing::instrument;

use crate::domain::{
    apportionment::{self, ApportionError, Computation, Context},
    config::AllocationConfig,
    goal::{self, GoalError},
    node::{GoalMeasure, HardwareId, Method},
    tree::{AllocationTree, TreeError},
};

/// Errors raised by engine operations that combine tree lookups with goal
/// arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EngineError {
    /// The operation referenced a hardware item outside the tree.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Goal conversion failed for the targeted node.
    #[error(transparent)]
    Goal(#[from] GoalError),
}

/// What happened to one child during an apportionment batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// The allocation triple was computed and written.
    Allocated,

    /// The parent's method maps to no strategy; the child was left alone.
    /// Distinct from success so callers can surface unallocated children.
    Skipped,

    /// The computation failed; the child's prior values are unchanged.
    Failed(ApportionError),
}

impl Outcome {
    /// Whether the child received an allocation.
    #[must_use]
    pub const fn is_allocated(&self) -> bool {
        matches!(self, Self::Allocated)
    }
}

/// Per-child outcomes of one `allocate` call.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationReport {
    parent: HardwareId,
    method: Method,
    entries: Vec<(HardwareId, Outcome)>,
}

impl AllocationReport {
    /// The parent whose goal was apportioned.
    #[must_use]
    pub const fn parent(&self) -> HardwareId {
        self.parent
    }

    /// The method the parent applied.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Iterates over the per-child outcomes, ordered by child id.
    pub fn iter(&self) -> impl Iterator<Item = &(HardwareId, Outcome)> + '_ {
        self.entries.iter()
    }

    /// Number of children in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no children participated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of children that received an allocation.
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, outcome)| outcome.is_allocated())
            .count()
    }

    /// The children whose computation failed, with the failure.
    pub fn failures(&self) -> impl Iterator<Item = (HardwareId, ApportionError)> + '_ {
        self.entries.iter().filter_map(|(id, outcome)| match outcome {
            Outcome::Failed(err) => Some((*id, *err)),
            _ => None,
        })
    }

    /// Whether any child failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

/// Drives allocation over one [`AllocationTree`].
///
/// The engine is pure, synchronous computation over the in-memory tree; it
/// performs no I/O, keeps no state of its own, and never logs. Within one
/// batch the per-child candidates are computed in parallel over an immutable
/// snapshot (no formula reads a sibling's output) and committed one node at
/// a time, so a failing child never leaves partial numeric writes.
#[derive(Debug)]
pub struct AllocationEngine<'a> {
    tree: &'a mut AllocationTree,
    config: &'a AllocationConfig,
}

impl<'a> AllocationEngine<'a> {
    /// Creates an engine over the given tree and configuration.
    pub const fn new(tree: &'a mut AllocationTree, config: &'a AllocationConfig) -> Self {
        Self { tree, config }
    }

    /// Derives the two non-authoritative goal fields of one node from its
    /// authoritative goal.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Tree`] when the node is missing and
    /// [`EngineError::Goal`] when the conversion itself fails (in which case
    /// the node's goals are untouched).
    pub fn calculate_goals(&mut self, id: HardwareId) -> Result<(), EngineError> {
        let node = self
            .tree
            .get_mut(id)
            .ok_or(TreeError::NodeNotFound(id))?;
        goal::calculate_goals(node, self.config)?;
        Ok(())
    }

    /// Apportions the parent's goal over its participating children.
    ///
    /// Children excluded from allocation are not visited. A parent whose
    /// method is [`Method::None`] produces a report in which every child is
    /// [`Outcome::Skipped`]. Zero participating children yield an empty
    /// report and mutate nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NodeNotFound`] when the parent is missing.
    /// Per-child computation failures are reported in the
    /// [`AllocationReport`], never as an `Err`.
    #[instrument(skip(self))]
    pub fn allocate(&mut self, parent_id: HardwareId) -> Result<AllocationReport, TreeError> {
        let parent = self
            .tree
            .get(parent_id)
            .ok_or(TreeError::NodeNotFound(parent_id))?;
        let method = parent.method;
        let parent_reliability_goal = parent.reliability_goal;
        let parent_hazard_rate_goal = parent.hazard_rate_goal;

        let computed: Vec<(HardwareId, Option<Computation>)> = {
            let children = self.tree.participating_children(parent_id);
            if children.is_empty() {
                return Ok(AllocationReport {
                    parent: parent_id,
                    method,
                    entries: Vec::new(),
                });
            }

            let ctx = Context {
                n_children: children.len(),
                parent_reliability_goal,
                parent_hazard_rate_goal,
                system_hazard_rate: children.iter().map(|child| child.hazard_rate).sum(),
                cumulative_weight: children.iter().map(|child| child.weight_product()).sum(),
            };
            let config = self.config;

            children
                .par_iter()
                .map(|child| (child.id, apportionment::compute(method, child, &ctx, config)))
                .collect()
        };

        let mut entries = Vec::with_capacity(computed.len());
        for (id, computation) in computed {
            let outcome = match computation {
                None => Outcome::Skipped,
                Some(computation) => self.commit(id, computation),
            };
            entries.push((id, outcome));
        }

        Ok(AllocationReport {
            parent: parent_id,
            method,
            entries,
        })
    }

    /// Seeds each participating child's own goal from the value just
    /// allocated, enabling allocation at the next indenture level.
    ///
    /// The allocated reliability is copied into the child's reliability goal
    /// unchanged. A child whose method is [`Method::None`] inherits the
    /// parent's method. Children that have no allocation yet are left as
    /// they are; sequencing `allocate` before `trickle_down` is the
    /// caller's responsibility. Does not recurse into grandchildren.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NodeNotFound`] when the parent is missing.
    #[instrument(skip(self))]
    pub fn trickle_down(&mut self, parent_id: HardwareId) -> Result<(), TreeError> {
        let parent_method = self
            .tree
            .get(parent_id)
            .ok_or(TreeError::NodeNotFound(parent_id))?
            .method;

        let child_ids: Vec<HardwareId> = self.tree.children(parent_id).collect();
        for id in child_ids {
            let Some(child) = self.tree.get_mut(id) else {
                continue;
            };
            if !child.participates() {
                continue;
            }

            if let Some(reliability) = child.reliability_alloc {
                child.reliability_goal = reliability;
            }
            if child.method == Method::None {
                child.method = parent_method;
            }
        }
        Ok(())
    }

    /// Allocates the whole subtree under `root_id`, level by level.
    ///
    /// Each tier's parents are allocated and trickled down before the next
    /// tier runs, honouring the top-down data dependency. Trickled children
    /// are re-based on the reliability measure and their goals converted, so
    /// hazard-rate driven methods work at the next level too. Parents with
    /// no participating children are passed over. Levels finalized before an
    /// early exit remain valid.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NodeNotFound`] when the root is missing.
    #[instrument(skip(self))]
    pub fn cascade(&mut self, root_id: HardwareId) -> Result<Vec<AllocationReport>, TreeError> {
        if !self.tree.contains(root_id) {
            return Err(TreeError::NodeNotFound(root_id));
        }

        let mut reports = Vec::new();
        for level in self.tree.levels(root_id) {
            for parent_id in level {
                let report = self.allocate(parent_id)?;
                if report.is_empty() {
                    continue;
                }
                self.trickle_down(parent_id)?;
                self.rebase_children(&report);
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Converts the goals of freshly trickled children so every goal field
    /// is coherent before the next tier allocates.
    fn rebase_children(&mut self, report: &AllocationReport) {
        for (child_id, outcome) in report.iter() {
            if !outcome.is_allocated() {
                continue;
            }
            if let Some(child) = self.tree.get_mut(*child_id) {
                child.goal_measure = GoalMeasure::Reliability;
                // An allocated reliability lies strictly inside (0, 1), so
                // conversion only fails for a degenerate usage profile; the
                // stale goals then surface at the child's own allocation.
                let _ = goal::calculate_goals(child, self.config);
            }
        }
    }

    fn commit(&mut self, id: HardwareId, computation: Computation) -> Outcome {
        let child = self
            .tree
            .get_mut(id)
            .expect("participating child is in the tree");

        if let Some(weights) = computation.weights {
            child.weight_factor = weights.weight_factor;
            if let Some(percent) = weights.percent_wt_factor {
                child.percent_wt_factor = percent;
            }
        }

        match computation.allocated {
            Ok(allocated) => {
                child.reliability_alloc = Some(allocated.reliability);
                child.hazard_rate_alloc = Some(allocated.hazard_rate);
                child.mtbf_alloc = Some(allocated.mtbf);
                Outcome::Allocated
            }
            Err(err) => Outcome::Failed(err),
        }
    }
}
