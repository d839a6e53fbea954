//! The per-hardware-item allocation record.

use std::{fmt, num::ParseIntError, str::FromStr};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{config::AllocationConfig, goal::GoalError};

/// Unique, stable identifier of a hardware item.
///
/// Wraps the numeric id assigned by the hardware breakdown structure. The
/// display form is `HW-<id>`, which is also the record file-name stem used by
/// the worksheet store.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct HardwareId(u32);

impl HardwareId {
    /// Wraps a raw numeric hardware id.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HW-{}", self.0)
    }
}

/// Errors parsing a [`HardwareId`] from text.
#[derive(Debug, Error)]
pub enum ParseIdError {
    /// The numeric portion was missing or not a valid integer.
    #[error("invalid hardware id: {0}")]
    InvalidNumber(#[from] ParseIntError),
}

impl FromStr for HardwareId {
    type Err = ParseIdError;

    /// Accepts either a bare number (`12`) or the display form (`HW-12`,
    /// case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .get(..3)
            .filter(|prefix| prefix.eq_ignore_ascii_case("HW-"))
            .map_or(s, |_| &s[3..]);
        Ok(Self(digits.parse()?))
    }
}

/// The apportionment method a parent applies to its children.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// No method configured; allocation is a per-child no-op.
    #[default]
    None,
    /// Every child receives an identical share of the parent's reliability
    /// goal.
    Equal,
    /// Weighting by unit complexity, duty cycle, and mission time.
    Agree,
    /// Weighting by each child's share of the aggregate operating hazard
    /// rate.
    Arinc,
    /// Feasibility of objectives: weighting by four qualitative risk
    /// factors.
    Foo,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Equal => "equal",
            Self::Agree => "agree",
            Self::Arinc => "arinc",
            Self::Foo => "foo",
        };
        f.write_str(name)
    }
}

/// Which of the three goal fields is the user-authoritative input.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum GoalMeasure {
    /// The reliability goal is authoritative.
    #[default]
    Reliability,
    /// The hazard-rate goal is authoritative.
    HazardRate,
    /// The MTBF goal is authoritative.
    Mtbf,
}

impl fmt::Display for GoalMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reliability => "reliability",
            Self::HazardRate => "hazard-rate",
            Self::Mtbf => "mtbf",
        };
        f.write_str(name)
    }
}

/// One hardware item participating in allocation.
///
/// The goal fields are mutually derivable; exactly one of them (selected by
/// [`goal_measure`](Self::goal_measure)) is user-authoritative at a time and
/// the other two are conversion outputs. The `*_alloc` fields are written
/// only by the allocation engine and stay `None` until it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationNode {
    /// Identifier of the hardware item this record belongs to.
    pub id: HardwareId,

    /// The parent hardware item, or `None` for a root of the breakdown
    /// structure.
    pub parent_id: Option<HardwareId>,

    /// Excluded nodes are skipped by apportionment but remain in the tree.
    pub included: bool,

    /// The apportionment method this node applies to its children.
    pub method: Method,

    /// Which goal field is the authoritative input.
    pub goal_measure: GoalMeasure,

    /// Reliability goal, meaningful only inside the open interval `(0, 1)`.
    pub reliability_goal: f64,

    /// Hazard-rate goal (failures per unit time).
    pub hazard_rate_goal: f64,

    /// Mean-time-between-failures goal.
    pub mtbf_goal: f64,

    /// Reliability allocated to this node by its parent.
    pub reliability_alloc: Option<f64>,

    /// Hazard rate allocated to this node by its parent.
    pub hazard_rate_alloc: Option<f64>,

    /// MTBF allocated to this node by its parent.
    pub mtbf_alloc: Option<f64>,

    /// Availability allocated to this node. Carried and persisted for the
    /// record schema; no apportionment method computes it.
    pub availability_alloc: Option<f64>,

    /// Structural weighting factor. An input to AGREE; an output of ARINC
    /// and feasibility-of-objectives.
    pub weight_factor: f64,

    /// This node's weight as a fraction of its siblings' cumulative weight
    /// (feasibility-of-objectives output).
    pub percent_wt_factor: f64,

    /// Number of subsystems comprising this item.
    pub n_sub_systems: u32,

    /// Number of sub-elements comprising this item (AGREE complexity
    /// weighting).
    pub n_sub_elements: u32,

    /// Intricacy risk factor (feasibility-of-objectives).
    pub int_factor: u32,

    /// State-of-the-art risk factor (feasibility-of-objectives).
    pub soa_factor: u32,

    /// Operating-time risk factor (feasibility-of-objectives).
    pub op_time_factor: u32,

    /// Environment risk factor (feasibility-of-objectives).
    pub env_factor: u32,

    /// Percentage of mission time this node is actually operating, or
    /// `None` to fall back to the configured default.
    pub duty_cycle: Option<f64>,

    /// Mission time over which the goals apply, or `None` to fall back to
    /// the configured default. An explicit zero is degenerate and surfaces
    /// as a division-by-zero during calculation.
    pub mission_time: Option<f64>,

    /// The node's own operating hazard rate, distinct from any goal.
    /// Read only by ARINC apportionment.
    pub hazard_rate: f64,

    /// When this hardware item entered the allocation scope.
    pub created: DateTime<Utc>,
}

impl AllocationNode {
    /// Creates a fresh record for a hardware item entering the allocation
    /// scope.
    ///
    /// Goal fields start at their degenerate defaults (reliability `1.0`,
    /// hazard rate and MTBF `0.0`) and are rejected by goal conversion until
    /// a real goal is entered. Allocated outputs start empty.
    #[must_use]
    pub fn new(id: HardwareId) -> Self {
        Self {
            id,
            parent_id: None,
            included: true,
            method: Method::None,
            goal_measure: GoalMeasure::Reliability,
            reliability_goal: 1.0,
            hazard_rate_goal: 0.0,
            mtbf_goal: 0.0,
            reliability_alloc: None,
            hazard_rate_alloc: None,
            mtbf_alloc: None,
            availability_alloc: None,
            weight_factor: 1.0,
            percent_wt_factor: 1.0,
            n_sub_systems: 1,
            n_sub_elements: 1,
            int_factor: 1,
            soa_factor: 1,
            op_time_factor: 1,
            env_factor: 1,
            duty_cycle: None,
            mission_time: None,
            hazard_rate: 0.0,
            created: Utc::now(),
        }
    }

    /// Sets the reliability goal, marking it authoritative.
    ///
    /// # Errors
    ///
    /// Returns [`GoalError::InvalidGoalRange`] unless the value lies strictly
    /// inside `(0, 1)`. The endpoints are degenerate: a goal of `1.0` has no
    /// finite MTBF and a goal of `0.0` has no logarithm.
    pub fn set_reliability_goal(&mut self, value: f64) -> Result<(), GoalError> {
        if value > 0.0 && value < 1.0 {
            self.reliability_goal = value;
            self.goal_measure = GoalMeasure::Reliability;
            Ok(())
        } else {
            Err(GoalError::InvalidGoalRange(value))
        }
    }

    /// Sets the hazard-rate goal, marking it authoritative.
    pub const fn set_hazard_rate_goal(&mut self, value: f64) {
        self.hazard_rate_goal = value;
        self.goal_measure = GoalMeasure::HazardRate;
    }

    /// Sets the MTBF goal, marking it authoritative.
    pub const fn set_mtbf_goal(&mut self, value: f64) {
        self.mtbf_goal = value;
        self.goal_measure = GoalMeasure::Mtbf;
    }

    /// Mission time used in calculations, falling back to the configured
    /// default when the record carries none.
    #[must_use]
    pub fn effective_mission_time(&self, config: &AllocationConfig) -> f64 {
        self.mission_time
            .unwrap_or_else(|| config.default_mission_time())
    }

    /// Duty cycle used in calculations, falling back to the configured
    /// default when the record carries none.
    #[must_use]
    pub fn effective_duty_cycle(&self, config: &AllocationConfig) -> f64 {
        self.duty_cycle
            .unwrap_or_else(|| config.default_duty_cycle())
    }

    /// Product of the four feasibility-of-objectives risk factors.
    #[must_use]
    pub fn weight_product(&self) -> f64 {
        f64::from(self.int_factor)
            * f64::from(self.soa_factor)
            * f64::from(self.op_time_factor)
            * f64::from(self.env_factor)
    }

    /// Whether this node takes part in apportionment.
    #[must_use]
    pub const fn participates(&self) -> bool {
        self.included
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_id_parses_bare_and_prefixed_forms() {
        assert_eq!("12".parse::<HardwareId>().unwrap(), HardwareId::new(12));
        assert_eq!("HW-12".parse::<HardwareId>().unwrap(), HardwareId::new(12));
        assert_eq!("hw-3".parse::<HardwareId>().unwrap(), HardwareId::new(3));
        assert!("HW-".parse::<HardwareId>().is_err());
        assert!("twelve".parse::<HardwareId>().is_err());
    }

    #[test]
    fn hardware_id_display_round_trips() {
        let id = HardwareId::new(42);
        assert_eq!(id.to_string(), "HW-42");
        assert_eq!(id.to_string().parse::<HardwareId>().unwrap(), id);
    }

    #[test]
    fn new_node_has_degenerate_goals_and_empty_allocations() {
        let node = AllocationNode::new(HardwareId::new(1));
        assert!(node.included);
        assert_eq!(node.method, Method::None);
        assert!((node.reliability_goal - 1.0).abs() < f64::EPSILON);
        assert_eq!(node.reliability_alloc, None);
        assert_eq!(node.hazard_rate_alloc, None);
        assert_eq!(node.mtbf_alloc, None);
    }

    #[test]
    fn set_reliability_goal_rejects_the_closed_endpoints() {
        let mut node = AllocationNode::new(HardwareId::new(1));

        for bad in [0.0, 1.0, -0.1, 1.5] {
            let err = node.set_reliability_goal(bad).unwrap_err();
            assert!(matches!(err, GoalError::InvalidGoalRange(_)));
        }

        node.set_reliability_goal(0.95).unwrap();
        assert!((node.reliability_goal - 0.95).abs() < f64::EPSILON);
        assert_eq!(node.goal_measure, GoalMeasure::Reliability);
    }

    #[test]
    fn weight_product_multiplies_the_four_risk_factors() {
        let mut node = AllocationNode::new(HardwareId::new(1));
        node.int_factor = 2;
        node.soa_factor = 3;
        node.op_time_factor = 4;
        node.env_factor = 5;
        assert!((node.weight_product() - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn effective_values_fall_back_to_config_defaults() {
        let config = AllocationConfig::default();
        let mut node = AllocationNode::new(HardwareId::new(1));

        assert!((node.effective_mission_time(&config) - 10.0).abs() < f64::EPSILON);
        assert!((node.effective_duty_cycle(&config) - 100.0).abs() < f64::EPSILON);

        node.mission_time = Some(25.0);
        node.duty_cycle = Some(50.0);
        assert!((node.effective_mission_time(&config) - 25.0).abs() < f64::EPSILON);
        assert!((node.effective_duty_cycle(&config) - 50.0).abs() < f64::EPSILON);

        // An explicit zero is honoured, not replaced.
        node.mission_time = Some(0.0);
        assert!(node.effective_mission_time(&config).abs() < f64::EPSILON);
    }
}
