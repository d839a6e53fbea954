//! The on-disk YAML form of an allocation record.
//!
//! Kept separate from the domain type so the file format can default
//! missing fields and omit empty ones without the domain model caring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AllocationNode, GoalMeasure, HardwareId, Method};

/// Serialized form of one [`AllocationNode`].
///
/// The hardware id is not stored in the file; it comes from the record's
/// file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct NodeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<HardwareId>,

    #[serde(default = "default_included")]
    pub included: bool,

    #[serde(default)]
    pub method: Method,

    #[serde(default)]
    pub goal_measure: GoalMeasure,

    #[serde(default = "default_reliability_goal")]
    pub reliability_goal: f64,

    #[serde(default)]
    pub hazard_rate_goal: f64,

    #[serde(default)]
    pub mtbf_goal: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reliability_alloc: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hazard_rate_alloc: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtbf_alloc: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_alloc: Option<f64>,

    #[serde(default = "default_factor")]
    pub weight_factor: f64,

    #[serde(default = "default_factor")]
    pub percent_wt_factor: f64,

    #[serde(default = "default_count")]
    pub n_sub_systems: u32,

    #[serde(default = "default_count")]
    pub n_sub_elements: u32,

    #[serde(default = "default_count")]
    pub int_factor: u32,

    #[serde(default = "default_count")]
    pub soa_factor: u32,

    #[serde(default = "default_count")]
    pub op_time_factor: u32,

    #[serde(default = "default_count")]
    pub env_factor: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duty_cycle: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_time: Option<f64>,

    #[serde(default)]
    pub hazard_rate: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

const fn default_included() -> bool {
    true
}

const fn default_reliability_goal() -> f64 {
    1.0
}

const fn default_factor() -> f64 {
    1.0
}

const fn default_count() -> u32 {
    1
}

impl NodeRecord {
    /// Rehydrates the domain record, stamping a creation time if the file
    /// carried none.
    pub fn into_node(self, id: HardwareId) -> AllocationNode {
        AllocationNode {
            id,
            parent_id: self.parent_id,
            included: self.included,
            method: self.method,
            goal_measure: self.goal_measure,
            reliability_goal: self.reliability_goal,
            hazard_rate_goal: self.hazard_rate_goal,
            mtbf_goal: self.mtbf_goal,
            reliability_alloc: self.reliability_alloc,
            hazard_rate_alloc: self.hazard_rate_alloc,
            mtbf_alloc: self.mtbf_alloc,
            availability_alloc: self.availability_alloc,
            weight_factor: self.weight_factor,
            percent_wt_factor: self.percent_wt_factor,
            n_sub_systems: self.n_sub_systems,
            n_sub_elements: self.n_sub_elements,
            int_factor: self.int_factor,
            soa_factor: self.soa_factor,
            op_time_factor: self.op_time_factor,
            env_factor: self.env_factor,
            duty_cycle: self.duty_cycle,
            mission_time: self.mission_time,
            hazard_rate: self.hazard_rate,
            created: self.created.unwrap_or_else(Utc::now),
        }
    }
}

impl From<&AllocationNode> for NodeRecord {
    fn from(node: &AllocationNode) -> Self {
        Self {
            parent_id: node.parent_id,
            included: node.included,
            method: node.method,
            goal_measure: node.goal_measure,
            reliability_goal: node.reliability_goal,
            hazard_rate_goal: node.hazard_rate_goal,
            mtbf_goal: node.mtbf_goal,
            reliability_alloc: node.reliability_alloc,
            hazard_rate_alloc: node.hazard_rate_alloc,
            mtbf_alloc: node.mtbf_alloc,
            availability_alloc: node.availability_alloc,
            weight_factor: node.weight_factor,
            percent_wt_factor: node.percent_wt_factor,
            n_sub_systems: node.n_sub_systems,
            n_sub_elements: node.n_sub_elements,
            int_factor: node.int_factor,
            soa_factor: node.soa_factor,
            op_time_factor: node.op_time_factor,
            env_factor: node.env_factor,
            duty_cycle: node.duty_cycle,
            mission_time: node.mission_time,
            hazard_rate: node.hazard_rate,
            created: Some(node.created),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn an_empty_document_yields_defaults() {
        let record: NodeRecord = serde_yaml::from_str("{}").unwrap();

        assert!(record.included);
        assert_eq!(record.method, Method::None);
        assert_eq!(record.goal_measure, GoalMeasure::Reliability);
        assert!((record.reliability_goal - 1.0).abs() < f64::EPSILON);
        assert_eq!(record.n_sub_elements, 1);
        assert_eq!(record.mission_time, None);
        assert_eq!(record.reliability_alloc, None);
    }

    #[test]
    fn yaml_round_trip_preserves_the_node() {
        let mut node = AllocationNode::new(HardwareId::new(5));
        node.parent_id = Some(HardwareId::new(1));
        node.method = Method::Agree;
        node.goal_measure = GoalMeasure::HazardRate;
        node.hazard_rate_goal = 0.003;
        node.mission_time = Some(24.0);
        node.reliability_alloc = Some(0.97);

        let yaml = serde_yaml::to_string(&NodeRecord::from(&node)).unwrap();
        let reloaded: NodeRecord = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(reloaded.into_node(HardwareId::new(5)), node);
    }

    #[test]
    fn method_names_use_kebab_case() {
        let record: NodeRecord = serde_yaml::from_str("method: arinc").unwrap();
        assert_eq!(record.method, Method::Arinc);

        let record: NodeRecord = serde_yaml::from_str("goal_measure: hazard-rate").unwrap();
        assert_eq!(record.goal_measure, GoalMeasure::HazardRate);
    }

    #[test]
    fn an_unknown_method_fails_to_parse() {
        assert!(serde_yaml::from_str::<NodeRecord>("method: guesswork").is_err());
    }
}
