//! Goal conversion under the constant-hazard-rate (exponential) model.
//!
//! Whichever goal metric was authoritatively entered is converted into the
//! other two via `R(t) = e^{-λt}`, `MTBF = 1/λ`.

use thiserror::Error;

use crate::domain::{
    config::AllocationConfig,
    node::{AllocationNode, GoalMeasure},
};

/// Errors converting between the three goal representations.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GoalError {
    /// A logarithm was taken of a non-positive argument, or a reliability
    /// value sat outside the open interval `(0, 1)`.
    #[error("reliability {0} has no usable logarithm; goals need 0 < R < 1")]
    MathDomain(f64),

    /// A hazard-rate or MTBF goal of zero has no finite reciprocal.
    #[error("division by zero while converting goals")]
    DivisionByZero,

    /// A reliability goal outside the open interval `(0, 1)` was supplied
    /// where a probability is required.
    #[error("reliability goal {0} is outside the open interval (0, 1)")]
    InvalidGoalRange(f64),
}

/// Derives the two non-authoritative goal fields from the authoritative one.
///
/// The write is all-or-nothing: on failure none of the three goal fields are
/// modified.
///
/// # Errors
///
/// - [`GoalError::MathDomain`] when the reliability goal is authoritative but
///   lies outside `(0, 1)` (the endpoints have no finite conversion).
/// - [`GoalError::DivisionByZero`] when the hazard-rate or MTBF goal is
///   authoritative but zero.
pub fn calculate_goals(
    node: &mut AllocationNode,
    config: &AllocationConfig,
) -> Result<(), GoalError> {
    let mission_time = node.effective_mission_time(config);
    if mission_time == 0.0 {
        return Err(GoalError::DivisionByZero);
    }

    match node.goal_measure {
        GoalMeasure::Reliability => {
            let reliability = node.reliability_goal;
            if !(reliability > 0.0 && reliability < 1.0) {
                return Err(GoalError::MathDomain(reliability));
            }
            let mtbf = -mission_time / reliability.ln();
            node.mtbf_goal = mtbf;
            node.hazard_rate_goal = mtbf.recip();
        }
        GoalMeasure::HazardRate => {
            if node.hazard_rate_goal == 0.0 {
                return Err(GoalError::DivisionByZero);
            }
            let mtbf = node.hazard_rate_goal.recip();
            node.mtbf_goal = mtbf;
            node.reliability_goal = (-mission_time / mtbf).exp();
        }
        GoalMeasure::Mtbf => {
            if node.mtbf_goal == 0.0 {
                return Err(GoalError::DivisionByZero);
            }
            node.hazard_rate_goal = node.mtbf_goal.recip();
            node.reliability_goal = (-mission_time / node.mtbf_goal).exp();
        }
    }

    Ok(())
}
