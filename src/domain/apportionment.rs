//! The four apportionment strategies.
//!
//! Every strategy is a pure computation from one child plus parent-level
//! inputs to a candidate allocation. Nothing here writes into a node; the
//! engine commits a candidate only when the whole computation succeeded, so
//! a failing child keeps its prior values. No formula reads another
//! sibling's output, which makes the per-child results independent of
//! apportionment order.

use thiserror::Error;

use crate::domain::{
    config::AllocationConfig,
    node::{AllocationNode, Method},
};

/// Errors raised while apportioning a goal to a single child.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ApportionError {
    /// A logarithm was taken of a non-positive (or non-finite) argument.
    #[error("logarithm undefined for reliability {0}")]
    MathDomain(f64),

    /// A zero denominator: mission time, system hazard rate, sub-element
    /// count, or an allocated hazard rate of zero.
    #[error("division by zero while apportioning")]
    DivisionByZero,
}

/// Parent-level inputs shared by every child in one apportionment batch.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Context {
    /// Number of participating children.
    pub n_children: usize,
    /// The parent's reliability goal (equal and AGREE).
    pub parent_reliability_goal: f64,
    /// The parent's hazard-rate goal (ARINC and feasibility-of-objectives).
    pub parent_hazard_rate_goal: f64,
    /// Aggregate operating hazard rate of the participating children
    /// (ARINC).
    pub system_hazard_rate: f64,
    /// Sum of the children's risk-factor products
    /// (feasibility-of-objectives).
    pub cumulative_weight: f64,
}

/// A successfully computed allocation triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Allocated {
    pub reliability: f64,
    pub hazard_rate: f64,
    pub mtbf: f64,
}

/// Weighting factors derived on the way to an allocation.
///
/// These are pure functions of the inputs, so they are committed to the
/// child even when the allocation triple itself fails; this mirrors how the
/// weight columns behave in the worksheet when a downstream division blows
/// up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Weights {
    pub weight_factor: f64,
    pub percent_wt_factor: Option<f64>,
}

/// The full result of apportioning one child.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Computation {
    pub weights: Option<Weights>,
    pub allocated: Result<Allocated, ApportionError>,
}

/// Runs the strategy selected by `method` for a single child.
///
/// Returns `None` when the method maps to no strategy; the caller reports
/// the child as skipped.
pub(crate) fn compute(
    method: Method,
    child: &AllocationNode,
    ctx: &Context,
    config: &AllocationConfig,
) -> Option<Computation> {
    match method {
        Method::None => None,
        Method::Equal => Some(Computation {
            weights: None,
            allocated: equal(child, ctx, config),
        }),
        Method::Agree => Some(Computation {
            weights: None,
            allocated: agree(child, ctx, config),
        }),
        Method::Arinc => Some(arinc(child, ctx, config)),
        Method::Foo => Some(foo(child, ctx, config)),
    }
}

/// Equal apportionment: each of the `N` children receives the `N`-th root
/// of the parent's reliability goal.
#[allow(clippy::cast_precision_loss)]
fn equal(
    child: &AllocationNode,
    ctx: &Context,
    config: &AllocationConfig,
) -> Result<Allocated, ApportionError> {
    let share = ctx
        .parent_reliability_goal
        .powf((ctx.n_children as f64).recip());
    if !share.is_finite() || share <= 0.0 {
        return Err(ApportionError::MathDomain(share));
    }

    let mission_time = child.effective_mission_time(config);
    if mission_time == 0.0 {
        return Err(ApportionError::DivisionByZero);
    }

    let hazard_rate = -share.ln() / mission_time;
    if hazard_rate == 0.0 {
        return Err(ApportionError::DivisionByZero);
    }

    Ok(Allocated {
        reliability: share,
        hazard_rate,
        mtbf: hazard_rate.recip(),
    })
}

/// AGREE apportionment: weights by structural complexity and usage.
#[allow(clippy::cast_precision_loss)]
fn agree(
    child: &AllocationNode,
    ctx: &Context,
    config: &AllocationConfig,
) -> Result<Allocated, ApportionError> {
    let parent_goal = ctx.parent_reliability_goal;
    if !(parent_goal > 0.0 && parent_goal < 1.0) {
        return Err(ApportionError::MathDomain(parent_goal));
    }

    let mission_time = child.effective_mission_time(config);
    let operating_time = mission_time * child.effective_duty_cycle(config) / 100.0;

    let denominator = -f64::from(child.n_sub_elements) * parent_goal.ln();
    if denominator == 0.0 {
        return Err(ApportionError::DivisionByZero);
    }

    let mtbf = (ctx.n_children as f64 * child.weight_factor * operating_time) / denominator;
    if mtbf == 0.0 {
        return Err(ApportionError::DivisionByZero);
    }

    let hazard_rate = mtbf.recip();
    Ok(Allocated {
        reliability: (-hazard_rate * mission_time).exp(),
        hazard_rate,
        mtbf,
    })
}

/// ARINC apportionment: weights each child by its share of the aggregate
/// operating hazard rate.
fn arinc(child: &AllocationNode, ctx: &Context, config: &AllocationConfig) -> Computation {
    if ctx.system_hazard_rate == 0.0 {
        return Computation {
            weights: None,
            allocated: Err(ApportionError::DivisionByZero),
        };
    }

    let weight_factor = child.hazard_rate / ctx.system_hazard_rate;
    let hazard_rate = weight_factor * ctx.parent_hazard_rate_goal;

    Computation {
        weights: Some(Weights {
            weight_factor,
            percent_wt_factor: None,
        }),
        allocated: finish_from_hazard_rate(hazard_rate, child.effective_mission_time(config)),
    }
}

/// Feasibility-of-objectives apportionment: weights by the product of the
/// four qualitative risk factors.
fn foo(child: &AllocationNode, ctx: &Context, config: &AllocationConfig) -> Computation {
    let weight_factor = child.weight_product();
    // A cumulative weight of zero zeroes every percentage instead of failing.
    let percent_wt_factor = if ctx.cumulative_weight == 0.0 {
        0.0
    } else {
        weight_factor / ctx.cumulative_weight
    };

    let hazard_rate = percent_wt_factor * ctx.parent_hazard_rate_goal;

    Computation {
        weights: Some(Weights {
            weight_factor,
            percent_wt_factor: Some(percent_wt_factor),
        }),
        allocated: finish_from_hazard_rate(hazard_rate, child.effective_mission_time(config)),
    }
}

fn finish_from_hazard_rate(
    hazard_rate: f64,
    mission_time: f64,
) -> Result<Allocated, ApportionError> {
    if hazard_rate == 0.0 {
        return Err(ApportionError::DivisionByZero);
    }
    Ok(Allocated {
        reliability: (-hazard_rate * mission_time).exp(),
        hazard_rate,
        mtbf: hazard_rate.recip(),
    })
}
