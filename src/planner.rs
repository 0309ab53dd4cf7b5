//! The planner decides how many butterflies each thread of the single workgroup
//! executes, so that the whole network fits in what the device can launch.
//!
//! Planning is a pure computation over a [`WorkgroupProbe`]: the probe is asked
//! for the maximum workgroup size of a kernel specialized for a candidate
//! multiplicity, and is expected to release whatever it compiled to answer.
//! Once a plan is accepted, the caller compiles the final kernel exactly once.
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::params::{InputSize, KernelParameters};

/// Something that can tell the maximum workgroup size of a specialized kernel.
pub trait WorkgroupProbe {
    fn max_workgroup_size(&mut self, params: &KernelParameters) -> Result<usize>;
}

impl<F> WorkgroupProbe for F
where
    F: FnMut(&KernelParameters) -> Result<usize>,
{
    fn max_workgroup_size(&mut self, params: &KernelParameters) -> Result<usize> {
        self(params)
    }
}

/// Accepted launch configuration for one input size.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DispatchPlan {
    pub params: KernelParameters,
    /// Limit reported for the accepted kernel.
    pub max_workgroup_size: usize,
    /// Number of kernels that had to be specialized to get here.
    pub attempts: usize,
}

impl DispatchPlan {
    /// Threads in the (single) workgroup.
    #[inline]
    pub fn workgroup_size(&self) -> usize {
        self.params.threads()
    }
}

/// States of the planner.
///
/// `Accepted` is terminal; every other state moves forward on [`PlanState::step`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PlanState {
    Compiling {
        butterflies_per_thread: usize,
        attempts: usize,
    },
    QueryingLimits {
        params: KernelParameters,
        attempts: usize,
    },
    Fitting {
        params: KernelParameters,
        max_workgroup_size: usize,
        attempts: usize,
    },
    Accepted(DispatchPlan),
}

impl PlanState {
    pub fn initial() -> Self {
        PlanState::Compiling {
            butterflies_per_thread: 1,
            attempts: 0,
        }
    }

    pub fn step<P: WorkgroupProbe>(self, size: InputSize, probe: &mut P) -> Result<Self> {
        match self {
            PlanState::Compiling {
                butterflies_per_thread,
                attempts,
            } => Ok(PlanState::QueryingLimits {
                params: KernelParameters::new(size, butterflies_per_thread),
                attempts: attempts + 1,
            }),
            PlanState::QueryingLimits { params, attempts } => {
                let max_workgroup_size = probe.max_workgroup_size(&params)?;
                debug!(
                    max_workgroup_size,
                    butterflies_per_thread = params.butterflies_per_thread,
                    "queried workgroup limit"
                );
                Ok(PlanState::Fitting {
                    params,
                    max_workgroup_size,
                    attempts,
                })
            }
            PlanState::Fitting {
                params,
                max_workgroup_size,
                attempts,
            } => {
                let ngb = params.n_global_butterflies;
                let m = params.butterflies_per_thread;
                if ngb <= m.saturating_mul(max_workgroup_size) {
                    return Ok(PlanState::Accepted(DispatchPlan {
                        params,
                        max_workgroup_size,
                        attempts,
                    }));
                }
                match next_multiplicity(ngb, m, max_workgroup_size) {
                    Some(next) => Ok(PlanState::Compiling {
                        butterflies_per_thread: next,
                        attempts,
                    }),
                    None => Err(Error::Planning(format!(
                        "{ngb} butterflies do not fit a workgroup of {max_workgroup_size} \
                         threads with {m} butterflies per thread"
                    ))),
                }
            }
            PlanState::Accepted(_) => Ok(self),
        }
    }
}

/// Next multiplicity to try after `current` did not fit.
///
/// The guess assumes the limit won't grow when threads get more work, so
/// `ngb / max_workgroup_size` is the smallest multiplicity that can fit. It is
/// rounded up to a power of two so that it divides `ngb`, and doubled when it
/// would not make progress. Returns `None` once no larger multiplicity exists.
pub fn next_multiplicity(ngb: usize, current: usize, max_workgroup_size: usize) -> Option<usize> {
    if max_workgroup_size == 0 || current >= ngb {
        return None;
    }
    let guess = (ngb / max_workgroup_size).max(1).next_power_of_two();
    let next = if guess > current { guess } else { current * 2 };
    Some(next.min(ngb))
}

/// Runs the planner to completion.
pub fn plan_dispatch<P: WorkgroupProbe>(size: InputSize, probe: &mut P) -> Result<DispatchPlan> {
    let mut state = PlanState::initial();
    loop {
        state = state.step(size, probe)?;
        if let PlanState::Accepted(plan) = state {
            info!(
                size = size.get(),
                workgroup_size = plan.workgroup_size(),
                butterflies_per_thread = plan.params.butterflies_per_thread,
                max_workgroup_size = plan.max_workgroup_size,
                attempts = plan.attempts,
                "accepted dispatch plan"
            );
            return Ok(plan);
        }
    }
}
