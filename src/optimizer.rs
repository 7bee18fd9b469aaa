//! Grid-density search: one engine run per candidate, first strictly best
//! `net_pnl` wins, and the caller's baseline is kept unless beaten.

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::config::GridParams;
use crate::engine::{PriceTick, RunResult, SimulationEngine, validate_series};
use crate::error::{Result, invalid};

pub const DEFAULT_CANDIDATE_GRID_LEVELS: [u32; 7] = [20, 30, 40, 50, 60, 70, 80];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CandidateScore {
    pub grid_levels: u32,
    pub net_pnl: f64,
    pub roi: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Optimization {
    pub grid_levels: u32,
    pub result: RunResult,
    pub baseline_kept: bool,
    /// One entry per candidate, in the caller's order.
    pub candidates: Vec<CandidateScore>,
}

/// `baseline` is the result of running `base_params` as given; its density is
/// `base_params.grid_levels`.
pub fn optimize(
    series: &[PriceTick],
    base_params: &GridParams,
    candidate_grid_levels: &[u32],
    baseline: &RunResult,
) -> Result<Optimization> {
    base_params.validate()?;
    validate_series(series)?;
    if let Some(pos) = candidate_grid_levels.iter().position(|&n| n == 0) {
        return Err(invalid(format!(
            "candidate grid levels must be >= 1 (index {pos})"
        )));
    }

    // collect() on an indexed parallel iterator keeps candidate order
    let runs: Vec<(u32, RunResult)> = candidate_grid_levels
        .par_iter()
        .map(|&levels| {
            let params = base_params.with_grid_levels(levels);
            SimulationEngine::run(series, &params).map(|r| (levels, r))
        })
        .collect::<Result<Vec<_>>>()?;

    let candidates: Vec<CandidateScore> = runs
        .iter()
        .map(|(levels, r)| {
            info!(grid_levels = levels, net_pnl = r.net_pnl, roi = r.roi, "candidate evaluated");
            CandidateScore {
                grid_levels: *levels,
                net_pnl: r.net_pnl,
                roi: r.roi,
            }
        })
        .collect();

    let mut best: Option<(u32, RunResult)> = None;
    for (levels, result) in runs {
        let better = best
            .as_ref()
            .map(|(_, b)| result.net_pnl > b.net_pnl)
            .unwrap_or(!result.net_pnl.is_nan());
        if better {
            best = Some((levels, result));
        }
    }

    match best {
        Some((levels, result)) if !(result.net_pnl < baseline.net_pnl) => {
            info!(
                grid_levels = levels,
                net_pnl = result.net_pnl,
                baseline_net_pnl = baseline.net_pnl,
                "optimizer selected candidate"
            );
            Ok(Optimization {
                grid_levels: levels,
                result,
                baseline_kept: false,
                candidates,
            })
        }
        _ => {
            info!(
                grid_levels = base_params.grid_levels,
                baseline_net_pnl = baseline.net_pnl,
                "no candidate beat the baseline, keeping it"
            );
            Ok(Optimization {
                grid_levels: base_params.grid_levels,
                result: baseline.clone(),
                baseline_kept: true,
                candidates,
            })
        }
    }
}

/// Runs `base_params` as the baseline, then searches `candidate_grid_levels`.
pub fn optimize_from_base(
    series: &[PriceTick],
    base_params: &GridParams,
    candidate_grid_levels: &[u32],
) -> Result<(RunResult, Optimization)> {
    let baseline = SimulationEngine::run(series, base_params)?;
    let optimization = optimize(series, base_params, candidate_grid_levels, &baseline)?;
    Ok((baseline, optimization))
}
