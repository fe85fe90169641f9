//! Batching driver.
//!
//! Walks the triangle array in batches of `config.batch`, seeding one
//! candidate per triangle and refining it through the resolution plan (see
//! [`crate::plan`]) before folding the batch's final candidate list into the
//! shared output grid (see [`crate::reduce`]). The driver allocates the
//! shared `dist` grid once, up front, and every batch writes into it with
//! atomics - concurrent batches would be semantically safe, though
//! [`rasterize`] itself runs them sequentially.
//!
//! [`AsyncRasterizer`] wraps the same computation behind
//! [`crate::threading::TaskExecutor`] for callers driving it from a frame
//! loop or task queue instead of blocking on [`rasterize`] directly.
//!
//! Each batch passes through three named phases, surfaced as `tracing`
//! spans (and, for `refine`, as the `phase` field on
//! [`crate::error::RasterizeError::CandidateOverflow`]/
//! [`crate::error::RasterizeError::AllocationFailed`] and on
//! [`RasterMetrics`]' overflow counter): `"seed"`, one `"refine:N"` span per
//! resolution level `N` the plan walks through, and `"reduce"`.

use std::sync::atomic::{AtomicBool, AtomicI32};

use crate::candidates::{refine, CandidateList};
use crate::config::{RasterizeConfig, Variant};
use crate::error::RasterizeError;
use crate::geometry::Triangle;
use crate::metrics::RasterMetrics;
use crate::plan::resolution_plan;
use crate::reduce::{new_dist_grid, reduce_collide_into, reduce_min_into, repidx_tiebreak_into, snapshot_dist, AuxGrid, RasterizeOutput};
use crate::threading::{TaskExecutor, TaskId};

/// Run one batch through the resolution plan, returning its final candidate
/// list at the target resolution. Records each level's post-refinement
/// candidate count into `metrics` - a no-op unless the `metrics` feature is
/// enabled and collection is toggled on (see [`crate::metrics::is_enabled`]).
fn refine_batch(
  triangles: &[Triangle],
  offset: u32,
  count: usize,
  plan: &[u32],
  band: f32,
  tile_size: usize,
  metrics: &mut RasterMetrics,
) -> Result<CandidateList, RasterizeError> {
  let mut candidates = {
    #[cfg(feature = "tracing")]
    let _span = tracing::debug_span!("seed", offset, count).entered();
    CandidateList::seed(offset, count)
  };
  let mut n = 1u32;

  for (level, &s) in plan.iter().enumerate() {
    let n_new = n * s;
    let phase = format!("refine:{n_new}");
    #[cfg(feature = "tracing")]
    let _span = tracing::debug_span!("refine", phase = %phase).entered();

    candidates = refine(triangles, &candidates, n, s, band, tile_size, &phase, metrics)?;
    n = n_new;

    #[cfg(feature = "tracing")]
    tracing::debug!(phase = %phase, candidates = candidates.len(), "refined candidate list");
    metrics.record_level_candidates(level, candidates.len() as u64);

    if candidates.is_empty() {
      break;
    }
  }
  Ok(candidates)
}

/// Rasterize `triangles` into a dense `R`x`R`x`R` distance and auxiliary
/// grid, per `config`. Triangles are processed in batches of `config.batch`,
/// each seeded, refined through the resolution plan, and reduced into the
/// shared output grid in turn. Per-batch timing and per-level candidate
/// counts are folded into a scratch [`RasterMetrics`] discarded on return;
/// use [`rasterize_with_metrics`] to keep them.
#[cfg_attr(feature = "tracing", tracing::instrument(skip(triangles, config)))]
pub fn rasterize(
  triangles: &[Triangle],
  config: &RasterizeConfig,
) -> Result<RasterizeOutput, RasterizeError> {
  rasterize_with_metrics(triangles, config, &mut RasterMetrics::new())
}

/// Same as [`rasterize`], but accumulates per-batch timing and per-level
/// candidate-list sizes into the caller-owned `metrics` - a free function
/// rather than a method on some long-lived `self`, since `rasterize` has no
/// persistent state to own a metrics field across calls. Recording is a
/// no-op unless the `metrics` feature is enabled.
pub fn rasterize_with_metrics(
  triangles: &[Triangle],
  config: &RasterizeConfig,
  metrics: &mut RasterMetrics,
) -> Result<RasterizeOutput, RasterizeError> {
  config.validate()?;
  let plan = resolution_plan(config.resolution)?;
  let r = config.resolution;
  let voxel_count = (r as usize).pow(3);

  let dist = new_dist_grid(voxel_count);

  match config.variant {
    Variant::Collide => {
      let collide: Vec<[AtomicBool; 3]> = (0..voxel_count)
        .map(|_| [AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false)])
        .collect();

      for (batch_idx, chunk_start) in (0..triangles.len()).step_by(config.batch).enumerate() {
        let batch_start = web_time::Instant::now();
        let count = config.batch.min(triangles.len() - chunk_start);
        let candidates = refine_batch(triangles, chunk_start as u32, count, &plan, config.band, config.tile_size, metrics)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(batch = batch_idx, triangles = count, final_candidates = candidates.len(), "batch seeded and refined");
        #[cfg(not(feature = "tracing"))]
        let _ = batch_idx;

        {
          #[cfg(feature = "tracing")]
          let _span = tracing::debug_span!("reduce", batch = batch_idx).entered();
          reduce_collide_into(triangles, &candidates, r, &dist, &collide);
        }
        metrics.record_batch_timing(batch_start.elapsed().as_micros() as u64);
      }

      let dist = snapshot_dist(&dist);
      let aux = collide
        .into_iter()
        .map(|[x, y, z]| [x.into_inner(), y.into_inner(), z.into_inner()])
        .collect();
      Ok(RasterizeOutput {
        dist,
        aux: AuxGrid::Collide(aux),
      })
    }
    Variant::RepIdx => {
      // Every batch's min-reduction must complete before any tie-break runs,
      // so the final candidate list of each batch is retained until the
      // whole mesh has been folded into `dist`.
      let mut all_candidates = Vec::new();

      for (batch_idx, chunk_start) in (0..triangles.len()).step_by(config.batch).enumerate() {
        let batch_start = web_time::Instant::now();
        let count = config.batch.min(triangles.len() - chunk_start);
        let candidates = refine_batch(triangles, chunk_start as u32, count, &plan, config.band, config.tile_size, metrics)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(batch = batch_idx, triangles = count, final_candidates = candidates.len(), "batch seeded and refined");
        #[cfg(not(feature = "tracing"))]
        let _ = batch_idx;

        {
          #[cfg(feature = "tracing")]
          let _span = tracing::debug_span!("reduce", batch = batch_idx).entered();
          reduce_min_into(triangles, &candidates, r, &dist);
        }
        metrics.record_batch_timing(batch_start.elapsed().as_micros() as u64);

        all_candidates.push(candidates);
      }

      let dist = snapshot_dist(&dist);
      let rep_idx: Vec<AtomicI32> = (0..voxel_count).map(|_| AtomicI32::new(-1)).collect();
      {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("reduce").entered();
        for candidates in &all_candidates {
          repidx_tiebreak_into(triangles, candidates, r, &dist, &rep_idx);
        }
      }

      let aux = rep_idx.into_iter().map(AtomicI32::into_inner).collect();
      Ok(RasterizeOutput {
        dist,
        aux: AuxGrid::RepIdx(aux),
      })
    }
  }
}

/// Non-blocking driver: runs [`rasterize`] on rayon's thread pool and exposes
/// a `poll_results` style API, the async counterpart to the synchronous
/// entry point.
pub struct AsyncRasterizer {
  executor: TaskExecutor,
  task: Option<TaskId>,
}

impl AsyncRasterizer {
  pub fn new() -> Self {
    Self {
      executor: TaskExecutor::default_threads(),
      task: None,
    }
  }

  /// Queue a rasterization job (non-blocking). Replaces any prior, still
  /// pending job's handle - the prior job keeps running to completion on
  /// the thread pool, but its result becomes unreachable through this
  /// instance.
  pub fn start(&mut self, triangles: Vec<Triangle>, config: RasterizeConfig) {
    let task = self
      .executor
      .spawn(move || rasterize(&triangles, &config));
    self.task = Some(task);
  }

  /// Poll for the queued job's result (non-blocking). Returns `None` while
  /// still running, or if no job was ever started.
  pub fn poll_results(&mut self) -> Option<Result<RasterizeOutput, RasterizeError>> {
    let task = self.task?;
    let result = self.executor.poll::<Result<RasterizeOutput, RasterizeError>>(task);
    if result.is_some() {
      self.task = None;
    }
    result
  }

  /// Whether a job is still running.
  pub fn is_running(&self) -> bool {
    self.task.map(|t| self.executor.is_pending(t)).unwrap_or(false)
  }
}

impl Default for AsyncRasterizer {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::reduce::SENTINEL;

  fn single_triangle() -> Vec<Triangle> {
    vec![Triangle::new(
      [0.25, 0.25, 0.25],
      [0.75, 0.25, 0.25],
      [0.25, 0.75, 0.25],
    )]
  }

  #[test]
  fn rasterize_single_triangle_touches_nearby_voxels() {
    let tris = single_triangle();
    let config = RasterizeConfig::new(8, 0.1, Variant::Collide).unwrap();
    let out = rasterize(&tris, &config).unwrap();
    assert_eq!(out.dist.len(), 8 * 8 * 8);
    assert!(out.dist.iter().any(|&d| d < SENTINEL));
  }

  #[test]
  fn rasterize_empty_mesh_leaves_grid_at_sentinel() {
    let tris: Vec<Triangle> = Vec::new();
    let config = RasterizeConfig::new(4, 0.2, Variant::Collide).unwrap();
    let out = rasterize(&tris, &config).unwrap();
    assert!(out.dist.iter().all(|&d| d == SENTINEL));
  }

  #[test]
  fn rasterize_splits_into_multiple_batches() {
    // 5 triangles, batch size 2: exercises the 3-batch accumulation path
    // for both variants against the same shared grid.
    let tris: Vec<Triangle> = (0..5)
      .map(|i| {
        let o = i as f32 * 0.01;
        Triangle::new([0.3 + o, 0.3, 0.3], [0.6 + o, 0.3, 0.3], [0.3 + o, 0.6, 0.3])
      })
      .collect();
    let config = RasterizeConfig::with_batch(8, 0.1, Variant::RepIdx, 2).unwrap();
    let out = rasterize(&tris, &config).unwrap();
    assert_eq!(out.dist.len(), 8 * 8 * 8);
    match &out.aux {
      AuxGrid::RepIdx(rep) => assert!(rep.iter().any(|&i| i >= 0)),
      _ => panic!("expected RepIdx variant"),
    }
  }

  #[test]
  fn batching_does_not_change_the_distance_field() {
    // Splitting the same mesh into different batch sizes must produce the
    // same dist grid: order of reduction across batches does not affect an
    // atomic min.
    let tris: Vec<Triangle> = (0..6)
      .map(|i| {
        let o = i as f32 * 0.02;
        Triangle::new([0.2 + o, 0.2, 0.4], [0.5 + o, 0.2, 0.4], [0.2 + o, 0.5, 0.4])
      })
      .collect();
    let one_batch = RasterizeConfig::with_batch(8, 0.1, Variant::Collide, 64).unwrap();
    let small_batches = RasterizeConfig::with_batch(8, 0.1, Variant::Collide, 2).unwrap();

    let out_a = rasterize(&tris, &one_batch).unwrap();
    let out_b = rasterize(&tris, &small_batches).unwrap();
    assert_eq!(out_a.dist, out_b.dist);
  }

  #[test]
  fn rejects_invalid_config_before_any_work() {
    // A directly-constructed, un-validated config should still be rejected
    // by `rasterize` itself rather than panicking partway through.
    let tris = single_triangle();
    let bad = RasterizeConfig {
      resolution: 0,
      band: 0.0,
      batch: 1024,
      variant: Variant::Collide,
      tile_size: 512,
    };
    assert!(rasterize(&tris, &bad).is_err());
  }

  #[cfg(feature = "metrics")]
  #[test]
  fn rasterize_with_metrics_records_batches_and_levels() {
    let tris: Vec<Triangle> = (0..3)
      .map(|i| {
        let o = i as f32 * 0.01;
        Triangle::new([0.3 + o, 0.3, 0.3], [0.6 + o, 0.3, 0.3], [0.3 + o, 0.6, 0.3])
      })
      .collect();
    let config = RasterizeConfig::with_batch(16, 0.1, Variant::Collide, 1).unwrap();
    let mut metrics = RasterMetrics::new();
    let out = rasterize_with_metrics(&tris, &config, &mut metrics).unwrap();
    assert_eq!(out.dist.len(), 16 * 16 * 16);
    assert_eq!(metrics.batches_processed, 3);
    assert!(!metrics.candidates_per_level.is_empty());
  }

  #[test]
  fn async_rasterizer_completes() {
    let tris = single_triangle();
    let config = RasterizeConfig::new(4, 0.1, Variant::Collide).unwrap();
    let mut runner = AsyncRasterizer::new();
    assert!(!runner.is_running());
    runner.start(tris, config);

    let mut result = None;
    for _ in 0..1000 {
      if let Some(r) = runner.poll_results() {
        result = Some(r);
        break;
      }
      std::thread::sleep(std::time::Duration::from_millis(1));
    }
    assert!(result.unwrap().is_ok());
  }
}
