//! Candidate-list refinement, the broad phase.
//!
//! Given a candidate list `(idx, grid)` at resolution `n`, produces the list
//! at resolution `n * s` containing every `(triangle, child cell)` pair that
//! passes the geometric inclusion test: the triangle must lie within
//! `threshold` of the child cell's center, where `threshold` is chosen so
//! that no triangle within `band` of any point in the cell is ever pruned
//! (the inclusion test below).
//!
//! The reference design launches one task per `(candidate, child)` pair -
//! `M * S^3` tasks total - grouped into fixed-size tiles, and compacts the
//! passing tasks with a two-pass scheme: pass 1 counts how many tasks in
//! each tile pass, reserving that tile's slab in the output with a single
//! atomic add into a global total (order-insensitive, since candidate order
//! carries no meaning); pass 2 re-walks the same tiling and writes each
//! passing task's `(idx, grid)` pair into its tile's slab. This module fuses
//! the two GPU-shaped passes into one rayon pass per tile (the predicate and
//! the value it gates are cheap to compute together on a CPU, unlike on a
//! GPU where the value write is a separate, bandwidth-heavy kernel
//! launch) while preserving the race-tolerant, non-prefix-sum slab
//! assignment: each tile reserves its slab with one `AtomicU32::fetch_add`
//! against a shared global counter as soon as that tile's rayon task
//! completes.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use crate::codec::{center, scale, unpack};
use crate::error::{try_alloc_vec_with, RasterizeError};
use crate::geometry::{point_tri_dist2, Triangle};
use crate::metrics::RasterMetrics;

/// Conservative upper bound on the half-diagonal of a unit cell,
/// `sqrt(3)/2 ~= 0.86602540378`. Used (slightly over-) to guarantee the
/// inclusion test never prunes a triangle that is genuinely within `band` of
/// some point in the cell.
pub const HALF_DIAGONAL: f32 = 0.87;

/// A candidate list: parallel `idx`/`grid` arrays of equal length. Order is
/// not semantically meaningful.
#[derive(Debug, Clone, Default)]
pub struct CandidateList {
  /// Triangle index for each candidate, in `[0, F)`.
  pub idx: Vec<u32>,
  /// Packed grid key for each candidate, at the list's current resolution.
  pub grid: Vec<u32>,
}

impl CandidateList {
  /// Number of candidates.
  pub fn len(&self) -> usize {
    self.idx.len()
  }

  pub fn is_empty(&self) -> bool {
    self.idx.is_empty()
  }

  /// Seed the level-0 candidate list for a batch of `count` triangles
  /// starting at `offset`: one candidate per triangle, all at cell `(0,0,0)`
  /// (resolution 1).
  pub fn seed(offset: u32, count: usize) -> Self {
    let idx = (0..count as u32).map(|i| offset + i).collect();
    let grid = vec![crate::codec::pack(0, 0, 0); count];
    Self { idx, grid }
  }
}

/// Unravel a flat child index `rem` in `[0, s^3)` into `(i, j, k)` in
/// `[0, s)^3`.
#[inline(always)]
fn unravel_child(rem: u64, s: u64) -> (u32, u32, u32) {
  let i = rem / (s * s);
  let j = (rem / s) % s;
  let k = rem % s;
  (i as u32, j as u32, k as u32)
}

/// Refine `input` (at resolution `n`) through subdivision factor `s`,
/// producing the candidate list at resolution `n * s`.
///
/// `tile_size` is the number of `(candidate, child)` tasks grouped per tile
/// for the compaction pass; it must be a power of two (validated by
/// [`crate::config::RasterizeConfig::validate`]).
///
/// `phase` names this refinement level (e.g. `"refine:16"`, for the level
/// producing resolution 16) for diagnostics: it labels the overflow warning
/// below, the [`RasterizeError::CandidateOverflow`]/[`RasterizeError::AllocationFailed`]
/// variants it can raise, and is folded into `metrics`' overflow counter.
#[allow(clippy::too_many_arguments)]
pub fn refine(
  triangles: &[Triangle],
  input: &CandidateList,
  n: u32,
  s: u32,
  band: f32,
  tile_size: usize,
  phase: &str,
  metrics: &mut RasterMetrics,
) -> Result<CandidateList, RasterizeError> {
  let m = input.len();
  if m == 0 || s == 0 {
    return Ok(CandidateList::default());
  }

  let s3 = (s as u64) * (s as u64) * (s as u64);
  let total_tasks = m as u64 * s3;
  if total_tasks == 0 {
    return Ok(CandidateList::default());
  }

  if total_tasks > u32::MAX as u64 {
    let overflow = RasterizeError::CandidateOverflow { phase: phase.to_string() };
    metrics.record_overflow();
    #[cfg(feature = "tracing")]
    tracing::warn!(phase, total_tasks, "{overflow}");
    #[cfg(not(feature = "tracing"))]
    let _ = &overflow;
  }

  let n_new = n * s;
  // Inclusion threshold: the test is on squared distance, so precompute the
  // squared threshold once per level.
  let threshold = HALF_DIAGONAL / n_new as f32 + band;
  let threshold2 = threshold * threshold;

  let num_tiles = total_tasks.div_ceil(tile_size as u64) as usize;
  let global_total = AtomicU32::new(0);

  // One rayon task per tile. Each tile walks its slice of the flattened
  // (candidate, child) task space sequentially - the CPU analogue of a
  // tile's tasks sharing a local counter - builds its local passing list,
  // then reserves its output slab with a single atomic add against the
  // shared global counter. Slab order therefore reflects whichever tile's
  // rayon task completes the reservation first, not tile index order: the
  // a race-tolerant, non-prefix-sum slab assignment rather than a scan.
  let mut tile_results: Vec<(u32, Vec<(u32, u32)>)> = (0..num_tiles)
    .into_par_iter()
    .map(|tile| {
      let start = tile as u64 * tile_size as u64;
      let end = (start + tile_size as u64).min(total_tasks);

      let mut local = Vec::new();
      for task in start..end {
        let cand_i = (task / s3) as usize;
        let rem = task % s3;
        let (i, j, k) = unravel_child(rem, s as u64);

        let t = input.idx[cand_i];
        let child_key = scale(input.grid[cand_i], s, i, j, k);
        let (cx, cy, cz) = unpack(child_key);
        let c = center(cx, cy, cz, n_new);

        let tri = &triangles[t as usize];
        let d2 = point_tri_dist2(tri.v[0], tri.v[1], tri.v[2], c);
        if d2 < threshold2 {
          local.push((t, child_key));
        }
      }

      let offset = global_total.fetch_add(local.len() as u32, Ordering::Relaxed);
      (offset, local)
    })
    .collect();

  let m_new = global_total.load(Ordering::Relaxed) as usize;
  let mut idx = try_alloc_vec_with(m_new, phase, || 0u32)?;
  let mut grid = try_alloc_vec_with(m_new, phase, || 0u32)?;

  // Copy each tile's local slab into its reserved output range. The
  // reservation already fixed disjoint, non-overlapping ranges, so this is
  // just a flatten; it runs over M' <= M*S^3 entries, not the full task
  // space, so a sequential copy here is not the bottleneck.
  tile_results.sort_by_key(|(offset, _)| *offset);
  for (offset, local) in tile_results.drain(..) {
    let offset = offset as usize;
    for (slot, (t, key)) in local.into_iter().enumerate() {
      idx[offset + slot] = t;
      grid[offset + slot] = key;
    }
  }

  Ok(CandidateList { idx, grid })
}
