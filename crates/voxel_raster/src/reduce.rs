//! Narrow-phase reduction.
//!
//! Consumes the final candidate list at the target resolution `R` and
//! writes the dense `dist` grid plus one of the two auxiliary grids, per
//! this per-voxel algorithm:
//!
//! - `dist[a] <- min(dist[a], euclidean distance from cell center to the
//!   triangle)`, via an atomic compare-and-swap loop on the bit pattern of
//!   the (always non-negative) `f32` distance.
//! - Variant A (`Collide`): for each axis, if a ray from the cell center
//!   along that axis hits the triangle within one voxel width, set that
//!   axis's flag.
//! - Variant B (`RepIdx`): in a second pass, separated from the min
//!   reduction by a barrier, atomically `max` the triangle index into
//!   `repIdx[a]` wherever its distance exactly equals the freshly reduced
//!   minimum - ties break to the highest index.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use rayon::prelude::*;

use crate::candidates::CandidateList;
use crate::codec::{center, to_linear, unpack};
use crate::config::Variant;
use crate::geometry::{point_tri_dist2, ray_tri_hit_dist, Triangle};

/// Initial distance value for voxels no candidate ever reaches.
pub const SENTINEL: f32 = 1e9;

/// Auxiliary per-voxel output, selected by [`Variant`].
#[derive(Debug, Clone)]
pub enum AuxGrid {
  /// One ray-hit flag per axis, per voxel.
  Collide(Vec<[bool; 3]>),
  /// Representative nearest-triangle index, or `-1` if untouched.
  RepIdx(Vec<i32>),
}

/// Result of [`crate::rasterize`]: a dense `R^3` distance grid plus the
/// auxiliary grid selected by [`Variant`].
#[derive(Debug, Clone)]
pub struct RasterizeOutput {
  /// Unsigned Euclidean distance to the nearest triangle, per voxel.
  /// Voxels farther than `band + sqrt(3)/(2R)` from every triangle keep
  /// [`SENTINEL`].
  pub dist: Vec<f32>,
  pub aux: AuxGrid,
}

/// Atomic bit-pattern min for non-negative `f32` values.
///
/// Non-negative IEEE-754 floats compare the same way as their bit patterns
/// interpreted as unsigned integers, so a plain CAS loop on the bits is a
/// correct atomic min - no NaN or negative values ever flow through this
/// pipeline's distances.
fn atomic_f32_min(slot: &AtomicU32, value: f32) {
  debug_assert!(value >= 0.0);
  let value_bits = value.to_bits();
  let mut current = slot.load(Ordering::Relaxed);
  while value_bits < current {
    match slot.compare_exchange_weak(current, value_bits, Ordering::Relaxed, Ordering::Relaxed) {
      Ok(_) => break,
      Err(actual) => current = actual,
    }
  }
}

/// Allocate the shared distance grid, initialized to [`SENTINEL`].
pub(crate) fn new_dist_grid(voxel_count: usize) -> Vec<AtomicU32> {
  (0..voxel_count)
    .map(|_| AtomicU32::new(SENTINEL.to_bits()))
    .collect()
}

/// Read the current value of a shared distance grid without consuming it.
pub(crate) fn snapshot_dist(dist: &[AtomicU32]) -> Vec<f32> {
  dist.iter().map(|b| f32::from_bits(b.load(Ordering::Relaxed))).collect()
}

/// Atomic distance-min pass, shared across batches: folds one batch's final
/// candidate list into `dist` (allocated once by the driver and carried
/// across every batch, against one shared output grid).
pub(crate) fn reduce_min_into(
  triangles: &[Triangle],
  candidates: &CandidateList,
  r: u32,
  dist: &[AtomicU32],
) {
  candidates
    .idx
    .par_iter()
    .zip(candidates.grid.par_iter())
    .for_each(|(&t, &key)| {
      let (x, y, z) = unpack(key);
      let a = to_linear(x, y, z, r) as usize;
      let c = center(x, y, z, r);
      let tri = &triangles[t as usize];
      let d = point_tri_dist2(tri.v[0], tri.v[1], tri.v[2], c).sqrt();
      atomic_f32_min(&dist[a], d);
    });
}

/// Variant A pass: distance-min plus per-axis ray-hit flags, for one batch's
/// final candidate list.
pub(crate) fn reduce_collide_into(
  triangles: &[Triangle],
  candidates: &CandidateList,
  r: u32,
  dist: &[AtomicU32],
  collide: &[[AtomicBool; 3]],
) {
  const AXES: [glam::Vec3; 3] = [glam::Vec3::X, glam::Vec3::Y, glam::Vec3::Z];
  let voxel_width = 1.0 / r as f32;

  candidates
    .idx
    .par_iter()
    .zip(candidates.grid.par_iter())
    .for_each(|(&t, &key)| {
      let (x, y, z) = unpack(key);
      let a = to_linear(x, y, z, r) as usize;
      let c = center(x, y, z, r);
      let tri = &triangles[t as usize];

      let d = point_tri_dist2(tri.v[0], tri.v[1], tri.v[2], c).sqrt();
      atomic_f32_min(&dist[a], d);

      for (u, axis) in AXES.iter().enumerate() {
        let hit = ray_tri_hit_dist(tri.v[0], tri.v[1], tri.v[2], c, *axis);
        if hit <= voxel_width {
          collide[a][u].store(true, Ordering::Relaxed);
        }
      }
    });
}

/// Variant B, pass 2: after every batch's `reduce_min_into` has completed
/// (the barrier the driver enforces between all-batches-seeded and this
/// call), tie-break `repIdx` to the highest triangle index whose distance
/// exactly equals the now-stable minimum, over the union of every batch's
/// final candidate list.
pub(crate) fn repidx_tiebreak_into(
  triangles: &[Triangle],
  candidates: &CandidateList,
  r: u32,
  dist: &[f32],
  rep_idx: &[AtomicI32],
) {
  candidates
    .idx
    .par_iter()
    .zip(candidates.grid.par_iter())
    .for_each(|(&t, &key)| {
      let (x, y, z) = unpack(key);
      let a = to_linear(x, y, z, r) as usize;
      let c = center(x, y, z, r);
      let tri = &triangles[t as usize];
      let d = point_tri_dist2(tri.v[0], tri.v[1], tri.v[2], c).sqrt();
      if d == dist[a] {
        rep_idx[a].fetch_max(t as i32, Ordering::Relaxed);
      }
    });
}

/// Single-list convenience entry point: narrow-phase reduction over one
/// already-complete final candidate list, writing a fresh dense `dist` grid
/// and the auxiliary grid selected by `variant`. The batching driver instead
/// calls the `*_into` functions above directly so it can share one grid
/// across every batch.
pub fn reduce(
  triangles: &[Triangle],
  candidates: &CandidateList,
  r: u32,
  variant: Variant,
) -> RasterizeOutput {
  let voxel_count = (r as usize).pow(3);
  let dist_bits = new_dist_grid(voxel_count);

  match variant {
    Variant::Collide => {
      let collide: Vec<[AtomicBool; 3]> = (0..voxel_count)
        .map(|_| [AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false)])
        .collect();

      reduce_collide_into(triangles, candidates, r, &dist_bits, &collide);

      let dist = snapshot_dist(&dist_bits);
      let aux = collide
        .into_iter()
        .map(|[x, y, z]| [x.into_inner(), y.into_inner(), z.into_inner()])
        .collect();
      RasterizeOutput {
        dist,
        aux: AuxGrid::Collide(aux),
      }
    }
    Variant::RepIdx => {
      reduce_min_into(triangles, candidates, r, &dist_bits);
      let dist = snapshot_dist(&dist_bits);

      let rep_idx: Vec<AtomicI32> = (0..voxel_count).map(|_| AtomicI32::new(-1)).collect();
      repidx_tiebreak_into(triangles, candidates, r, &dist, &rep_idx);

      let aux = rep_idx.into_iter().map(AtomicI32::into_inner).collect();
      RasterizeOutput {
        dist,
        aux: AuxGrid::RepIdx(aux),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codec::pack;

  fn single_triangle() -> Vec<Triangle> {
    vec![Triangle::new(
      [0.25, 0.25, 0.25],
      [0.75, 0.25, 0.25],
      [0.25, 0.75, 0.25],
    )]
  }

  #[test]
  fn untouched_voxels_stay_at_sentinel() {
    let tris = single_triangle();
    let candidates = CandidateList {
      idx: vec![0],
      grid: vec![pack(3, 3, 0)],
    };
    let out = reduce(&tris, &candidates, 8, Variant::Collide);
    let touched = to_linear(3, 3, 0, 8) as usize;
    assert!(out.dist[touched] < SENTINEL);
    assert_eq!(out.dist[to_linear(7, 7, 7, 8) as usize], SENTINEL);
  }

  #[test]
  fn distance_matches_scenario_s1() {
    let tris = single_triangle();
    let candidates = CandidateList {
      idx: vec![0],
      grid: vec![pack(3, 3, 0)],
    };
    let out = reduce(&tris, &candidates, 8, Variant::Collide);
    let a = to_linear(3, 3, 0, 8) as usize;
    assert!((out.dist[a] - 0.1875).abs() < 1e-4, "got {}", out.dist[a]);
  }

  #[test]
  fn repidx_ties_break_to_highest_index() {
    // Two coincident triangles at the same location: repIdx must land on
    // the larger index for every touched voxel.
    let tri = Triangle::new([0.3, 0.3, 0.3], [0.6, 0.3, 0.3], [0.3, 0.6, 0.3]);
    let tris = vec![tri, tri];
    let key = pack(1, 1, 1);
    let candidates = CandidateList {
      idx: vec![0, 1],
      grid: vec![key, key],
    };
    let out = reduce(&tris, &candidates, 4, Variant::RepIdx);
    let a = to_linear(1, 1, 1, 4) as usize;
    match &out.aux {
      AuxGrid::RepIdx(rep) => assert_eq!(rep[a], 1),
      _ => panic!("expected RepIdx variant"),
    }
  }

  #[test]
  fn repidx_defaults_to_negative_one() {
    let tris = single_triangle();
    let candidates = CandidateList {
      idx: vec![0],
      grid: vec![pack(3, 3, 0)],
    };
    let out = reduce(&tris, &candidates, 8, Variant::RepIdx);
    match &out.aux {
      AuxGrid::RepIdx(rep) => {
        assert_eq!(rep[to_linear(7, 7, 7, 8) as usize], -1);
      }
      _ => panic!("expected RepIdx variant"),
    }
  }

  #[test]
  fn collide_flags_set_when_ray_hits_within_one_voxel() {
    // Axis-aligned triangle one voxel ahead of the cell along +z.
    let tri = Triangle::new([0.0, 0.0, 0.5], [1.0, 0.0, 0.5], [0.0, 1.0, 0.5]);
    let tris = vec![tri];
    let r = 4u32;
    let key = pack(0, 0, 1); // center z = 0.375, triangle at z = 0.5: hit at t = 0.125 <= 1/r
    let candidates = CandidateList {
      idx: vec![0],
      grid: vec![key],
    };
    let out = reduce(&tris, &candidates, r, Variant::Collide);
    let a = to_linear(0, 0, 1, r) as usize;
    match &out.aux {
      AuxGrid::Collide(flags) => assert!(flags[a][2], "expected z-axis hit flag set"),
      _ => panic!("expected Collide variant"),
    }
  }

  #[test]
  fn empty_candidates_leave_grid_at_sentinel() {
    let tris = single_triangle();
    let candidates = CandidateList::default();
    let out = reduce(&tris, &candidates, 4, Variant::Collide);
    assert!(out.dist.iter().all(|&d| d == SENTINEL));
  }
}
