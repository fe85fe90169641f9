//! Configuration surface.

use crate::error::RasterizeError;
use crate::plan::resolution_plan;

/// Which auxiliary per-voxel field the narrow phase populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
  /// Per-axis ray-hit parity triple, for flood-fill-style inside/outside
  /// classification.
  Collide,
  /// Representative nearest-triangle index, tie-broken by highest index.
  RepIdx,
}

/// Default number of triangles processed per batch.
pub const DEFAULT_BATCH: usize = 131_072;

/// Default tile size for the two-pass compaction in [`crate::candidates`].
pub const DEFAULT_TILE_SIZE: usize = 512;

/// Validated configuration for [`crate::rasterize`].
#[derive(Debug, Clone)]
pub struct RasterizeConfig {
  /// Target grid resolution `R`; the output grid is `R` x `R` x `R`.
  pub resolution: u32,
  /// Distance band: voxels farther than `band + sqrt(3)/(2R)` from every
  /// triangle keep the sentinel distance.
  pub band: f32,
  /// Number of triangles processed per batch.
  pub batch: usize,
  /// Which auxiliary field to compute.
  pub variant: Variant,
  /// Tasks per tile in the two-pass compaction (must be a power of two).
  pub tile_size: usize,
}

impl RasterizeConfig {
  /// Build a config with the default batch size and tile size, validating
  /// eagerly so configuration errors are reported before any work starts.
  pub fn new(resolution: u32, band: f32, variant: Variant) -> Result<Self, RasterizeError> {
    Self::with_batch(resolution, band, variant, DEFAULT_BATCH)
  }

  /// Build a config with an explicit batch size.
  pub fn with_batch(
    resolution: u32,
    band: f32,
    variant: Variant,
    batch: usize,
  ) -> Result<Self, RasterizeError> {
    let config = Self {
      resolution,
      band,
      batch,
      variant,
      tile_size: DEFAULT_TILE_SIZE,
    };
    config.validate()?;
    Ok(config)
  }

  /// Re-validate after mutating fields directly (e.g. a custom `tile_size`).
  pub fn validate(&self) -> Result<(), RasterizeError> {
    if self.resolution == 0 || self.resolution > 1024 {
      return Err(RasterizeError::ResolutionOutOfRange(self.resolution));
    }
    if self.band < 0.0 {
      return Err(RasterizeError::NegativeBand(self.band));
    }
    if self.batch == 0 {
      return Err(RasterizeError::InvalidBatchSize);
    }
    if self.tile_size == 0 || self.tile_size > 4096 || !self.tile_size.is_power_of_two() {
      return Err(RasterizeError::InvalidTileSize(self.tile_size));
    }
    // Confirm the planner can actually factor this resolution; propagates
    // RasterizeError::UnfactorableResolution.
    resolution_plan(self.resolution)?;
    Ok(())
  }

  /// The maximum distance at which a voxel is guaranteed to be written:
  /// `band + sqrt(3)/(2R)`, per the external interface postcondition.
  pub fn effective_band(&self) -> f32 {
    self.band + crate::candidates::HALF_DIAGONAL / self.resolution as f32
  }
}
