//! Error kinds for the rasterization pipeline.
//!
//! Configuration errors are returned eagerly, before any work starts, so a
//! caller never observes partial results. Overflow is a diagnostic event
//! (also emitted as a `tracing::warn!`), not a fatal error - the driver
//! recovers by switching the affected phase to 64-bit task indexing.
//!
//! `phase` fields are one of the pipeline's named stages (`"seed"`,
//! `"refine:N"` for the level reaching resolution `N`, `"reduce"`), owned
//! strings since the refinement phases are numbered per level rather than
//! fixed at compile time.

/// Errors produced by [`crate::rasterize`] and [`crate::config::RasterizeConfig::validate`].
#[derive(Debug, thiserror::Error)]
pub enum RasterizeError {
  /// Resolution is outside the supported `[1, 1024]` range.
  #[error("resolution {0} out of range [1, 1024]")]
  ResolutionOutOfRange(u32),

  /// The resolution planner could not factor `R` into subdivision steps.
  #[error("resolution {0} is not expressible as a product of subdivision factors")]
  UnfactorableResolution(u32),

  /// `band` was negative.
  #[error("band must be non-negative, got {0}")]
  NegativeBand(f32),

  /// `batch` was zero.
  #[error("batch size must be positive")]
  InvalidBatchSize,

  /// Tile size was not a power of two, or exceeded the supported maximum.
  #[error("tile size {0} must be a power of two no greater than 4096")]
  InvalidTileSize(usize),

  /// A candidate list's task count (`M * S^3`) exceeded 32-bit range for a
  /// refinement phase. Not fatal: the driver falls back to 64-bit task
  /// indexing for that phase and continues.
  #[error("candidate list overflowed 32-bit indexing in phase {phase}; continuing with 64-bit task indices")]
  CandidateOverflow { phase: String },

  /// Allocation of a candidate array failed. Fatal: no partial results are
  /// returned.
  #[error("allocation failed while building candidate arrays in phase {phase}")]
  AllocationFailed { phase: String },
}

/// Reserve and fill a `Vec<T>` of length `len`, mapping an allocator failure
/// to [`RasterizeError::AllocationFailed`] instead of letting the default
/// global allocator abort the process - the narrow-phase/broad-phase
/// candidate arrays this backs can reach into the hundreds of millions of
/// elements for a large `M * S^3`.
pub(crate) fn try_alloc_vec_with<T>(
  len: usize,
  phase: &str,
  mut make: impl FnMut() -> T,
) -> Result<Vec<T>, RasterizeError> {
  let mut v = Vec::new();
  v.try_reserve_exact(len)
    .map_err(|_| RasterizeError::AllocationFailed { phase: phase.to_string() })?;
  for _ in 0..len {
    v.push(make());
  }
  Ok(v)
}
