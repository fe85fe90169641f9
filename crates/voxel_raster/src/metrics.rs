//! Engine-agnostic metrics collection for the rasterization pipeline.
//!
//! Feature-gated and runtime-toggled to ensure zero overhead when disabled.
//!
//! # Usage
//!
//! ```ignore
//! use voxel_raster::metrics::{RasterMetrics, COLLECT_METRICS};
//!
//! // Compile with --features metrics
//! // Runtime toggle:
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! let mut metrics = RasterMetrics::new();
//! metrics.record_batch_timing(batch_us);
//! metrics.record_level_candidates(level, candidates.len() as u64);
//! ```

use std::collections::VecDeque;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;
use std::sync::atomic::AtomicBool;

/// Runtime toggle for metrics collection.
/// Set to false to disable metrics gathering at runtime.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Check if metrics collection is enabled (both compile-time and runtime).
#[inline]
pub fn is_enabled() -> bool {
  #[cfg(feature = "metrics")]
  {
    COLLECT_METRICS.load(Ordering::Relaxed)
  }
  #[cfg(not(feature = "metrics"))]
  {
    false
  }
}

/// Rolling window for storing recent values (e.g., timing history).
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
  buffer: VecDeque<T>,
  capacity: usize,
}

impl<T> RollingWindow<T> {
  /// Create a new rolling window with the given capacity.
  pub fn new(capacity: usize) -> Self {
    Self {
      buffer: VecDeque::with_capacity(capacity),
      capacity,
    }
  }

  /// Push a new value, evicting the oldest if at capacity.
  pub fn push(&mut self, value: T) {
    if self.buffer.len() >= self.capacity {
      self.buffer.pop_front();
    }
    self.buffer.push_back(value);
  }

  pub fn len(&self) -> usize {
    self.buffer.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buffer.is_empty()
  }

  pub fn clear(&mut self) {
    self.buffer.clear();
  }

  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.buffer.iter()
  }

  pub fn last(&self) -> Option<&T> {
    self.buffer.back()
  }

  pub fn as_slice(&self) -> &VecDeque<T> {
    &self.buffer
  }
}

impl<T: Copy + Default + std::ops::Add<Output = T>> RollingWindow<T> {
  pub fn sum(&self) -> T {
    self.buffer.iter().copied().fold(T::default(), |acc, x| acc + x)
  }
}

impl RollingWindow<u64> {
  pub fn average(&self) -> f64 {
    if self.buffer.is_empty() {
      0.0
    } else {
      self.sum() as f64 / self.buffer.len() as f64
    }
  }

  pub fn min_max(&self) -> Option<(u64, u64)> {
    if self.buffer.is_empty() {
      None
    } else {
      let min = *self.buffer.iter().min().unwrap();
      let max = *self.buffer.iter().max().unwrap();
      Some((min, max))
    }
  }
}

impl Default for RollingWindow<u64> {
  fn default() -> Self {
    Self::new(128)
  }
}

/// Pipeline-level statistics updated once per batch.
#[derive(Debug, Clone)]
pub struct RasterMetrics {
  /// Rolling window of whole-batch timings in microseconds (seed through
  /// reduce).
  pub batch_timings: RollingWindow<u64>,
  /// Candidate-list size after each refinement level, most recent batch
  /// first in `last()`, indexed by plan position (index 0 is the result of
  /// the first refinement round, not the level-0 seed).
  pub candidates_per_level: Vec<RollingWindow<u64>>,
  /// Number of times a phase's task count overflowed 32-bit indexing
  /// (see [`crate::error::RasterizeError::CandidateOverflow`]).
  pub overflow_count: u64,
  /// Total batches processed this session.
  pub batches_processed: u64,
  /// Last batch's timing in microseconds.
  pub last_batch_us: u64,
}

impl Default for RasterMetrics {
  fn default() -> Self {
    Self {
      batch_timings: RollingWindow::new(128),
      candidates_per_level: Vec::new(),
      overflow_count: 0,
      batches_processed: 0,
      last_batch_us: 0,
    }
  }
}

impl RasterMetrics {
  /// Create new metrics with default values.
  pub fn new() -> Self {
    Self::default()
  }

  /// Reset all metrics to zero.
  pub fn reset(&mut self) {
    self.batch_timings.clear();
    for level in &mut self.candidates_per_level {
      level.clear();
    }
    self.overflow_count = 0;
    self.last_batch_us = 0;
    // batches_processed is cumulative, not reset.
  }

  /// Record one batch's wall-clock timing.
  pub fn record_batch_timing(&mut self, timing_us: u64) {
    if is_enabled() {
      self.batch_timings.push(timing_us);
      self.last_batch_us = timing_us;
      self.batches_processed += 1;
    }
  }

  /// Record the candidate-list size after refining to `level` (0-indexed by
  /// plan position) within the current batch.
  pub fn record_level_candidates(&mut self, level: usize, count: u64) {
    if !is_enabled() {
      return;
    }
    if level >= self.candidates_per_level.len() {
      self.candidates_per_level.resize_with(level + 1, RollingWindow::default);
    }
    self.candidates_per_level[level].push(count);
  }

  /// Record one 32-bit task-index overflow event.
  pub fn record_overflow(&mut self) {
    if is_enabled() {
      self.overflow_count += 1;
    }
  }

  /// Average batch timing in microseconds.
  pub fn avg_batch_timing_us(&self) -> f64 {
    self.batch_timings.average()
  }
}
