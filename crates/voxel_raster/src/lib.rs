//! voxel_raster - Hierarchical triangle-mesh-to-voxel distance field
//! rasterization.
//!
//! Given a triangle soup embedded in the unit cube and a target resolution
//! `R`, this crate computes a dense `R`×`R`×`R` grid of unsigned distances to
//! the nearest triangle, plus auxiliary per-voxel data (a three-axis ray-hit
//! parity triple, or a representative triangle index) used by callers to
//! derive an inside/outside classification.
//!
//! # Pipeline
//!
//! The mesh is processed in batches of triangles. Each batch seeds a single
//! candidate `(triangle, cell)` pair per triangle at the coarsest resolution,
//! then refines that candidate list through a sequence of subdivisions (see
//! [`plan`]) until it reaches the target resolution, geometrically pruning
//! any pair whose triangle cannot influence the child cell (see
//! [`candidates`]). The final candidate list is reduced into a shared dense
//! grid (see [`reduce`]).
//!
//! Refinement and reduction are expressed as flat, independent per-task work
//! over a `rayon` parallel iterator - the host equivalent of a GPU kernel
//! launch over a tile grid.
//!
//! # Example
//!
//! ```ignore
//! use voxel_raster::{rasterize, RasterizeConfig, Triangle, Variant};
//!
//! let triangles = vec![Triangle::new(
//!     [0.25, 0.25, 0.25],
//!     [0.75, 0.25, 0.25],
//!     [0.25, 0.75, 0.25],
//! )];
//!
//! let config = RasterizeConfig::new(8, 0.1, Variant::Collide).unwrap();
//! let output = rasterize(&triangles, &config).unwrap();
//! println!("{} voxels in band", output.dist.iter().filter(|d| **d < 1e9).count());
//! ```

pub mod codec;
pub mod geometry;
pub mod plan;

pub mod candidates;
pub mod reduce;

pub mod config;
pub mod error;

pub mod driver;

// Cross-platform threading abstraction (native rayon, WASM-compatible).
pub mod threading;

pub mod metrics;


pub use codec::{pack, scale, to_linear, unpack};
pub use config::{RasterizeConfig, Variant};
pub use driver::{rasterize, rasterize_with_metrics, AsyncRasterizer};
pub use error::RasterizeError;
pub use geometry::{point_tri_dist2, ray_tri_hit_dist, Triangle};
pub use reduce::{AuxGrid, RasterizeOutput};
