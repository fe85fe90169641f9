//! Grid index codec.
//!
//! Packs a 3D integer cell coordinate into a single 32-bit key and back.
//! Coordinates must fit in 10 bits each (`[0, 1024)`), which bounds the
//! maximum supported resolution at 1024. Both directions are branch-free.

/// Number of bits used per axis. `3 * 10 = 30 <= 32`.
const BITS_PER_AXIS: u32 = 10;
const AXIS_MASK: u32 = (1 << BITS_PER_AXIS) - 1;

/// Pack a 3D cell coordinate into a single key.
///
/// `pack(unpack(k)) == k` for any `k` produced by `pack` with in-range
/// coordinates.
#[inline(always)]
pub fn pack(x: u32, y: u32, z: u32) -> u32 {
  debug_assert!(x <= AXIS_MASK && y <= AXIS_MASK && z <= AXIS_MASK);
  (x & AXIS_MASK) | ((y & AXIS_MASK) << BITS_PER_AXIS) | ((z & AXIS_MASK) << (2 * BITS_PER_AXIS))
}

/// Unpack a key back into its 3D cell coordinate.
#[inline(always)]
pub fn unpack(key: u32) -> (u32, u32, u32) {
  let x = key & AXIS_MASK;
  let y = (key >> BITS_PER_AXIS) & AXIS_MASK;
  let z = (key >> (2 * BITS_PER_AXIS)) & AXIS_MASK;
  (x, y, z)
}

/// Linear offset of cell `(x, y, z)` into a dense `n x n x n` grid.
#[inline(always)]
pub fn to_linear(x: u32, y: u32, z: u32, n: u32) -> u32 {
  x + n * y + n * n * z
}

/// Compute the packed key of the child cell `(i, j, k)` of `key` after
/// subdividing its axis by `s`: `pack(unpack(key) * s + (i, j, k))`.
#[inline(always)]
pub fn scale(key: u32, s: u32, i: u32, j: u32, k: u32) -> u32 {
  let (x, y, z) = unpack(key);
  pack(x * s + i, y * s + j, z * s + k)
}

/// Voxel center in `[0, 1]^3` for a cell at resolution `n`.
#[inline(always)]
pub fn center(x: u32, y: u32, z: u32, n: u32) -> glam::Vec3 {
  let inv_n = 1.0 / n as f32;
  glam::Vec3::new(
    (x as f32 + 0.5) * inv_n,
    (y as f32 + 0.5) * inv_n,
    (z as f32 + 0.5) * inv_n,
  )
}
