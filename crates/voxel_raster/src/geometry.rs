//! Triangle geometry kernels.
//!
//! Point-to-triangle squared distance and axis-aligned ray-triangle hit
//! distance, both computed in single precision. Degenerate triangles
//! (collinear or coincident vertices) are detected up front and handled by
//! falling back to point-to-segment (and, for fully collapsed triangles,
//! point-to-point) distance - never NaN.

use glam::Vec3;

/// Below this squared triangle area, treat the triangle as degenerate.
const DEGENERATE_AREA2_EPS: f32 = 1e-12;
/// Below this squared edge length, treat a segment as a point.
const DEGENERATE_LEN2_EPS: f32 = 1e-12;
/// Below this determinant magnitude, a ray is considered parallel to the
/// triangle's plane.
const PARALLEL_EPS: f32 = 1e-8;

/// An immutable triangle, three 3D vertices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
  pub v: [Vec3; 3],
}

impl Triangle {
  pub fn new(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> Self {
    Self {
      v: [Vec3::from(a), Vec3::from(b), Vec3::from(c)],
    }
  }

  pub fn from_vecs(a: Vec3, b: Vec3, c: Vec3) -> Self {
    Self { v: [a, b, c] }
  }
}

/// Closest point to `p` on the closed segment `[a, b]`, squared.
fn point_segment_dist2(a: Vec3, b: Vec3, p: Vec3) -> f32 {
  let ab = b - a;
  let len2 = ab.length_squared();
  if len2 < DEGENERATE_LEN2_EPS {
    return a.distance_squared(p);
  }
  let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
  (a + ab * t).distance_squared(p)
}

/// Squared distance from `p` to the longest edge of the (degenerate)
/// triangle `v1 v2 v3`. When all three vertices coincide, the longest edge
/// has zero length and this collapses to point-to-point distance.
fn degenerate_dist2(v1: Vec3, v2: Vec3, v3: Vec3, p: Vec3) -> f32 {
  let edges = [(v1, v2), (v2, v3), (v3, v1)];
  edges
    .into_iter()
    .max_by(|(a0, b0), (a1, b1)| {
      a0.distance_squared(*b0)
        .partial_cmp(&a1.distance_squared(*b1))
        .unwrap()
    })
    .map(|(a, b)| point_segment_dist2(a, b, p))
    .unwrap()
}

/// Closest point to `p` on the non-degenerate closed triangle `a b c`.
///
/// Region-test algorithm (Ericson, *Real-Time Collision Detection* §5.1.5):
/// the barycentric region containing `p`'s projection determines whether
/// the closest point is a vertex, an edge interior point, or a face
/// interior point.
fn closest_point_on_triangle(a: Vec3, b: Vec3, c: Vec3, p: Vec3) -> Vec3 {
  let ab = b - a;
  let ac = c - a;
  let ap = p - a;
  let d1 = ab.dot(ap);
  let d2 = ac.dot(ap);
  if d1 <= 0.0 && d2 <= 0.0 {
    return a;
  }

  let bp = p - b;
  let d3 = ab.dot(bp);
  let d4 = ac.dot(bp);
  if d3 >= 0.0 && d4 <= d3 {
    return b;
  }

  let vc = d1 * d4 - d3 * d2;
  if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
    let v = d1 / (d1 - d3);
    return a + ab * v;
  }

  let cp = p - c;
  let d5 = ab.dot(cp);
  let d6 = ac.dot(cp);
  if d6 >= 0.0 && d5 <= d6 {
    return c;
  }

  let vb = d5 * d2 - d1 * d6;
  if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
    let w = d2 / (d2 - d6);
    return a + ac * w;
  }

  let va = d3 * d6 - d5 * d4;
  if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
    let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
    return b + (c - b) * w;
  }

  let denom = 1.0 / (va + vb + vc);
  let v = vb * denom;
  let w = vc * denom;
  a + ab * v + ac * w
}

/// Squared Euclidean distance from `p` to the closed triangle `(v1, v2, v3)`.
///
/// Degenerate triangles (collinear or coincident vertices) fall back to
/// point-to-segment distance on the longest edge, never NaN.
pub fn point_tri_dist2(v1: Vec3, v2: Vec3, v3: Vec3, p: Vec3) -> f32 {
  let area2 = (v2 - v1).cross(v3 - v1).length_squared();
  if area2 < DEGENERATE_AREA2_EPS {
    return degenerate_dist2(v1, v2, v3, p);
  }
  closest_point_on_triangle(v1, v2, v3, p).distance_squared(p)
}

/// Parametric distance `t >= 0` at which ray `o + t*d` enters triangle
/// `(v1, v2, v3)`, or `+inf` if no intersection.
///
/// `d` is expected to be one of the three unit axis directions, but the
/// Möller-Trumbore test below makes no assumption about it. Back-face hits
/// count (no winding-order culling); a ray parallel to the triangle's plane,
/// or a hit behind the ray origin, returns `+inf`.
pub fn ray_tri_hit_dist(v1: Vec3, v2: Vec3, v3: Vec3, o: Vec3, d: Vec3) -> f32 {
  let e1 = v2 - v1;
  let e2 = v3 - v1;
  let pvec = d.cross(e2);
  let det = e1.dot(pvec);
  if det.abs() < PARALLEL_EPS {
    return f32::INFINITY;
  }
  let inv_det = 1.0 / det;

  let tvec = o - v1;
  let u = tvec.dot(pvec) * inv_det;
  if !(0.0..=1.0).contains(&u) {
    return f32::INFINITY;
  }

  let qvec = tvec.cross(e1);
  let v = d.dot(qvec) * inv_det;
  if v < 0.0 || u + v > 1.0 {
    return f32::INFINITY;
  }

  let t = e2.dot(qvec) * inv_det;
  if t < 0.0 {
    return f32::INFINITY;
  }
  t
}

#[cfg(test)]
mod tests {
  use super::*;

  fn v(x: f32, y: f32, z: f32) -> Vec3 {
    Vec3::new(x, y, z)
  }

  #[test]
  fn dist_to_coplanar_interior_point_is_zero() {
    let tri = Triangle::new([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
    let p = v(0.25, 0.25, 0.0);
    let d2 = point_tri_dist2(tri.v[0], tri.v[1], tri.v[2], p);
    assert!(d2 < 1e-6);
  }

  #[test]
  fn dist_perpendicular_to_face_matches_height() {
    let tri = Triangle::new([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
    let p = v(0.25, 0.25, 2.0);
    let d2 = point_tri_dist2(tri.v[0], tri.v[1], tri.v[2], p);
    assert!((d2 - 4.0).abs() < 1e-5);
  }

  #[test]
  fn dist_is_symmetric_under_vertex_permutation() {
    let a = v(0.1, 0.2, 0.3);
    let b = v(0.9, 0.1, 0.0);
    let c = v(0.4, 0.8, 0.2);
    let p = v(0.3, 0.3, 0.5);

    let perms = [
      (a, b, c),
      (a, c, b),
      (b, a, c),
      (b, c, a),
      (c, a, b),
      (c, b, a),
    ];
    let base = point_tri_dist2(a, b, c, p);
    for (x, y, z) in perms {
      let d2 = point_tri_dist2(x, y, z, p);
      assert!((d2 - base).abs() < 1e-4, "base={base} d2={d2}");
    }
  }

  #[test]
  fn degenerate_coincident_vertices_is_point_distance_no_nan() {
    let p0 = v(0.5, 0.5, 0.5);
    let p = v(1.5, 0.5, 0.5);
    let d2 = point_tri_dist2(p0, p0, p0, p);
    assert!(d2.is_finite());
    assert!((d2 - 1.0).abs() < 1e-6);
  }

  #[test]
  fn degenerate_collinear_vertices_no_nan() {
    let a = v(0.0, 0.0, 0.0);
    let b = v(1.0, 0.0, 0.0);
    let c = v(2.0, 0.0, 0.0); // collinear with a, b
    let p = v(3.0, 1.0, 0.0);
    let d2 = point_tri_dist2(a, b, c, p);
    assert!(d2.is_finite());
    // Longest edge is (a, c); distance to that segment from p.
    let expected = point_segment_dist2(a, c, p);
    assert!((d2 - expected).abs() < 1e-6);
  }

  #[test]
  fn ray_hits_triangle_along_z_axis() {
    let tri = Triangle::new([0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]);
    let o = v(0.2, 0.2, 0.0);
    let t = ray_tri_hit_dist(tri.v[0], tri.v[1], tri.v[2], o, v(0.0, 0.0, 1.0));
    assert!((t - 1.0).abs() < 1e-5);
  }

  #[test]
  fn ray_misses_outside_triangle() {
    let tri = Triangle::new([0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]);
    let o = v(5.0, 5.0, 0.0);
    let t = ray_tri_hit_dist(tri.v[0], tri.v[1], tri.v[2], o, v(0.0, 0.0, 1.0));
    assert_eq!(t, f32::INFINITY);
  }

  #[test]
  fn ray_behind_origin_returns_infinity() {
    let tri = Triangle::new([0.0, 0.0, -1.0], [1.0, 0.0, -1.0], [0.0, 1.0, -1.0]);
    let o = v(0.2, 0.2, 0.0);
    let t = ray_tri_hit_dist(tri.v[0], tri.v[1], tri.v[2], o, v(0.0, 0.0, 1.0));
    assert_eq!(t, f32::INFINITY);
  }

  #[test]
  fn parallel_ray_returns_infinity() {
    let tri = Triangle::new([0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]);
    let o = v(0.2, 0.2, 0.0);
    let t = ray_tri_hit_dist(tri.v[0], tri.v[1], tri.v[2], o, v(1.0, 0.0, 0.0));
    assert_eq!(t, f32::INFINITY);
  }

  #[test]
  fn back_face_hit_counts() {
    // Triangle wound so the ray approaches its back face; the hit must
    // still be reported (no winding-order culling).
    let tri = Triangle::new([0.0, 1.0, 1.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]);
    let o = v(0.2, 0.2, 0.0);
    let t = ray_tri_hit_dist(tri.v[0], tri.v[1], tri.v[2], o, v(0.0, 0.0, 1.0));
    assert!((t - 1.0).abs() < 1e-5);
  }
}
