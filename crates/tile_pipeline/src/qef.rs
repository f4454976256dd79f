//! Quadric error function accumulation and solving.
//!
//! Each cell that contains a surface crossing accumulates one plane per
//! crossed edge into a [`QefData`]. The solver then finds the point that
//! minimizes the summed squared distance to all accumulated planes, which is
//! where the cell's mesh vertex goes.
//!
//! [`QefData`] is a plain additive accumulator: merging two of them is
//! component-wise addition, so coarse tiles can combine the accumulators of
//! their covering child cells without re-sampling the field. Merge order does
//! not affect the solved vertex beyond floating-point noise.

use glam::DVec3;

// ============================================================================
// accumulator
// ============================================================================

/// Additive accumulator for the quadric error function `|Ax - b|²`.
///
/// Stores the upper triangle of `AᵀA`, the vector `Aᵀb`, the scalar `bᵀb`,
/// and the running sum of plane intersection points (the mass point).
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct QefData {
  pub ata_00: f64,
  pub ata_01: f64,
  pub ata_02: f64,
  pub ata_11: f64,
  pub ata_12: f64,
  pub ata_22: f64,
  pub atb: DVec3,
  pub btb: f64,
  pub point_sum: DVec3,
  pub point_count: u32,
}

impl QefData {
  pub const fn new() -> Self {
    Self {
      ata_00: 0.0,
      ata_01: 0.0,
      ata_02: 0.0,
      ata_11: 0.0,
      ata_12: 0.0,
      ata_22: 0.0,
      atb: DVec3::ZERO,
      btb: 0.0,
      point_sum: DVec3::ZERO,
      point_count: 0,
    }
  }

  pub const fn is_empty(&self) -> bool {
    self.point_count == 0
  }

  /// Accumulates the plane through `point` with the given normal.
  ///
  /// The normal is normalized first; a zero or non-finite normal is ignored
  /// so a degenerate gradient sample cannot poison the accumulator.
  pub fn add_plane(&mut self, point: DVec3, normal: DVec3) {
    let len_sq = normal.length_squared();
    if !(len_sq > 0.0 && len_sq.is_finite()) {
      return;
    }
    let n = normal / len_sq.sqrt();
    self.ata_00 += n.x * n.x;
    self.ata_01 += n.x * n.y;
    self.ata_02 += n.x * n.z;
    self.ata_11 += n.y * n.y;
    self.ata_12 += n.y * n.z;
    self.ata_22 += n.z * n.z;
    let b = point.dot(n);
    self.atb += n * b;
    self.btb += b * b;
    self.point_sum += point;
    self.point_count += 1;
  }

  /// Merges another accumulator into this one. Commutative and associative
  /// up to floating-point rounding.
  pub fn merge(&mut self, other: &QefData) {
    self.ata_00 += other.ata_00;
    self.ata_01 += other.ata_01;
    self.ata_02 += other.ata_02;
    self.ata_11 += other.ata_11;
    self.ata_12 += other.ata_12;
    self.ata_22 += other.ata_22;
    self.atb += other.atb;
    self.btb += other.btb;
    self.point_sum += other.point_sum;
    self.point_count += other.point_count;
  }

  /// Average of all accumulated intersection points.
  pub fn mass_point(&self) -> DVec3 {
    if self.point_count == 0 {
      DVec3::ZERO
    } else {
      self.point_sum / self.point_count as f64
    }
  }

  fn ata_mul(&self, v: DVec3) -> DVec3 {
    DVec3::new(
      self.ata_00 * v.x + self.ata_01 * v.y + self.ata_02 * v.z,
      self.ata_01 * v.x + self.ata_11 * v.y + self.ata_12 * v.z,
      self.ata_02 * v.x + self.ata_12 * v.y + self.ata_22 * v.z,
    )
  }

  /// Residual `|Ax - b|²` at `pos`.
  pub fn error(&self, pos: DVec3) -> f64 {
    pos.dot(self.ata_mul(pos)) - 2.0 * pos.dot(self.atb) + self.btb
  }

  /// Re-expresses the accumulator under the point map `p -> p * scale + offset`.
  ///
  /// Normals are direction-only so `AᵀA` is unchanged under a uniform scale;
  /// the plane offsets become `b' = scale * b + n·offset`, which rewrites the
  /// remaining fields in closed form. Combining child accumulators into a
  /// parent cell uses this to move them into the parent's coordinate frame
  /// first.
  pub fn transformed(&self, scale: f64, offset: DVec3) -> QefData {
    let ata_offset = self.ata_mul(offset);
    QefData {
      ata_00: self.ata_00,
      ata_01: self.ata_01,
      ata_02: self.ata_02,
      ata_11: self.ata_11,
      ata_12: self.ata_12,
      ata_22: self.ata_22,
      atb: self.atb * scale + ata_offset,
      btb: self.btb * scale * scale + 2.0 * scale * self.atb.dot(offset) + offset.dot(ata_offset),
      point_sum: self.point_sum * scale + offset * self.point_count as f64,
      point_count: self.point_count,
    }
  }
}

// ============================================================================
// solver
// ============================================================================

/// QEF minimizer configuration. Callers construct one and pass it explicitly
/// wherever cells are solved; there is no hidden per-thread state.
#[derive(Clone, Copy, Debug)]
pub struct QefSolver {
  /// Jacobi sweep count for the symmetric SVD.
  pub svd_sweeps: usize,
  /// Singular values below this (or whose reciprocal exceeds its inverse)
  /// are treated as zero in the pseudoinverse.
  pub pinv_tolerance: f64,
}

impl Default for QefSolver {
  fn default() -> Self {
    Self {
      svd_sweeps: 6,
      pinv_tolerance: 1e-6,
    }
  }
}

impl QefSolver {
  /// Solves for the minimizing position, clamped to the inclusive box
  /// `[min, max]`.
  ///
  /// The system is solved relative to the mass point, which keeps it well
  /// conditioned and makes rank-deficient configurations (flat planes,
  /// straight creases) land on the mass point along their null directions.
  /// An empty accumulator yields the clamped mass point, i.e. `min..max`
  /// clamped zero.
  pub fn solve(&self, data: &QefData, min: DVec3, max: DVec3) -> DVec3 {
    let mass = data.mass_point();
    if data.is_empty() {
      return mass.clamp(min, max);
    }
    let atb_rel = data.atb - data.ata_mul(mass);
    let x = svd_solve_symmetric(data, atb_rel, self.svd_sweeps, self.pinv_tolerance);
    let pos = mass + x;
    if pos.is_finite() {
      pos.clamp(min, max)
    } else {
      mass.clamp(min, max)
    }
  }
}

// Symmetric 3x3 eigendecomposition by cyclic Jacobi rotations, then a
// pseudoinverse solve. The matrix is diagonalized in place while the
// accumulated rotations form the eigenvector basis.

#[derive(Clone, Copy)]
struct SymMat3 {
  m00: f64,
  m01: f64,
  m02: f64,
  m11: f64,
  m12: f64,
  m22: f64,
}

fn givens_coefficients(a_pp: f64, a_pq: f64, a_qq: f64) -> (f64, f64) {
  if a_pq == 0.0 {
    return (1.0, 0.0);
  }
  let tau = (a_qq - a_pp) / (2.0 * a_pq);
  let stt = (1.0 + tau * tau).sqrt();
  let tan = 1.0 / if tau >= 0.0 { tau + stt } else { tau - stt };
  let c = 1.0 / (1.0 + tan * tan).sqrt();
  (c, tan * c)
}

// Rotation in the (0,1) plane: updates the symmetric matrix and accumulates
// the rotation into the eigenvector rows.
fn rotate01(m: &mut SymMat3, v: &mut [DVec3; 3]) {
  if m.m01 == 0.0 {
    return;
  }
  let (c, s) = givens_coefficients(m.m00, m.m01, m.m11);
  let (cc, ss, mix) = (c * c, s * s, 2.0 * c * s * m.m01);
  let (m00, m02, m11, m12) = (m.m00, m.m02, m.m11, m.m12);
  m.m00 = cc * m00 - mix + ss * m11;
  m.m01 = 0.0;
  m.m02 = c * m02 - s * m12;
  m.m11 = ss * m00 + mix + cc * m11;
  m.m12 = s * m02 + c * m12;
  for row in v.iter_mut() {
    let (a, b) = (row.x, row.y);
    row.x = c * a - s * b;
    row.y = s * a + c * b;
  }
}

fn rotate02(m: &mut SymMat3, v: &mut [DVec3; 3]) {
  if m.m02 == 0.0 {
    return;
  }
  let (c, s) = givens_coefficients(m.m00, m.m02, m.m22);
  let (cc, ss, mix) = (c * c, s * s, 2.0 * c * s * m.m02);
  let (m00, m01, m12, m22) = (m.m00, m.m01, m.m12, m.m22);
  m.m00 = cc * m00 - mix + ss * m22;
  m.m01 = c * m01 - s * m12;
  m.m02 = 0.0;
  m.m12 = s * m01 + c * m12;
  m.m22 = ss * m00 + mix + cc * m22;
  for row in v.iter_mut() {
    let (a, b) = (row.x, row.z);
    row.x = c * a - s * b;
    row.z = s * a + c * b;
  }
}

fn rotate12(m: &mut SymMat3, v: &mut [DVec3; 3]) {
  if m.m12 == 0.0 {
    return;
  }
  let (c, s) = givens_coefficients(m.m11, m.m12, m.m22);
  let (cc, ss, mix) = (c * c, s * s, 2.0 * c * s * m.m12);
  let (m01, m02, m11, m22) = (m.m01, m.m02, m.m11, m.m22);
  m.m01 = c * m01 - s * m02;
  m.m02 = s * m01 + c * m02;
  m.m11 = cc * m11 - mix + ss * m22;
  m.m12 = 0.0;
  m.m22 = ss * m11 + mix + cc * m22;
  for row in v.iter_mut() {
    let (a, b) = (row.y, row.z);
    row.y = c * a - s * b;
    row.z = s * a + c * b;
  }
}

fn pinv(x: f64, tol: f64) -> f64 {
  if x.abs() < tol || (1.0 / x).abs() < tol {
    0.0
  } else {
    1.0 / x
  }
}

fn svd_solve_symmetric(data: &QefData, b: DVec3, sweeps: usize, tol: f64) -> DVec3 {
  let mut m = SymMat3 {
    m00: data.ata_00,
    m01: data.ata_01,
    m02: data.ata_02,
    m11: data.ata_11,
    m12: data.ata_12,
    m22: data.ata_22,
  };
  // Eigenvector basis, stored as rows of V.
  let mut v = [DVec3::X, DVec3::Y, DVec3::Z];
  for _ in 0..sweeps {
    rotate01(&mut m, &mut v);
    rotate02(&mut m, &mut v);
    rotate12(&mut m, &mut v);
    let off = m.m01 * m.m01 + m.m02 * m.m02 + m.m12 * m.m12;
    if off < f64::EPSILON {
      break;
    }
  }
  let sigma_inv = DVec3::new(pinv(m.m00, tol), pinv(m.m11, tol), pinv(m.m22, tol));
  // x = V * Σ⁺ * Vᵀ * b, with V stored row-wise (eigenvectors are columns).
  let vt_b = DVec3::new(
    v[0].x * b.x + v[1].x * b.y + v[2].x * b.z,
    v[0].y * b.x + v[1].y * b.y + v[2].y * b.z,
    v[0].z * b.x + v[1].z * b.y + v[2].z * b.z,
  );
  let scaled = sigma_inv * vt_b;
  DVec3::new(v[0].dot(scaled), v[1].dot(scaled), v[2].dot(scaled))
}

#[cfg(test)]
#[path = "qef_test.rs"]
mod qef_test;
