//! Shared value types for tile content and mesh extraction output.

/// Material identifier carried per face.
///
/// `0` is air. The high bit marks override-priority materials (liquids):
/// when two candidate materials compete for a face or a scaled cell, an
/// override material wins over a plain one.
pub type MaterialId = u16;

/// Absence of material.
pub const MATERIAL_AIR: MaterialId = 0;

/// High bit marking override-priority (liquid) materials.
pub const MATERIAL_OVERRIDE_BIT: MaterialId = 0x8000;

/// Whether a material takes priority over plain materials when competing.
#[inline(always)]
pub const fn material_has_priority(material: MaterialId) -> bool {
  material & MATERIAL_OVERRIDE_BIT != 0
}

/// Picks the winning material of two candidates: override beats plain,
/// otherwise the first non-air candidate wins.
#[inline]
pub const fn material_max(a: MaterialId, b: MaterialId) -> MaterialId {
  if material_has_priority(b) && !material_has_priority(a) {
    b
  } else if a != MATERIAL_AIR {
    a
  } else {
    b
  }
}

/// Output vertex in tile-local cell coordinates.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
  /// Position in tile-local cell units. Owned cells span `[0, 16)`; halo
  /// vertices may lie slightly outside.
  pub position: [f32; 3],

  /// Surface normal (unit vector).
  pub normal: [f32; 3],

  /// Material of the face this vertex was emitted for.
  pub material: MaterialId,
}

impl Default for Vertex {
  fn default() -> Self {
    Self {
      position: [0.0; 3],
      normal: [0.0, 1.0, 0.0],
      material: MATERIAL_AIR,
    }
  }
}

/// Axis-aligned bounding box.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Aabb {
  pub min: [f32; 3],
  pub max: [f32; 3],
}

impl Aabb {
  /// Inverted extents, ready for encapsulation.
  pub fn empty() -> Self {
    Self {
      min: [f32::INFINITY; 3],
      max: [f32::NEG_INFINITY; 3],
    }
  }

  #[inline]
  pub fn encapsulate(&mut self, point: [f32; 3]) {
    for i in 0..3 {
      self.min[i] = self.min[i].min(point[i]);
      self.max[i] = self.max[i].max(point[i]);
    }
  }

  pub fn is_valid(&self) -> bool {
    self.min[0] <= self.max[0] && self.min[1] <= self.max[1] && self.min[2] <= self.max[2]
  }
}

impl Default for Aabb {
  fn default() -> Self {
    Self::empty()
  }
}

/// Mesh extraction result.
#[derive(Default)]
pub struct MeshOutput {
  pub vertices: Vec<Vertex>,

  /// Triangle indices, 3 per triangle.
  pub indices: Vec<u32>,

  /// Bounding box encompassing all vertices.
  pub bounds: Aabb,
}

impl MeshOutput {
  pub fn new() -> Self {
    Self::default()
  }

  /// Clear all buffers, preserving capacity.
  pub fn clear(&mut self) {
    self.vertices.clear();
    self.indices.clear();
    self.bounds = Aabb::empty();
  }

  pub fn is_empty(&self) -> bool {
    self.vertices.is_empty()
  }

  pub fn triangle_count(&self) -> usize {
    self.indices.len() / 3
  }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
