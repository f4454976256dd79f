use super::*;

#[test]
fn override_materials_beat_plain_ones() {
  let stone: MaterialId = 3;
  let water: MaterialId = 7 | MATERIAL_OVERRIDE_BIT;
  assert_eq!(material_max(stone, water), water);
  assert_eq!(material_max(water, stone), water);
  assert_eq!(material_max(water, water), water);
}

#[test]
fn first_non_air_wins_between_plain_materials() {
  assert_eq!(material_max(3, 5), 3);
  assert_eq!(material_max(MATERIAL_AIR, 5), 5);
  assert_eq!(material_max(MATERIAL_AIR, MATERIAL_AIR), MATERIAL_AIR);
}

#[test]
fn aabb_encapsulate_grows_to_fit() {
  let mut bb = Aabb::empty();
  assert!(!bb.is_valid());
  bb.encapsulate([1.0, 2.0, 3.0]);
  bb.encapsulate([-1.0, 5.0, 0.0]);
  assert!(bb.is_valid());
  assert_eq!(bb.min, [-1.0, 2.0, 0.0]);
  assert_eq!(bb.max, [1.0, 5.0, 3.0]);
}

#[test]
fn mesh_output_clear_preserves_capacity() {
  let mut out = MeshOutput::new();
  out.vertices.push(Vertex::default());
  out.indices.extend([0, 0, 0]);
  assert_eq!(out.triangle_count(), 1);
  let cap = out.vertices.capacity();
  out.clear();
  assert!(out.is_empty());
  assert_eq!(out.vertices.capacity(), cap);
}
