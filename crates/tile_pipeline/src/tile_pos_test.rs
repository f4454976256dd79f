use super::*;

#[test]
fn down_then_up_restores_parent() {
  let p = TilePos::new(5, -3, 7, 12);
  for i in 0..8 {
    assert_eq!(p.down(i).up(), p, "child {i}");
  }
}

#[test]
fn down_then_up_restores_parent_for_negative_coords() {
  let p = TilePos::new(3, -1, -1, -1);
  for i in 0..8 {
    assert_eq!(p.down(i).up(), p, "child {i}");
  }
}

#[test]
fn children_are_distinct_and_one_level_finer() {
  let p = TilePos::new(2, 4, -9, 0);
  let kids: Vec<_> = p.children().collect();
  assert_eq!(kids.len(), 8);
  for (i, a) in kids.iter().enumerate() {
    assert_eq!(a.level, 1);
    for b in &kids[i + 1..] {
      assert_ne!(a, b);
    }
  }
}

#[test]
fn child_index_bits_map_to_axes() {
  let p = TilePos::new(1, 0, 0, 0);
  assert_eq!(p.down(0b001), TilePos::new(0, 1, 0, 0));
  assert_eq!(p.down(0b010), TilePos::new(0, 0, 1, 0));
  assert_eq!(p.down(0b100), TilePos::new(0, 0, 0, 1));
}

#[test]
fn up_to_matches_repeated_up() {
  let p = TilePos::new(0, 123, -456, 789);
  let mut q = p;
  for target in 1..8u8 {
    q = q.up();
    assert_eq!(p.up_to(target), q);
  }
}

#[test]
fn down_to_lands_on_the_minimum_corner_descendant() {
  let p = TilePos::new(3, -2, 5, 1);
  assert_eq!(p.down_to(3), p);
  assert_eq!(p.down_to(2), p.down(0));
  assert_eq!(p.down_to(0), TilePos::new(0, -16, 40, 8));
  assert_eq!(p.down_to(0).up_to(3), p);
}

#[test]
fn contains_is_strict_ancestry() {
  let p = TilePos::new(3, 1, 2, 3);
  // Not a descendant of itself.
  assert!(!p.contains(&p));
  // All transitive descendants are contained.
  for i in 0..8 {
    let c = p.down(i);
    assert!(p.contains(&c));
    for j in 0..8 {
      assert!(p.contains(&c.down(j)));
    }
  }
  // A sibling's child is not.
  let sibling = TilePos::new(3, 2, 2, 3);
  assert!(!p.contains(&sibling.down(0)));
  // Coarser positions are never contained.
  assert!(!p.contains(&p.up()));
}

#[test]
fn bb_enumeration_matches_triple_loop_order() {
  let p = TilePos::new(4, 10, -5, 2);
  let (min_off, max_off) = (2u32, 3u32);
  let mut expected = Vec::new();
  for x in p.x - min_off as i32..=p.x + max_off as i32 {
    for y in p.y - min_off as i32..=p.y + max_off as i32 {
      for z in p.z - min_off as i32..=p.z + max_off as i32 {
        expected.push(TilePos::new(p.level, x, y, z));
      }
    }
  }
  let actual: Vec<_> = p.all_positions_in_bb(min_off, max_off).collect();
  assert_eq!(actual, expected);
}

#[test]
fn bb_enumeration_is_restartable() {
  let p = TilePos::new(0, 0, 0, 0);
  let iter = p.all_positions_in_bb(1, 1);
  let first: Vec<_> = iter.clone().collect();
  let second: Vec<_> = iter.collect();
  assert_eq!(first, second);
  assert_eq!(first.len(), 27);
}

#[test]
fn manhattan_distance_same_level() {
  let a = TilePos::new(2, 0, 0, 0);
  let b = TilePos::new(2, 3, -4, 5);
  assert_eq!(a.manhattan_distance(&b), 12);
  assert_eq!(b.manhattan_distance(&a), 12);
}

#[test]
fn manhattan_distance_cross_level_compares_at_coarser_level() {
  let coarse = TilePos::new(1, 0, 0, 0);
  // Finer position inside the coarse cell.
  let fine = TilePos::new(0, 1, 1, 0);
  assert_eq!(coarse.manhattan_distance(&fine), 0);
  // Finer position one coarse cell over in x.
  let far = TilePos::new(0, 2, 0, 0);
  assert_eq!(coarse.manhattan_distance(&far), 2);
}

#[test]
fn ordering_is_level_then_x_z_y() {
  let mut v = vec![
    TilePos::new(0, 1, 0, 0),
    TilePos::new(1, 0, 0, 0),
    TilePos::new(0, 0, 1, 0),
    TilePos::new(0, 0, 0, 1),
    TilePos::new(0, 0, 0, 0),
  ];
  v.sort();
  assert_eq!(
    v,
    vec![
      TilePos::new(0, 0, 0, 0),
      TilePos::new(0, 0, 1, 0), // y sorts after z
      TilePos::new(0, 0, 0, 1),
      TilePos::new(0, 1, 0, 0),
      TilePos::new(1, 0, 0, 0),
    ]
  );
}

#[test]
fn neighbors_are_face_adjacent() {
  let p = TilePos::new(0, 5, 6, 7);
  for n in p.neighbors() {
    assert_eq!(n.level, p.level);
    assert_eq!(p.manhattan_distance(&n), 1);
  }
}

#[test]
fn world_extent_scales_with_level() {
  let p = TilePos::new(2, 1, 0, -1);
  assert_eq!(p.side_length(), 64);
  assert_eq!(p.cell_size(), 4);
  assert_eq!(p.block_min(), [64, 0, -64]);
}

#[test]
fn level_validity_bound() {
  assert!(TilePos::new(0, 0, 0, 0).is_level_valid());
  assert!(TilePos::new(MAX_LEVELS - 1, 0, 0, 0).is_level_valid());
  assert!(!TilePos::new(MAX_LEVELS, 0, 0, 0).is_level_valid());
}
