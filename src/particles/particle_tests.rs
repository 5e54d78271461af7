use crate::particles::*;

fn two_linked_pairs() -> (Vec<Part>, Vec<GPart>) {
    let mut parts = vec![
        Part::new([0.1, 0.1, 0.1], [0.0; 3], 0.05, 1.0),
        Part::new([0.9, 0.9, 0.9], [0.0; 3], 0.05, 1.0),
    ];
    let mut gparts = vec![
        GPart::new_dark_matter([0.1, 0.1, 0.1], [0.0; 3], 1.0, 0),
        GPart::new_dark_matter([0.9, 0.9, 0.9], [0.0; 3], 1.0, 0),
    ];
    parts[0].gpart = 0;
    parts[1].gpart = 1;
    gparts[0].link = GPartLink::Gas(0);
    gparts[1].link = GPartLink::Gas(1);
    (parts, gparts)
}

#[test]
fn test_relink_gparts_after_part_swap() {
    let (mut parts, mut gparts) = two_linked_pairs();

    // A subdivision swaps the two gas particles in place.
    parts.swap(0, 1);
    relink_gparts_to_parts(&parts, 0, &mut gparts);

    assert_eq!(gparts[parts[0].gpart as usize].link, GPartLink::Gas(0));
    assert_eq!(gparts[parts[1].gpart as usize].link, GPartLink::Gas(1));
}

#[test]
fn test_relink_parts_after_gpart_swap() {
    let (mut parts, mut gparts) = two_linked_pairs();

    gparts.swap(0, 1);
    relink_parts_to_gparts(&gparts, 0, &mut parts);

    for (k, gp) in gparts.iter().enumerate() {
        let GPartLink::Gas(i) = gp.link else { panic!("link lost") };
        assert_eq!(parts[i].gpart as usize, k);
    }
}

#[test]
fn test_relink_respects_window_offset() {
    let (mut parts, mut gparts) = two_linked_pairs();

    // Pretend the window starts at index 4 of the space array: links must
    // carry the offset, not the window-local index.
    parts.swap(0, 1);
    relink_gparts_to_parts(&parts, 4, &mut gparts);

    assert_eq!(gparts[0].link, GPartLink::Gas(5));
    assert_eq!(gparts[1].link, GPartLink::Gas(4));
}

#[test]
fn test_star_links_round_trip() {
    let mut sparts = vec![SPart::new([0.5, 0.5, 0.5], [0.0; 3], 2.0)];
    let mut gparts = vec![GPart::new_dark_matter([0.5, 0.5, 0.5], [0.0; 3], 2.0, 0)];
    sparts[0].gpart = 0;
    gparts[0].link = GPartLink::Star(0);

    relink_gparts_to_sparts(&sparts, 0, &mut gparts);
    relink_sparts_to_gparts(&gparts, 0, &mut sparts);

    assert_eq!(gparts[0].link, GPartLink::Star(0));
    assert_eq!(sparts[0].gpart, 0);
}

#[test]
fn test_dark_matter_is_never_relinked() {
    let parts = vec![Part::new([0.0; 3], [0.0; 3], 0.1, 1.0)];
    let mut gparts = vec![GPart::new_dark_matter([0.2; 3], [0.0; 3], 1.0, 42)];

    relink_gparts_to_parts(&parts, 0, &mut gparts);

    assert_eq!(gparts[0].link, GPartLink::DarkMatter(42));
}
