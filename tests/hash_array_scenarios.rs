use mercount::{Config, HashArray};
use std::collections::{HashMap, HashSet};
use test_log::test;

/// Builds a key whose natural slot is `pos`
fn key_at(array: &HashArray, pos: u64, noise: u64) -> u64 {
    let lsize = array.size().trailing_zeros();
    let mask = u64::MAX >> (64 - array.key_width());
    array
        .inverse_matrix()
        .multiply(((noise << lsize) | pos) & mask)
}

#[test]
fn hash_array_two_keys_same_position() -> mercount::Result<()> {
    let array = Config::new(512, 16)
        .val_width(4)
        .reprobe_limit(126)
        .seed(42)
        .build()?;

    let a = key_at(&array, 100, 17);
    let b = key_at(&array, 100, 18);
    assert_eq!(array.position(a), array.position(b));

    assert!(array.add(a, 5));
    assert!(array.add(b, 7));

    assert_eq!(Some(5), array.get_val_for_key(a));
    assert_eq!(Some(7), array.get_val_for_key(b));
    assert_eq!(Some(100), array.get_key_id(a));
    assert_ne!(Some(100), array.get_key_id(b));
    assert!(array.get_key_id(b).is_some());

    let entries = array.iterator_all().collect::<HashMap<_, _>>();
    assert_eq!(HashMap::from([(a, 5), (b, 7)]), entries);

    Ok(())
}

#[test]
fn hash_array_four_way_collision() -> mercount::Result<()> {
    let array = Config::new(1_024, 24).seed(7).build()?;

    let keys = (1..=4).map(|noise| key_at(&array, 333, noise)).collect::<Vec<_>>();

    for &key in &keys {
        assert!(array.add(key, 1));
    }

    let ids = keys
        .iter()
        .map(|&key| array.get_key_id(key))
        .collect::<Option<HashSet<_>>>();
    assert_eq!(Some(4), ids.map(|ids| ids.len()));

    for &key in &keys {
        assert_eq!(Some(1), array.get_val_for_key(key));
    }

    let mut entries = array.iterator_all().collect::<Vec<_>>();
    entries.sort_unstable();

    let mut expected = keys.iter().map(|&key| (key, 1)).collect::<Vec<_>>();
    expected.sort_unstable();

    assert_eq!(expected, entries);
    assert_eq!(4, array.filled_slots());

    Ok(())
}

#[test]
fn hash_array_exhaustion() -> mercount::Result<()> {
    let array = Config::new(64, 16).val_width(3).reprobe_limit(7).seed(1).build()?;

    // Sentinels fill every reprobe of base position 10
    for noise in 1..=8 {
        assert!(array.add(key_at(&array, 10, noise), 1));
    }
    assert_eq!(8, array.filled_slots());

    let intruder = key_at(&array, 10, 9);
    assert!(!array.add(intruder, 1));
    assert_eq!(None, array.set(intruder));
    assert_eq!(8, array.filled_slots());
    assert_eq!(None, array.get_key_id(intruder));

    // Sentinels are still updatable
    assert!(array.add(key_at(&array, 10, 8), 2));
    assert_eq!(Some(3), array.get_val_for_key(key_at(&array, 10, 8)));

    Ok(())
}

#[test]
fn hash_array_overflow_without_room_leaves_array_unchanged() -> mercount::Result<()> {
    // 2 bit values, so a count above 3 needs a continuation slot
    let array = Config::new(16, 8).val_width(2).reprobe_limit(3).seed(1).build()?;

    // Slots 3, 5 and 8 are where slot 2 looks for a continuation
    for pos in [3, 5, 8] {
        assert!(array.add(key_at(&array, pos, 1), 1));
    }
    assert_eq!(3, array.filled_slots());

    let key = key_at(&array, 2, 1);
    assert!(!array.add(key, 100));
    assert_eq!(3, array.filled_slots());
    assert_eq!(None, array.get_key_id(key));
    assert_eq!(3, array.iterator_all().count());
    assert!(array.iterator_all().all(|(_, value)| value == 1));

    // Fits without a continuation, but cannot grow past the value field
    assert!(array.add(key, 3));
    assert!(!array.add(key, 100));
    assert_eq!(Some(3), array.get_val_for_key(key));
    assert_eq!(4, array.filled_slots());

    Ok(())
}

#[test]
fn hash_array_round_trip_recoverability() -> mercount::Result<()> {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    for (size, key_width) in [(1 << 12, 22), (1 << 10, 64), (1 << 8, 8)] {
        let array = Config::new(size, key_width)
            .val_width(2)
            .seed(size as u64)
            .build()?;
        let mask = u64::MAX >> (64 - key_width);

        let keys = (0..size / 2)
            .map(|_| rng.random::<u64>() & mask)
            .collect::<HashSet<_>>();

        for &key in &keys {
            assert!(array.add(key, 3));
        }

        for &key in &keys {
            let id = array.get_key_id(key);
            assert!(id.is_some());
            assert_eq!(
                Some((key, 3)),
                id.and_then(|id| array.get_key_val_at_id(id)),
            );
        }

        let recovered = array.iterator_all().map(|(key, _)| key).collect::<HashSet<_>>();
        assert_eq!(keys, recovered);
    }

    Ok(())
}

#[test]
fn hash_array_set_and_reuse_after_clear() -> mercount::Result<()> {
    let mut array = Config::new(256, 20).val_width(1).seed(3).build()?;

    for key in 0..100 {
        assert_eq!(Some(true), array.set(key).map(|(is_new, _)| is_new));
    }
    for key in 0..100 {
        assert_eq!(Some(false), array.set(key).map(|(is_new, _)| is_new));
        assert_eq!(Some(1), array.get_val_for_key(key));
    }

    let matrix = array.matrix().clone();
    array.clear();

    assert_eq!(&matrix, array.matrix());
    assert_eq!(0, array.iterator_all().count());

    for key in 50..150 {
        assert_eq!(Some(true), array.set(key).map(|(is_new, _)| is_new));
    }
    assert_eq!(None, array.get_key_id(10));
    assert_eq!(100, array.iterator_all().count());

    Ok(())
}

#[test]
fn hash_array_shared_matrix() -> mercount::Result<()> {
    let first = Config::new(256, 16).seed(9).build()?;

    let second = Config::new(1_024, 16)
        .matrices(first.matrix().clone(), first.inverse_matrix().clone())
        .build()?;

    for key in [0, 1, 0xABCD, 0xFFFF] {
        assert_eq!(first.position(key), second.position(key) & 255);
    }

    Ok(())
}
