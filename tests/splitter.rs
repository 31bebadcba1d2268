use fallstream::split::{dewindow, gather, relative_ranges, split, verify_partition};
use fallstream::table::VideoTable;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn five_fall_videos_hold_out_one() {
    let table = VideoTable::from_counts(&[3, 4, 5, 6, 7, 2, 2, 2], &[5, 3]).unwrap();
    let holdout = split(&table, 0.2, 42).unwrap();
    let test_falls = holdout
        .test_videos
        .iter()
        .filter(|&&v| table.records()[v].class_id == 0)
        .count();
    assert_eq!(test_falls, 1);
    // floor(3 * 0.2) = 0 non-fall videos held out.
    assert_eq!(holdout.test_videos.len(), 1);
}

#[test]
fn split_partitions_samples_over_random_tables() {
    let mut rng = StdRng::seed_from_u64(7);
    for trial in 0..100 {
        let falls = rng.gen_range(1..8);
        let adl = rng.gen_range(1..8);
        let samples: Vec<i64> = (0..falls + adl).map(|_| rng.gen_range(0..12)).collect();
        let table = VideoTable::from_counts(&samples, &[falls, adl]).unwrap();
        let fraction = rng.gen_range(0.0..0.9);

        let holdout = split(&table, fraction, trial).unwrap();
        let mut ranges = holdout.train_ranges(&table);
        ranges.extend(holdout.test_ranges(&table));
        verify_partition(&ranges, table.total_samples()).unwrap();

        for v in &holdout.test_videos {
            assert!(!holdout.train_videos.contains(v), "trial {trial}: video {v} on both sides");
        }
        for class_id in 0..2 {
            let n = table.class_videos(class_id).len();
            let held = holdout
                .test_videos
                .iter()
                .filter(|&&v| table.records()[v].class_id == class_id)
                .count();
            assert_eq!(held, (n as f64 * fraction).floor() as usize);
        }
    }
}

#[test]
fn split_is_reproducible_per_seed() {
    let table = VideoTable::from_counts(&[1; 20], &[10, 10]).unwrap();
    let a = split(&table, 0.3, 11).unwrap();
    let b = split(&table, 0.3, 11).unwrap();
    assert_eq!(a, b);
    assert!(a.test_videos.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn fraction_one_is_rejected() {
    let table = VideoTable::from_counts(&[1, 1], &[1, 1]).unwrap();
    assert!(split(&table, 1.0, 0).is_err());
}

#[test]
fn dewindow_drops_trailing_samples() {
    let ranges = vec![0..12, 12..15, 15..30];
    assert_eq!(dewindow(&ranges, 4), vec![0..8, 12..12, 15..26]);
}

#[test]
fn relative_ranges_follow_gather_order() {
    let y = Array1::from_iter((0..10).map(f64::from));
    let ranges = vec![6..9, 1..3];
    let gathered = gather(y.view(), &ranges);
    assert_eq!(gathered.to_vec(), vec![6.0, 7.0, 8.0, 1.0, 2.0]);
    let local = relative_ranges(&ranges);
    assert_eq!(local, vec![0..3, 3..5]);
    assert_eq!(gather(gathered.view(), &local[1..]).to_vec(), vec![1.0, 2.0]);
}
