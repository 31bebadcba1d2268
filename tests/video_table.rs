use fallstream::error::PipelineError;
use fallstream::table::{VideoRecord, VideoTable};

#[test]
fn offsets_and_ranges_follow_counts() {
    let table = VideoTable::from_counts(&[4, 0, 3, 5], &[3, 1]).unwrap();
    assert_eq!(table.n_videos(), 4);
    assert_eq!(table.n_classes(), 2);
    assert_eq!(table.total_samples(), 12);
    assert_eq!(table.offsets(), vec![0, 4, 4, 7, 12]);
    assert_eq!(table.sample_range(2), 4..7);
    assert_eq!(table.class_videos(0), 0..3);
    assert_eq!(table.class_videos(1), 3..4);
    assert_eq!(table.class_video_counts(), vec![3, 1]);
    assert_eq!(table.samples_array().unwrap(), vec![4, 0, 3, 5]);
    assert_eq!(table.num_array().unwrap(), vec![3, 1]);

    let last = table.records()[3];
    assert_eq!((last.class_id, last.video_id, last.stack_count), (1, 0, 5));
}

#[test]
fn declared_videos_must_match_sample_rows() {
    let err = VideoTable::from_counts(&[1, 2, 3], &[1, 1]).unwrap_err();
    assert!(matches!(err, PipelineError::LengthMismatch { expected: 2, actual: 3, .. }));
}

#[test]
fn negative_counts_are_rejected() {
    assert!(matches!(
        VideoTable::from_counts(&[1, -2], &[1, 1]).unwrap_err(),
        PipelineError::Table(_)
    ));
}

#[test]
fn records_must_be_class_ordered() {
    let r = |class_id, video_id| VideoRecord {
        class_id,
        video_id,
        stack_count: 1,
    };
    assert!(VideoTable::from_records(vec![r(0, 0), r(0, 1), r(1, 0)], 2).is_ok());
    assert!(VideoTable::from_records(vec![r(1, 0), r(0, 0)], 2).is_err());
    assert!(VideoTable::from_records(vec![r(0, 1)], 2).is_err());
    assert!(VideoTable::from_records(vec![r(2, 0)], 2).is_err());
}

#[test]
fn counts_beyond_i32_are_not_truncated() {
    let big = i32::MAX as usize + 1;
    let table = VideoTable::from_records(
        vec![VideoRecord {
            class_id: 0,
            video_id: 0,
            stack_count: big,
        }],
        1,
    )
    .unwrap();
    assert!(matches!(table.samples_array().unwrap_err(), PipelineError::Table(_)));
    assert_eq!(table.num_array().unwrap(), vec![1]);
}
