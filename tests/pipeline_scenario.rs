//! End-to-end occupancy scenarios through the public pipeline API.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use image::RgbImage;

use catstay::{
    AccrualPolicy, BoundingBox, Pipeline, PipelineSettings, RawDetection, Region,
    RegionRegistry, ELSEWHERE, NONE,
};

fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn living_room() -> RegionRegistry {
    RegionRegistry::new(vec![
        Region::new(
            "sofa",
            BoundingBox::new(0.0, 0.0, 900.0, 900.0).unwrap(),
            [0, 0, 255],
        )
        .unwrap(),
        Region::new(
            "table",
            BoundingBox::new(400.0, 150.0, 600.0, 300.0).unwrap(),
            [0, 255, 0],
        )
        .unwrap(),
    ])
    .unwrap()
}

fn pipeline(policy: AccrualPolicy) -> Pipeline {
    let mut settings = PipelineSettings::new(living_room());
    settings.accrual_policy = policy;
    Pipeline::new(settings).expect("pipeline")
}

fn frame() -> RgbImage {
    RgbImage::new(1000, 1000)
}

#[test]
fn sofa_then_table_overlap_scenario() {
    let p = pipeline(AccrualPolicy::FirstDetection);
    let image = frame();
    let on_sofa = || vec![RawDetection::new("cat", 0.9, (100.0, 100.0, 200.0, 200.0))];

    let first = p.process(&image, on_sofa(), at(0)).unwrap();
    assert_eq!(first.dominant_region, "sofa");
    assert_eq!(p.occupancy().unwrap().total("sofa"), Duration::ZERO);

    let second = p.process(&image, on_sofa(), at(10)).unwrap();
    assert_eq!(second.dominant_region, "sofa");
    assert_eq!(
        p.occupancy().unwrap().total("sofa"),
        Duration::from_secs(10)
    );

    // Inside both sofa and table; sofa is registered first and wins.
    let third = p
        .process(
            &image,
            vec![RawDetection::new("cat", 0.9, (450.0, 180.0, 550.0, 250.0))],
            at(15),
        )
        .unwrap();
    let state = p.occupancy().unwrap();
    assert_eq!(state.total("sofa"), Duration::from_secs(15));
    assert_eq!(state.total("table"), Duration::ZERO);
    assert_eq!(third.dominant_region, "sofa");
    assert_eq!(third.occupancy.len(), 1);
    assert_eq!(third.occupancy[0].seconds, 15.0);
}

#[test]
fn no_detections_keeps_prior_dominant() {
    let p = pipeline(AccrualPolicy::FirstDetection);
    let image = frame();

    let empty = p.process(&image, vec![], at(0)).unwrap();
    assert_eq!(empty.dominant_region, NONE);
    assert!(empty.detections.is_empty());

    p.process(
        &image,
        vec![RawDetection::new("cat", 0.9, (950.0, 950.0, 990.0, 990.0))],
        at(5),
    )
    .unwrap();
    p.process(
        &image,
        vec![RawDetection::new("cat", 0.9, (950.0, 950.0, 990.0, 990.0))],
        at(8),
    )
    .unwrap();

    let later = p.process(&image, vec![], at(20)).unwrap();
    assert!(later.detections.is_empty());
    assert_eq!(later.dominant_region, ELSEWHERE);
    // The empty first call still set the baseline at t=0.
    assert_eq!(
        p.occupancy().unwrap().total(ELSEWHERE),
        Duration::from_secs(8)
    );
}

#[test]
fn repeated_timestamp_changes_nothing() {
    let p = pipeline(AccrualPolicy::PerDetection);
    let image = frame();
    let batch = || {
        vec![
            RawDetection::new("cat", 0.9, (100.0, 100.0, 200.0, 200.0)),
            RawDetection::new("cat", 0.8, (950.0, 950.0, 990.0, 990.0)),
        ]
    };

    p.process(&image, batch(), at(0)).unwrap();
    p.process(&image, batch(), at(7)).unwrap();
    let before = p.occupancy().unwrap();

    p.process(&image, batch(), at(7)).unwrap();
    let after = p.occupancy().unwrap();

    assert_eq!(before.total("sofa"), after.total("sofa"));
    assert_eq!(before.total(ELSEWHERE), after.total(ELSEWHERE));
    assert_eq!(after.total_accrued(), Duration::from_secs(14));
}

#[test]
fn dominant_is_stable_under_ties() {
    let p = pipeline(AccrualPolicy::FirstDetection);
    let image = frame();
    let on_sofa = || vec![RawDetection::new("cat", 0.9, (100.0, 100.0, 200.0, 200.0))];
    let elsewhere = || vec![RawDetection::new("cat", 0.9, (950.0, 950.0, 990.0, 990.0))];

    // Four seconds elsewhere first, then four seconds on the sofa.
    p.process(&image, elsewhere(), at(0)).unwrap();
    p.process(&image, elsewhere(), at(4)).unwrap();
    p.process(&image, on_sofa(), at(4)).unwrap();
    p.process(&image, on_sofa(), at(8)).unwrap();

    let state = p.occupancy().unwrap();
    assert_eq!(state.total("sofa"), state.total(ELSEWHERE));
    for _ in 0..3 {
        let report = p.process(&image, vec![], at(8)).unwrap();
        assert_eq!(report.dominant_region, "sofa");
    }
}

#[test]
fn concurrent_callers_never_double_count() {
    let p = Arc::new(pipeline(AccrualPolicy::FirstDetection));
    let image = Arc::new(frame());
    p.process(&image, vec![], at(0)).unwrap();

    // Every caller reports the same capture time: exactly one of them may
    // credit the ten seconds, the rest see a zero interval.
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let p = Arc::clone(&p);
            let image = Arc::clone(&image);
            thread::spawn(move || {
                p.process(
                    &image,
                    vec![RawDetection::new("cat", 0.9, (100.0, 100.0, 200.0, 200.0))],
                    at(10),
                )
                .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let state = p.occupancy().unwrap();
    assert_eq!(state.total("sofa"), Duration::from_secs(10));
    assert_eq!(state.last_update(), Some(at(10)));
}
