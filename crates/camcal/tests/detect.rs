mod common;

use camcal::aruco::Dictionary;
use camcal::charuco::render::render_charuco_flat;
use camcal::charuco::CharucoBoard;
use camcal::core::{DictionaryName, PatternConfig};
use camcal::{CalibrationError, EngineConfig, PatternDetector};
use common::*;

fn to_image(img: camcal::core::GrayImage) -> image::GrayImage {
    image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data).unwrap()
}

#[test]
fn charuco_board_from_installed_dictionary() {
    let dir = tempfile::tempdir().unwrap();
    let dict = Dictionary::generate(DictionaryName::Dict4x4_50, 20, 4, 11).unwrap();
    dict.write_json(&Dictionary::table_path(dir.path(), DictionaryName::Dict4x4_50))
        .unwrap();
    let config = EngineConfig {
        dictionary_dir: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };

    let pattern = PatternConfig::charuco(7, 5, 0.04, 0.03, DictionaryName::Dict4x4_50);
    let board = CharucoBoard::new(&pattern, &dict).unwrap();
    let img = to_image(render_charuco_flat(&board, &dict, 64, 48).unwrap());

    let detector = PatternDetector::new(&pattern, &config).unwrap();
    let det = detector.detect(&img);
    assert!(det.found);
    assert_eq!(det.points.len(), pattern.max_corner_count());
    assert_eq!(det.quality, 1.0);
    assert!(det.should_capture);
    assert!(!det.marker_outlines.is_empty());
    for (id, obj, px) in det.points.iter() {
        assert_eq!(*obj, pattern.corner_object_point(id));
        let (i, j) = ((id % 6 + 1) as f64, (id / 6 + 1) as f64);
        assert!((px.x - (48.0 + 64.0 * i)).abs() < 1.0, "corner {id} at {px}");
        assert!((px.y - (48.0 + 64.0 * j)).abs() < 1.0, "corner {id} at {px}");
    }
}

#[test]
fn missing_dictionary_table_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        dictionary_dir: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let pattern = PatternConfig::charuco(7, 5, 0.04, 0.03, DictionaryName::Dict6x6_250);
    let err = PatternDetector::new(&pattern, &config).err().unwrap();
    assert!(matches!(err, CalibrationError::InvalidInput(_)), "{err}");
}

#[test]
fn checkerboard_render_is_found_and_sharp() {
    let pose = &poses(1, 0.0)[0];
    let img = render(&camera_matrix(), pose);
    let pattern = PatternConfig::checkerboard(COLS, ROWS, SQUARE);
    let det = PatternDetector::new(&pattern, &EngineConfig::default())
        .unwrap()
        .detect(&img);
    assert!(det.found);
    assert_eq!(det.points.len(), (COLS * ROWS) as usize);
    assert!(det.quality > 0.0 && det.quality <= 1.0);
    let mut ids = det.points.ids().to_vec();
    ids.sort_unstable();
    assert_eq!(ids, (0..COLS * ROWS).collect::<Vec<_>>());
}

#[test]
fn charuco_board_from_compiled_in_dictionary() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        dictionary_dir: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let pattern = PatternConfig::charuco(7, 5, 0.04, 0.03, DictionaryName::ArucoOriginal);
    let dict = Dictionary::resolve(dir.path(), DictionaryName::ArucoOriginal).unwrap();
    let board = CharucoBoard::new(&pattern, &dict).unwrap();
    let img = to_image(render_charuco_flat(&board, &dict, 64, 48).unwrap());

    let det = PatternDetector::new(&pattern, &config).unwrap().detect(&img);
    assert!(det.found);
    assert_eq!(det.points.len(), pattern.max_corner_count());
}
