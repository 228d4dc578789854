use camcal_aruco::Dictionary;
use camcal_charuco::render::render_charuco;
use camcal_charuco::{
    CharucoBoard, CharucoDetectError, CharucoDetection, CharucoDetector, CharucoDetectorParams,
};
use camcal_core::{Corner, DictionaryName, GrayImage, GrayImageView, Homography, PatternConfig};
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use nalgebra::Matrix3;

const COLS: u32 = 7;
const ROWS: u32 = 5;
const PX: f64 = 64.0;
const MARGIN: f64 = 48.0;

fn setup() -> (CharucoBoard, Dictionary) {
    let dict = Dictionary::generate(DictionaryName::Dict4x4_50, 20, 4, 11).expect("dictionary");
    let pattern = PatternConfig::charuco(COLS, ROWS, 0.04, 0.03, DictionaryName::Dict4x4_50);
    let board = CharucoBoard::new(&pattern, &dict).expect("board");
    (board, dict)
}

fn detect_corners(img: &GrayImage) -> Vec<Corner> {
    let buf = image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
        .expect("buffer");
    let mut chess_cfg = ChessConfig::single_scale();
    chess_cfg.params.threshold_rel = 0.2;
    chess_cfg.params.nms_radius = 2;
    find_chess_corners_image(&buf, &chess_cfg)
        .iter()
        .map(|c: &CornerDescriptor| Corner::new(c.x, c.y, c.response))
        .collect()
}

fn frame_size() -> (usize, usize) {
    let w = (COLS as f64 * PX + 2.0 * MARGIN) as usize;
    let h = (ROWS as f64 * PX + 2.0 * MARGIN) as usize;
    (w, h)
}

type Outcome = (CharucoBoard, Result<CharucoDetection, CharucoDetectError>, Homography);

fn run(img_from_board: Matrix3<f64>) -> Outcome {
    let (board, dict) = setup();
    let (w, h) = frame_size();
    let hom = Homography::new(img_from_board);
    let img = render_charuco(&board, &dict, w, h, &hom).expect("render");
    let corners = detect_corners(&img);
    let detector = CharucoDetector::new(board.clone(), &dict, CharucoDetectorParams::default());
    let res = detector.detect(&img.view(), &corners);
    (board, res, hom)
}

fn assert_ids_match_geometry(board: &CharucoBoard, det: &CharucoDetection, hom: &Homography) {
    let (cols, _) = board.inner_corners();
    for c in &det.corners {
        let (bx, by) = ((c.id % cols + 1) as f32, (c.id / cols + 1) as f32);
        let expected = hom.apply(nalgebra::Point2::new(bx, by));
        let err = (expected - c.position).norm();
        assert!(err < 1.5, "corner {} off by {err:.2}px", c.id);
    }
}

#[test]
fn detects_upright_board_with_all_ids() {
    let (board, res, hom) = run(Matrix3::new(PX, 0.0, MARGIN, 0.0, PX, MARGIN, 0.0, 0.0, 1.0));
    let det = res.expect("detection");
    assert_eq!(det.corners.len(), 24);
    assert_eq!(det.ids(), (0..24).collect::<Vec<u32>>());
    assert!(det.markers.len() >= 2);
    assert_ids_match_geometry(&board, &det, &hom);
    assert_eq!(det.object_points(&board).len(), det.corners.len());
}

#[test]
fn ids_follow_the_board_when_rotated_half_turn() {
    let (w, h) = frame_size();
    let (board, res, hom) = run(Matrix3::new(
        -PX,
        0.0,
        w as f64 - MARGIN,
        0.0,
        -PX,
        h as f64 - MARGIN,
        0.0,
        0.0,
        1.0,
    ));
    let det = res.expect("detection");
    assert_eq!(det.corners.len(), 24);
    assert_ids_match_geometry(&board, &det, &hom);
}

#[test]
fn blank_image_is_not_a_board() {
    let (board, dict) = setup();
    let img = GrayImage::filled(320, 240, 200);
    let view = GrayImageView {
        width: img.width,
        height: img.height,
        data: &img.data,
    };
    let detector = CharucoDetector::new(board, &dict, CharucoDetectorParams::default());
    assert!(matches!(
        detector.detect(&view, &[]),
        Err(CharucoDetectError::NoLattice)
    ));
}
