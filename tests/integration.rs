use std::io::Cursor;

use image::{GrayImage, Luma};
use threadforge::config::PartsConfig;
use threadforge::geom::{GeomMesh, Point3, box_from_bounds};
use threadforge::mesh_io::{read_stl, write_stl_binary};
use threadforge::parts::snack_box::{BottomGrip, CapGrip, LabelParams};
use threadforge::parts::{PartKind, bolt, eye_piece, keychain, snack_box};
use threadforge::relief::{ReliefParams, StencilParams, image_to_relief};
use threadforge::text::{TextError, TextRenderer};
use threadforge::thread::create_threaded_cylinder;

const EPS: f64 = 1e-6;

/// Stands in for OpenSCAD: one box per line of text, `0.6 * size` wide per
/// character and `size` tall, sitting on `z = height / 2`.
struct BlockRenderer;

impl TextRenderer for BlockRenderer {
    fn render_text_to_mesh(&self, text: &str, size: f64, height: f64) -> Result<GeomMesh, TextError> {
        if text.trim().is_empty() {
            return Err(TextError::EmptyText);
        }
        let half_w = 0.3 * size * text.chars().count() as f64;
        box_from_bounds(
            Point3::new(-half_w, -size / 2.0, height / 2.0),
            Point3::new(half_w, size / 2.0, 1.5 * height),
        )
        .map_err(|e| TextError::NoGeometry(e.to_string()))
    }
}

fn quick_config() -> PartsConfig {
    let mut config = PartsConfig::default();
    config.set_samples_per_turn(24);
    config.snack_box.sections = 48;
    config.eye_piece.sections = 48;
    config.snack_box.label = Some(LabelParams {
        text: "AB".to_string(),
        ..LabelParams::default()
    });
    config.snack_box.bottom_grip = Some(BottomGrip {
        layers: 2,
        count: 8,
        ..BottomGrip::default()
    });
    config.snack_box.cap_grip = Some(CapGrip {
        count: 8,
        ..CapGrip::default()
    });
    config.keychain.text = "Han".to_string();
    config
}

fn assert_closed(name: &str, mesh: &GeomMesh) {
    assert!(!mesh.is_empty(), "{name} is empty");
    assert!(mesh.is_watertight(), "{name}: {}", mesh.diagnostics().summary());
    assert!(mesh.volume() > 0.0, "{name} is inside out");
}

#[test]
fn threaded_cylinder_survives_stl_round_trip() {
    let mesh = create_threaded_cylinder(3.0, 6.0, 1.0, 2.0);
    let mut buf = Vec::new();
    write_stl_binary(&mesh, &mut buf).expect("write");
    assert_eq!(buf.len(), 84 + 50 * mesh.triangle_count());

    let loaded = read_stl(&mut Cursor::new(buf)).expect("read");
    assert_eq!(loaded.triangle_count(), mesh.triangle_count());
    // Positions pass through f32.
    assert!((loaded.volume() - mesh.volume()).abs() < 1e-3 * mesh.volume());
}

#[test]
fn bolt_and_nut_are_closed() {
    let config = quick_config();
    let set = bolt::build(&config.bolt).expect("bolt set");
    assert_closed("bolt", &set.bolt);
    assert_closed("thin head bolt", &set.thin_head_bolt);
    assert_closed("nut", &set.nut);

    let b = set.bolt.bounds().expect("bounds");
    assert!((b.min.z + config.bolt.head_thickness).abs() < EPS);
    assert!((b.max.z - config.bolt.shaft_length).abs() < EPS);

    let thin = set.thin_head_bolt.bounds().expect("bounds");
    assert!((thin.min.z + config.bolt.thin_head_thickness).abs() < EPS);
    assert!(set.thin_head_bolt.volume() < set.bolt.volume());

    let n = set.nut.bounds().expect("bounds");
    assert!(n.min.z.abs() < EPS);
    assert!((n.max.z - config.bolt.nut_thickness).abs() < EPS);
}

#[test]
fn eye_piece_rings_are_closed() {
    let config = quick_config();
    let rings = eye_piece::build(&config.eye_piece).expect("eye piece");
    assert_closed("inner ring", &rings.inner);
    assert_closed("outer ring", &rings.outer);
    assert!(rings.outer.max_radial_distance() <= config.eye_piece.outer_radius() + EPS);
}

#[test]
fn keychain_puts_text_on_plate_and_ring_on_the_left() {
    let config = quick_config();
    let params = &config.keychain;
    let tag = keychain::build(params, &BlockRenderer).expect("keychain");
    assert_closed("keychain", &tag);

    let b = tag.bounds().expect("bounds");
    assert!(b.min.z.abs() < EPS);
    assert!((b.max.z - (params.plate_thickness + params.text_height)).abs() < EPS);

    let text_width = 0.6 * params.font_size * 3.0;
    let plate_width = text_width + 8.0 * params.border;
    let expected_min_x = -plate_width / 2.0 - 2.0 * params.ring_radius - params.ring_tube_radius;
    assert!((b.min.x - expected_min_x).abs() < EPS, "min x {}", b.min.x);
    assert!((b.max.x - plate_width / 2.0).abs() < EPS);
}

#[test]
fn keychain_rejects_ring_thicker_than_plate() {
    let mut config = quick_config();
    config.keychain.ring_tube_radius = 1.5;
    assert!(keychain::build(&config.keychain, &BlockRenderer).is_err());
}

#[test]
fn snack_box_halves_are_closed() {
    let config = quick_config();
    let params = &config.snack_box;
    let jar = snack_box::build(params, &BlockRenderer).expect("snack box");
    assert_closed("bottom", &jar.bottom);
    assert_closed("cap", &jar.cap);

    let bottom = jar.bottom.bounds().expect("bounds");
    assert!(bottom.min.z.abs() < EPS);
    assert!((bottom.max.z - params.bottom_height()).abs() < EPS);

    let cap = jar.cap.bounds().expect("bounds");
    assert!(cap.min.z.abs() < EPS);
    assert!((cap.max.z - (params.wall_thickness + params.thread_height)).abs() < EPS);

    let plain = snack_box::plain_cap(params).expect("plain cap");
    assert!(jar.cap.volume() < plain.volume());
}

#[test]
fn config_driven_build_names_every_output() {
    let config = quick_config();
    let names: Vec<String> = PartKind::Bolt
        .build(&config, &BlockRenderer)
        .expect("bolt")
        .into_iter()
        .map(|part| part.name)
        .collect();
    assert_eq!(names, ["bolt", "bolt_thin_head", "nut"]);

    let eye: Vec<String> = PartKind::from_name("eye_piece")
        .expect("kind")
        .build(&config, &BlockRenderer)
        .expect("eye piece")
        .into_iter()
        .map(|part| part.name)
        .collect();
    assert_eq!(eye, ["eye_piece_inner", "eye_piece_outer"]);

    let mut small = quick_config();
    small.fabric.tiles = 2;
    small.fabric.sections = 16;
    let fabric: Vec<String> = PartKind::Fabric
        .build(&small, &BlockRenderer)
        .expect("fabric")
        .into_iter()
        .map(|part| part.name)
        .collect();
    assert_eq!(fabric, ["fabric_piece", "fabric_rod", "fabric_sheet"]);
}

#[test]
fn config_file_overrides_reach_the_parts() {
    let json = r#"{
        "bolt": { "shaft_length": 10.0, "samples_per_turn": 24 },
        "keychain": { "text": "R2" }
    }"#;
    let config = PartsConfig::from_json_str(json).expect("config");
    let bolt = bolt::bolt(&config.bolt, config.bolt.head_thickness).expect("bolt");
    let b = bolt.bounds().expect("bounds");
    assert!((b.max.z - 10.0).abs() < EPS);
    assert_eq!(config.keychain.text, "R2");
    assert!(PartKind::Keychain.needs_text(&config));
    assert!(!PartKind::Bolt.needs_text(&config));
}

fn assert_default_build(kind: PartKind) {
    let config = PartsConfig::default();
    let parts = kind.build(&config, &BlockRenderer).expect("default build");
    assert!(!parts.is_empty(), "{kind} built nothing");
    for part in &parts {
        assert_closed(&part.name, &part.mesh);
    }
}

#[test]
fn default_snack_box_is_closed() {
    assert_default_build(PartKind::SnackBox);
}

#[test]
fn default_bolt_set_is_closed() {
    assert_default_build(PartKind::Bolt);
}

#[test]
fn default_eye_piece_is_closed() {
    assert_default_build(PartKind::EyePiece);
}

#[test]
fn default_phone_mount_is_closed() {
    assert_default_build(PartKind::PhoneMount);
}

#[test]
fn default_keychain_is_closed() {
    assert_default_build(PartKind::Keychain);
}

#[test]
fn default_fabric_is_closed() {
    assert_default_build(PartKind::Fabric);
}

#[test]
fn default_relief_is_closed() {
    let config = PartsConfig::default();
    let picture = GrayImage::from_fn(120, 80, |x, y| {
        let inside = (f64::from(x) - 60.0).hypot(f64::from(y) - 40.0) < 30.0 && (x / 10 + y / 10) % 2 == 0;
        Luma([if inside { 20 } else { 235 }])
    });
    let relief = image_to_relief(&picture, &config.relief).expect("relief");
    assert_closed("relief", &relief.relief);
    let board = relief.board.as_ref().expect("board");
    assert_closed("board", board);
    let b = relief.relief.bounds().expect("bounds");
    assert!(b.max.x - b.min.x <= config.relief.length + EPS);

    let stencil = ReliefParams {
        stencil: Some(StencilParams::default()),
        ..config.relief.clone()
    };
    let sheet = image_to_relief(&picture, &stencil).expect("stencil");
    assert_closed("stencil", &sheet.relief);
}
