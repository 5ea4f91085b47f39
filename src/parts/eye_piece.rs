//! Binocular eye-piece adapter: a male threaded sleeve that slips over the
//! eye piece and a female ring that screws onto it.
//!
//! The female ring also anchors an iPhone 13 mount. A plate the size of the
//! phone back holds the ring over the main camera; a threaded knob screws
//! into a socket in the plate to clamp it, and a small camera cover fits the
//! lens bump on its own.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::{NamedMesh, OVERLAP, PartError, check_positive, gather, subtract, union, z_cylinder};
use crate::geom::{GeomMesh, Vec3, rounded_rectangle};
use crate::thread::{
    DEFAULT_SAMPLES_PER_TURN, FitClearance, ThreadSpec, create_thread_cutout, create_threaded_cylinder_with, flip_z,
};

const INCH: f64 = 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyePieceParams {
    /// Bore radius; the default fits a 5.25 inch eye-piece circumference.
    pub inner_radius: f64,
    pub height: f64,
    pub material_thickness: f64,
    pub thread_thickness: f64,
    pub thread_pitch: f64,
    pub fit: FitClearance,
    pub samples_per_turn: usize,
    pub sections: usize,
}

impl Default for EyePieceParams {
    fn default() -> Self {
        Self {
            inner_radius: 5.25 * INCH / PI / 2.0,
            height: 1.125 * INCH,
            material_thickness: 3.0,
            thread_thickness: 1.5,
            thread_pitch: 2.0,
            fit: FitClearance::Standard,
            samples_per_turn: DEFAULT_SAMPLES_PER_TURN,
            sections: 128,
        }
    }
}

impl EyePieceParams {
    #[must_use]
    pub fn male_thread_radius(&self) -> f64 {
        self.inner_radius + self.material_thickness
    }

    #[must_use]
    pub fn outer_radius(&self) -> f64 {
        self.male_thread_radius() + self.material_thickness + self.thread_thickness
    }

    fn thread(&self, height: f64) -> ThreadSpec {
        ThreadSpec {
            samples_per_turn: self.samples_per_turn,
            ..ThreadSpec::new(self.male_thread_radius(), height, self.thread_thickness, self.thread_pitch)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EyePieces {
    pub inner: GeomMesh,
    pub outer: GeomMesh,
}

impl EyePieces {
    #[must_use]
    pub fn into_named(self) -> Vec<NamedMesh> {
        vec![
            NamedMesh::new("eye_piece_inner", self.inner),
            NamedMesh::new("eye_piece_outer", self.outer),
        ]
    }
}

pub fn build(params: &EyePieceParams) -> Result<EyePieces, PartError> {
    check_positive("inner radius", params.inner_radius)?;
    check_positive("height", params.height)?;
    check_positive("material thickness", params.material_thickness)?;
    Ok(EyePieces {
        inner: inner_ring(params)?,
        outer: outer_ring(params)?,
    })
}

/// Male threaded sleeve over the full height, bored to `inner_radius`.
pub fn inner_ring(params: &EyePieceParams) -> Result<GeomMesh, PartError> {
    let sleeve = create_threaded_cylinder_with(&params.thread(params.height))?;
    let bore = z_cylinder(params.inner_radius, -OVERLAP, params.height + OVERLAP, params.sections)?;
    subtract(&sleeve.mesh, &bore)
}

/// Female ring of half the sleeve height.
pub fn outer_ring(params: &EyePieceParams) -> Result<GeomMesh, PartError> {
    let height = params.height / 2.0;
    let ring = z_cylinder(params.outer_radius(), 0.0, height, params.sections)?;
    let cutout = create_thread_cutout(&params.thread(height), params.fit)?;
    subtract(&ring, &cutout.mesh)
}

/// Plate and knob dimensions of the iPhone 13 mount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneMountParams {
    /// Plate thickness.
    pub depth: f64,
    pub knob_radius: f64,
    /// Threaded length of the knob above the plate.
    pub knob_height: f64,
    pub thread_thickness: f64,
    pub thread_pitch: f64,
    /// Radial depth of the socket thread cut into the plate.
    pub socket_thread_thickness: f64,
    pub fit: FitClearance,
    pub samples_per_turn: usize,
    pub sections: usize,
    pub corner_segments: usize,
}

impl Default for PhoneMountParams {
    fn default() -> Self {
        Self {
            depth: 2.0,
            knob_radius: 25.0,
            knob_height: 3.5,
            thread_thickness: 1.5,
            thread_pitch: 2.0,
            socket_thread_thickness: 2.0,
            fit: FitClearance::Snug,
            samples_per_turn: DEFAULT_SAMPLES_PER_TURN,
            sections: 64,
            corner_segments: 8,
        }
    }
}

const PLATE_LENGTH: f64 = 5.5 * INCH;
const PLATE_WIDTH: f64 = 3.0 * INCH;
const PLATE_CORNER: f64 = 1.25 * INCH / 4.0;
const CAMERA_RADIUS: f64 = 0.25 * INCH;
const CAMERA_PIECE_SIDE: f64 = 1.25 * INCH;

impl PhoneMountParams {
    /// Main camera centre on the plate.
    #[must_use]
    pub fn camera_position(&self) -> Vec3 {
        Vec3::new(-2.5 * INCH + 1.25 * INCH / 2.0 + 0.25 * INCH, 1.25 * INCH / 2.0 - 0.25 * INCH, 0.0)
    }

    /// Centre of the knob socket on the plate.
    #[must_use]
    pub fn socket_position(&self) -> Vec3 {
        Vec3::new((1.0 + 3.0 / 32.0) * INCH, -3.0 / 32.0 * INCH, 0.0)
    }

    fn knob_thread(&self) -> ThreadSpec {
        ThreadSpec {
            samples_per_turn: self.samples_per_turn,
            ..ThreadSpec::new(
                self.knob_radius,
                self.knob_height + self.depth,
                self.thread_thickness,
                self.thread_pitch,
            )
        }
    }

    fn socket_thread(&self) -> ThreadSpec {
        ThreadSpec {
            samples_per_turn: self.samples_per_turn,
            ..ThreadSpec::new(self.knob_radius, self.knob_height, self.socket_thread_thickness, self.thread_pitch)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhoneMount {
    /// Plate with the eye-piece ring over the camera and the knob socket.
    pub attachment: GeomMesh,
    pub knob: GeomMesh,
    /// Plate and ring alone, centred on the camera.
    pub base: GeomMesh,
    pub camera_piece: GeomMesh,
}

impl PhoneMount {
    #[must_use]
    pub fn into_named(self) -> Vec<NamedMesh> {
        vec![
            NamedMesh::new("phone_mount_attachment", self.attachment),
            NamedMesh::new("phone_mount_knob", self.knob),
            NamedMesh::new("phone_mount_base", self.base),
            NamedMesh::new("phone_camera_piece", self.camera_piece),
        ]
    }
}

pub fn build_phone_mount(params: &PhoneMountParams, eye: &EyePieceParams) -> Result<PhoneMount, PartError> {
    let ring = outer_ring(eye)?;
    let (attachment, knob) = create_iphone13_attachment(params, &ring)?;
    Ok(PhoneMount {
        attachment,
        knob,
        base: create_iphone13_base_piece(params, &ring)?,
        camera_piece: create_iphone13_camera_piece(params)?,
    })
}

/// Phone-sized plate with the camera hole cut and `eye_piece_outer` hung
/// under the camera, sunk slightly into the plate.
fn camera_plate(params: &PhoneMountParams, eye_piece_outer: &GeomMesh) -> Result<GeomMesh, PartError> {
    let depth = check_positive("plate depth", params.depth)?;
    let camera = params.camera_position();
    let plate = rounded_rectangle(PLATE_LENGTH, PLATE_WIDTH, PLATE_CORNER, depth, params.corner_segments)?;
    let hole = z_cylinder(CAMERA_RADIUS, -OVERLAP, depth + OVERLAP, params.sections)?.translated(camera);
    let plate = subtract(&plate, &hole)?;

    let bounds = eye_piece_outer.bounds().ok_or(PartError::InvalidParameter {
        name: "eye-piece ring height",
        value: 0.0,
    })?;
    let sink = OVERLAP.min(depth / 2.0);
    let ring = eye_piece_outer.translated(camera.add(Vec3::new(0.0, 0.0, sink - bounds.max.z)));
    union(&plate, &ring)
}

/// The plate with a threaded socket and the knob that screws into it.
///
/// Both threads are mirrored with [`flip_z`] so they mate.
pub fn create_iphone13_attachment(
    params: &PhoneMountParams,
    eye_piece_outer: &GeomMesh,
) -> Result<(GeomMesh, GeomMesh), PartError> {
    let plate = camera_plate(params, eye_piece_outer)?;
    let socket = create_thread_cutout(&params.socket_thread(), params.fit)?;
    let socket = flip_z(&socket.mesh).translated(params.socket_position());
    let attachment = subtract(&plate, &socket)?;

    let knob_height = params.knob_height + params.depth;
    let thread = flip_z(&create_threaded_cylinder_with(&params.knob_thread())?.mesh);
    let handle = z_cylinder(
        params.knob_radius / 3.0,
        knob_height / 2.0,
        knob_height / 2.0 + 10.0,
        params.sections,
    )?;
    let knob = union(&thread, &handle)?;
    Ok((attachment, knob))
}

/// Plate and ring without the socket, moved so the camera sits on the
/// origin.
pub fn create_iphone13_base_piece(params: &PhoneMountParams, eye_piece_outer: &GeomMesh) -> Result<GeomMesh, PartError> {
    let plate = camera_plate(params, eye_piece_outer)?;
    Ok(plate.translated(params.camera_position().neg()))
}

/// Rounded square cover for the camera bump with a hole over each lens.
pub fn create_iphone13_camera_piece(params: &PhoneMountParams) -> Result<GeomMesh, PartError> {
    let depth = check_positive("plate depth", params.depth)?;
    let plate = rounded_rectangle(
        CAMERA_PIECE_SIDE,
        CAMERA_PIECE_SIDE,
        CAMERA_PIECE_SIDE / 4.0,
        depth,
        params.corner_segments,
    )?;
    let offset = 0.25 * INCH;
    let lens = z_cylinder(CAMERA_RADIUS, -OVERLAP, depth + OVERLAP, params.sections)?;
    let lenses = gather([
        lens.translated(Vec3::new(offset, -offset, 0.0)),
        lens.translated(Vec3::new(-offset, offset, 0.0)),
    ]);
    subtract(&plate, &lenses)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn quick() -> (PhoneMountParams, EyePieceParams) {
        let mount = PhoneMountParams {
            samples_per_turn: 24,
            sections: 32,
            corner_segments: 4,
            ..PhoneMountParams::default()
        };
        let eye = EyePieceParams {
            sections: 48,
            samples_per_turn: 24,
            ..EyePieceParams::default()
        };
        (mount, eye)
    }

    #[test]
    fn test_camera_piece_has_two_lens_holes() {
        let (params, _) = quick();
        let piece = create_iphone13_camera_piece(&params).expect("camera piece");
        assert!(piece.is_watertight(), "{}", piece.diagnostics().summary());
        let plate = rounded_rectangle(
            CAMERA_PIECE_SIDE,
            CAMERA_PIECE_SIDE,
            CAMERA_PIECE_SIDE / 4.0,
            params.depth,
            params.corner_segments,
        )
        .expect("plate");
        let lens_area = 32.0 / 2.0 * CAMERA_RADIUS * CAMERA_RADIUS * (std::f64::consts::TAU / 32.0).sin();
        let expected = plate.volume() - 2.0 * lens_area * params.depth;
        assert!((piece.volume() - expected).abs() < 1e-6 * expected, "{}", piece.volume());
    }

    #[test]
    fn test_socket_sits_inside_the_plate() {
        let params = PhoneMountParams::default();
        let socket = params.socket_position();
        let reach = params.knob_radius + params.fit.clearance() + params.socket_thread_thickness;
        assert!(socket.x + reach < PLATE_LENGTH / 2.0);
        assert!(socket.y.abs() + reach < PLATE_WIDTH / 2.0);
        assert!(params.camera_position().x + CAMERA_RADIUS < socket.x - reach);
    }

    #[test]
    fn test_phone_mount_pieces_are_closed() {
        let (params, eye) = quick();
        let mount = build_phone_mount(&params, &eye).expect("phone mount");
        for part in mount.clone().into_named() {
            assert!(part.mesh.is_watertight(), "{}: {}", part.name, part.mesh.diagnostics().summary());
            assert!(part.mesh.volume() > 0.0, "{}", part.name);
        }

        let ring_height = eye.height / 2.0;
        let b = mount.attachment.bounds().expect("bounds");
        assert!((b.max.z - params.depth).abs() < EPS);
        assert!((b.min.z - (OVERLAP - ring_height)).abs() < EPS);

        // The ring hangs over the camera, which the base piece moves to the origin.
        let base = mount.base.bounds().expect("bounds");
        assert!((base.min.x + eye.outer_radius()).abs() < EPS);
        assert!((base.max.x - (PLATE_LENGTH / 2.0 - params.camera_position().x)).abs() < EPS);
        assert!(mount.base.volume() > mount.attachment.volume());

        let knob = mount.knob.bounds().expect("bounds");
        let knob_height = params.knob_height + params.depth;
        assert!(knob.min.z.abs() < EPS);
        assert!((knob.max.z - (knob_height / 2.0 + 10.0)).abs() < EPS);
    }
}
