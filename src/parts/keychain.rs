//! Name tag keychain: raised text on a rounded plate with a key-ring loop on
//! the left end.

use serde::{Deserialize, Serialize};

use super::{OVERLAP, PartError, check_positive, union};
use crate::geom::{GeomMesh, Vec3, rounded_rectangle, torus};
use crate::text::{TextRenderer, center_mesh};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeychainParams {
    pub text: String,
    pub font_size: f64,
    /// Height of the letters above the plate.
    pub text_height: f64,
    /// Margin around the text; the plate gets four times this on each end.
    pub border: f64,
    pub plate_thickness: f64,
    pub corner_radius: f64,
    pub ring_radius: f64,
    pub ring_tube_radius: f64,
    pub ring_sections: usize,
}

impl Default for KeychainParams {
    fn default() -> Self {
        Self {
            text: "Luke Skywalker".to_string(),
            font_size: 10.0,
            text_height: 1.0,
            border: 3.0,
            plate_thickness: 2.0,
            corner_radius: 3.0,
            ring_radius: 2.0,
            ring_tube_radius: 1.0,
            ring_sections: 64,
        }
    }
}

/// Plate on `0 <= z <= plate_thickness`, centred in x and y, with the text
/// standing on top.
pub fn build(params: &KeychainParams, renderer: &dyn TextRenderer) -> Result<GeomMesh, PartError> {
    let thickness = check_positive("plate thickness", params.plate_thickness)?;
    let text_height = check_positive("text height", params.text_height)?;
    check_positive("border", params.border)?;
    let tube = check_positive("ring tube radius", params.ring_tube_radius)?;
    if 2.0 * tube > thickness {
        return Err(PartError::InvalidParameter {
            name: "plate thickness minus ring tube diameter",
            value: thickness - 2.0 * tube,
        });
    }

    // Letters are rendered taller and sunk into the plate by the overlap.
    let text = renderer.render_text_to_mesh(&params.text, params.font_size, text_height + OVERLAP)?;
    let text = center_mesh(&text);
    let Some(text_bounds) = text.bounds() else {
        return Err(PartError::Text(crate::text::TextError::NoGeometry(params.text.clone())));
    };
    let text_size = text_bounds.size();
    let text = text.translated(Vec3::new(0.0, 0.0, thickness - OVERLAP + text_size.z / 2.0));

    let width = text_size.x + 8.0 * params.border;
    let length = text_size.y + 2.0 * params.border;
    let plate = rounded_rectangle(width, length, params.corner_radius, thickness, 8)?;
    let tagged = union(&plate, &text)?;

    // An odd number of tube sections keeps the ring strictly between the
    // plate faces.
    let tube_sections = (params.ring_sections / 4).max(3) | 1;
    let ring = torus(params.ring_radius, tube, params.ring_sections, tube_sections)?;
    let ring = ring.translated(Vec3::new(-width / 2.0 - params.ring_radius, 0.0, thickness / 2.0));
    union(&tagged, &ring)
}
