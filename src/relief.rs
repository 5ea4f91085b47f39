//! Raster images turned into printable reliefs.
//!
//! A picture is reduced to a [`BitGrid`] of raised cells, either by
//! thresholding its brightness or by tracing its edges into a stencil. The
//! grid can be grown and its background bridged into a single region before
//! every raised cell is extruded into a square column. Neighbouring columns
//! share their walls, so the relief comes out as one closed shell instead of
//! a pile of touching boxes, and no boolean pass is needed.
//!
//! Rows run down the image and map to -y; columns map to +x, so the relief
//! reads the same way as the picture when seen from above.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{GenericImageView, GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::geom::{GeomMesh, Point3, PrimitiveError, box_from_bounds};
use crate::parts::{NamedMesh, gather};
use crate::text::center_mesh;

/// Background regions this small are treated as noise and filled in.
const SPECK_CELLS: usize = 4;
/// Gaussian sigma matching a 5x5 smoothing kernel.
const STENCIL_BLUR_SIGMA: f32 = 1.1;
const CANNY_LOW: f64 = 50.0;
const CANNY_HIGH: f64 = 150.0;
/// Resampled stencil pixels at or below this stay part of a line.
const STENCIL_CUT: u8 = 250;

#[derive(Debug, thiserror::Error)]
pub enum ReliefError {
    #[error("{name} must be finite and positive (got {value})")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("could not load image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no input image given")]
    MissingImage,
    #[error("nothing to extrude: no cell is raised")]
    NothingToExtrude,
    #[error(transparent)]
    Primitive(#[from] PrimitiveError),
}

/// Edge tracing settings for stencil reliefs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StencilParams {
    /// Side of the square brush the traced lines are thickened with.
    pub line_thickness: u32,
    /// Rows of the resampled stencil; `None` keeps the source size.
    pub output_length: Option<u32>,
    /// Width of the bridges cut between enclosed parts of the sheet.
    pub path_width: usize,
}

impl Default for StencilParams {
    fn default() -> Self {
        Self {
            line_thickness: 1,
            output_length: Some(100),
            path_width: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliefParams {
    /// Source picture; the `relief` command can also take it as an argument.
    pub image: Option<PathBuf>,
    /// Cells along the longer image side after resampling.
    pub resolution: u32,
    /// Raise dark pixels instead of bright ones.
    pub invert: bool,
    /// Fraction of the strongest pixel value a cell must exceed to be raised.
    pub threshold: f64,
    /// Rounds of four-neighbour growth applied to the raised cells.
    pub grow: usize,
    /// Bridge every background region into one, cutting paths this wide.
    pub connect_path_width: Option<usize>,
    /// Trace edges into a stencil sheet instead of thresholding brightness.
    pub stencil: Option<StencilParams>,
    /// Size of the full image along x; y follows the aspect ratio.
    pub length: f64,
    pub height: f64,
    /// Backing board under the relief; `None` leaves the relief free standing.
    pub board_thickness: Option<f64>,
}

impl Default for ReliefParams {
    fn default() -> Self {
        Self {
            image: None,
            resolution: 400,
            invert: true,
            threshold: 0.7,
            grow: 0,
            connect_path_width: None,
            stencil: None,
            length: 100.0,
            height: 2.0,
            board_thickness: Some(2.0),
        }
    }
}

/// A row-major grid of raised (`true`) and background (`false`) cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitGrid {
    rows: usize,
    cols: usize,
    cells: Vec<bool>,
}

impl BitGrid {
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![false; rows * cols],
        }
    }

    #[must_use]
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let cells = (0..rows).flat_map(|r| (0..cols).map(move |c| (r, c))).map(|(r, c)| f(r, c)).collect();
        Self { rows, cols, cells }
    }

    /// Grid from lines of `0`/`1`; the first line sets the width.
    #[must_use]
    pub fn from_rows(lines: &[&str]) -> Self {
        let cols = lines.first().map_or(0, |line| line.len());
        Self::from_fn(lines.len(), cols, |r, c| lines[r].as_bytes().get(c) == Some(&b'1'))
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Cells outside the grid read as background.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols && self.cells[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: bool) {
        if row < self.rows && col < self.cols {
            self.cells[row * self.cols + col] = value;
        }
    }

    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.cells.iter().filter(|&&cell| cell).count()
    }

    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            cells: self.cells.iter().map(|&cell| !cell).collect(),
        }
    }

    fn neighbours(&self, row: usize, col: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let up = row.checked_sub(1).map(|r| (r, col));
        let left = col.checked_sub(1).map(|c| (row, c));
        let down = (row + 1 < self.rows).then_some((row + 1, col));
        let right = (col + 1 < self.cols).then_some((row, col + 1));
        [up, down, left, right].into_iter().flatten()
    }

    /// Four-connected regions of background cells, ordered by their first
    /// cell in row-major order.
    #[must_use]
    pub fn zero_components(&self) -> Vec<Vec<(usize, usize)>> {
        let mut seen = vec![false; self.cells.len()];
        let mut components = Vec::new();
        for start in 0..self.cells.len() {
            if self.cells[start] || seen[start] {
                continue;
            }
            seen[start] = true;
            let mut queue = VecDeque::from([(start / self.cols, start % self.cols)]);
            let mut component = Vec::new();
            while let Some((r, c)) = queue.pop_front() {
                component.push((r, c));
                for (nr, nc) in self.neighbours(r, c) {
                    let index = nr * self.cols + nc;
                    if !self.cells[index] && !seen[index] {
                        seen[index] = true;
                        queue.push_back((nr, nc));
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Closes every checkerboard 2x2 block by raising one of its background
    /// cells, so that no two columns meet along a bare vertical edge.
    fn without_pinches(&self) -> Self {
        let mut grid = self.clone();
        loop {
            let mut changed = false;
            for r in 0..self.rows.saturating_sub(1) {
                for c in 0..self.cols.saturating_sub(1) {
                    let (nw, ne) = (grid.get(r, c), grid.get(r, c + 1));
                    let (sw, se) = (grid.get(r + 1, c), grid.get(r + 1, c + 1));
                    if nw == se && ne == sw && nw != ne {
                        if nw {
                            grid.set(r, c + 1, true);
                        } else {
                            grid.set(r, c, true);
                        }
                        changed = true;
                    }
                }
            }
            if !changed {
                return grid;
            }
        }
    }
}

/// Lattice points on the segment between two cells, both ends included.
#[must_use]
pub fn bresenham_line(from: (i64, i64), to: (i64, i64)) -> Vec<(i64, i64)> {
    let (x1, y1) = from;
    let (x2, y2) = to;
    let (dx, dy) = ((x2 - x1).abs(), (y2 - y1).abs());
    let sx = if x2 > x1 { 1 } else { -1 };
    let sy = if y2 > y1 { 1 } else { -1 };
    let mut err = if dx > dy { dx / 2 } else { (-dy).div_euclid(2) };

    let (mut x, mut y) = from;
    let mut points = Vec::with_capacity(dx.max(dy) as usize + 1);
    loop {
        points.push((x, y));
        if x == x2 && y == y2 {
            return points;
        }
        let e2 = err;
        if e2 > -dx {
            err -= dy;
            x += sx;
        }
        if e2 < dy {
            err += dx;
            y += sy;
        }
    }
}

/// Joins all background regions into one.
///
/// Regions of at most four cells are filled in first. Then, while more than
/// one region is left, the first region is joined to its nearest neighbour
/// by a straight path of background cells `path_width` wide.
#[must_use]
pub fn connect_all_zeros(grid: &BitGrid, path_width: usize) -> BitGrid {
    let mut out = grid.clone();
    for component in grid.zero_components() {
        if component.len() <= SPECK_CELLS {
            for (r, c) in component {
                out.set(r, c, true);
            }
        }
    }

    let width = path_width.max(1);
    let mut bridges = 0;
    loop {
        let components = out.zero_components();
        if components.len() < 2 {
            break;
        }
        let Some((from, to)) = nearest_bridge(&out, &components) else {
            break;
        };
        carve(&mut out, from, to, width);
        bridges += 1;
    }
    log::debug!("connected background with {bridges} bridges");
    out
}

/// Closest pair of cells between the first region and any other one, found
/// by a breadth-first search that remembers where each path started.
fn nearest_bridge(grid: &BitGrid, components: &[Vec<(usize, usize)>]) -> Option<((usize, usize), (usize, usize))> {
    let mut label = vec![usize::MAX; grid.rows * grid.cols];
    for (k, component) in components.iter().enumerate() {
        for &(r, c) in component {
            label[r * grid.cols + c] = k;
        }
    }
    let mut origin: Vec<Option<(usize, usize)>> = vec![None; label.len()];
    let mut queue = VecDeque::new();
    for &(r, c) in components.first()? {
        origin[r * grid.cols + c] = Some((r, c));
        queue.push_back((r, c));
    }
    while let Some((r, c)) = queue.pop_front() {
        let start = origin[r * grid.cols + c]?;
        for (nr, nc) in grid.neighbours(r, c) {
            let index = nr * grid.cols + nc;
            if origin[index].is_some() {
                continue;
            }
            if label[index] != usize::MAX && label[index] != 0 {
                return Some((start, (nr, nc)));
            }
            origin[index] = Some(start);
            queue.push_back((nr, nc));
        }
    }
    None
}

/// Clears a four-connected path from `from` to `to` with a square brush.
fn carve(grid: &mut BitGrid, from: (usize, usize), to: (usize, usize), width: usize) {
    let line = bresenham_line((from.0 as i64, from.1 as i64), (to.0 as i64, to.1 as i64));
    let mut path = Vec::with_capacity(line.len() * 2);
    for (i, &point) in line.iter().enumerate() {
        if let Some(&prev) = i.checked_sub(1).and_then(|j| line.get(j)) {
            if prev.0 != point.0 && prev.1 != point.1 {
                path.push((point.0, prev.1));
            }
        }
        path.push(point);
    }

    let half = (width / 2) as i64;
    for (r, c) in path {
        for dr in 0..width as i64 {
            for dc in 0..width as i64 {
                let (rr, cc) = (r + dr - half, c + dc - half);
                if rr >= 0 && cc >= 0 {
                    grid.set(rr as usize, cc as usize, false);
                }
            }
        }
    }
}

/// Raises every cell next to a raised cell.
#[must_use]
pub fn make_ones_bigger(grid: &BitGrid) -> BitGrid {
    let mut out = grid.clone();
    for r in 0..grid.rows {
        for c in 0..grid.cols {
            if grid.get(r, c) {
                for (nr, nc) in grid.neighbours(r, c) {
                    out.set(nr, nc, true);
                }
            }
        }
    }
    out
}

pub fn load_image(path: &Path) -> Result<GrayImage, ReliefError> {
    let image = image::open(path).map_err(|source| ReliefError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let (w, h) = image.dimensions();
    log::debug!("loaded {} ({w}x{h})", path.display());
    Ok(image.to_luma8())
}

/// Resamples `image` so its longer side has `longer_side` pixels and raises
/// every pixel brighter than `threshold` times the brightest one (darker,
/// when `invert` is set).
#[must_use]
pub fn image_to_bits(image: &GrayImage, invert: bool, longer_side: u32, threshold: f64) -> BitGrid {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return BitGrid::new(0, 0);
    }
    let scale = f64::from(longer_side.max(1)) / f64::from(w.max(h));
    let new_w = ((f64::from(w) * scale).round() as u32).max(1);
    let new_h = ((f64::from(h) * scale).round() as u32).max(1);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let values: Vec<f64> = resized
        .pixels()
        .map(|p| {
            let v = f64::from(p[0]) / 255.0;
            if invert { 1.0 - v } else { v }
        })
        .collect();
    let cut = values.iter().copied().fold(0.0, f64::max) * threshold;
    BitGrid {
        rows: new_h as usize,
        cols: new_w as usize,
        cells: values.into_iter().map(|v| v > cut).collect(),
    }
}

/// Black line art on white of the edges in `image`.
///
/// The image is smoothed, its edges traced with a Canny detector, the lines
/// thickened with a `thick_factor` square brush and, when `output_length` is
/// given, resampled to that many rows and re-thresholded so thin lines
/// survive the shrink.
#[must_use]
pub fn create_stencil(image: &GrayImage, thick_factor: u32, output_length: Option<u32>) -> GrayImage {
    let (w, h) = image.dimensions();
    let blurred = imageops::blur(image, STENCIL_BLUR_SIGMA);
    let mut lines = canny(&blurred, CANNY_LOW, CANNY_HIGH);
    if thick_factor > 1 {
        lines = dilate(&lines, w as usize, h as usize, thick_factor as usize);
    }
    let stencil = GrayImage::from_fn(w, h, |x, y| {
        Luma([if lines[y as usize * w as usize + x as usize] { 0 } else { 255 }])
    });

    match output_length {
        Some(rows) if rows > 0 && h > 0 => {
            let cols = ((f64::from(rows) * f64::from(w) / f64::from(h)).round() as u32).max(1);
            let small = imageops::resize(&stencil, cols, rows, FilterType::Triangle);
            GrayImage::from_fn(cols, rows, |x, y| {
                Luma([if small.get_pixel(x, y)[0] > STENCIL_CUT { 255 } else { 0 }])
            })
        }
        _ => stencil,
    }
}

/// Dark stencil pixels become raised cells.
#[must_use]
pub fn stencil_to_bits(stencil: &GrayImage) -> BitGrid {
    let (w, h) = stencil.dimensions();
    BitGrid::from_fn(h as usize, w as usize, |r, c| stencil.get_pixel(c as u32, r as u32)[0] < 128)
}

fn canny(image: &GrayImage, low: f64, high: f64) -> Vec<bool> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let px = |x: usize, y: usize| f64::from(image.get_pixel(x as u32, y as u32)[0]);

    let mut magnitude = vec![0.0; w * h];
    let mut sector = vec![0u8; w * h];
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let gx = px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2.0 * px(x - 1, y)
                - px(x - 1, y + 1);
            let gy = px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2.0 * px(x, y - 1)
                - px(x + 1, y - 1);
            magnitude[y * w + x] = gx.abs() + gy.abs();
            let angle = gy.atan2(gx).to_degrees().rem_euclid(180.0);
            sector[y * w + x] = match angle {
                a if !(22.5..157.5).contains(&a) => 0,
                a if a < 67.5 => 1,
                a if a < 112.5 => 2,
                _ => 3,
            };
        }
    }

    // Non-maximum suppression along the gradient.
    let mut thin = vec![0.0; w * h];
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let i = y * w + x;
            let m = magnitude[i];
            if m <= low {
                continue;
            }
            let (a, b) = match sector[i] {
                0 => (i - 1, i + 1),
                1 => (i - w - 1, i + w + 1),
                2 => (i - w, i + w),
                _ => (i - w + 1, i + w - 1),
            };
            if m > magnitude[a] && m >= magnitude[b] {
                thin[i] = m;
            }
        }
    }

    // Hysteresis: weak edges survive only when linked to a strong one.
    let mut edges = vec![false; w * h];
    let mut stack: Vec<usize> = (0..w * h).filter(|&i| thin[i] > high).collect();
    for &i in &stack {
        edges[i] = true;
    }
    while let Some(i) = stack.pop() {
        let (x, y) = (i % w, i / w);
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let j = ny * w + nx;
                if !edges[j] && thin[j] > low {
                    edges[j] = true;
                    stack.push(j);
                }
            }
        }
    }
    edges
}

fn dilate(cells: &[bool], w: usize, h: usize, size: usize) -> Vec<bool> {
    let before = size / 2;
    let after = size - 1 - before;
    let mut out = vec![false; cells.len()];
    for y in 0..h {
        for x in 0..w {
            if !cells[y * w + x] {
                continue;
            }
            for ny in y.saturating_sub(after)..=(y + before).min(h - 1) {
                for nx in x.saturating_sub(after)..=(x + before).min(w - 1) {
                    out[ny * w + nx] = true;
                }
            }
        }
    }
    out
}

fn check_positive(name: &'static str, value: f64) -> Result<f64, ReliefError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ReliefError::InvalidParameter { name, value })
    }
}

/// Extrudes every raised cell of `grid` into a column of `height`, with the
/// whole grid spanning `length` along x and `width` along y. The result is
/// centred on the origin.
pub fn create_extruded_mesh(grid: &BitGrid, length: f64, width: f64, height: f64) -> Result<GeomMesh, ReliefError> {
    check_positive("relief length", length)?;
    check_positive("relief width", width)?;
    check_positive("relief height", height)?;
    let cells = grid.without_pinches();
    if cells.count_ones() == 0 {
        return Err(ReliefError::NothingToExtrude);
    }
    if cells.count_ones() != grid.count_ones() {
        log::debug!("raised {} cells to close diagonal pinches", cells.count_ones() - grid.count_ones());
    }

    let (rows, cols) = (cells.rows, cells.cols);
    let (dx, dy) = (length / cols as f64, width / rows as f64);
    let stride = cols + 1;
    let layer = (rows + 1) * stride;
    let corner = |(r, c): (usize, usize), top: bool| (usize::from(top) * layer + r * stride + c) as u32;

    let mut positions = Vec::with_capacity(2 * layer);
    for z in [0.0, height] {
        for r in 0..=rows {
            for c in 0..=cols {
                positions.push([c as f64 * dx, (rows - r) as f64 * dy, z]);
            }
        }
    }

    let mut indices = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            if !cells.get(r, c) {
                continue;
            }
            // Counter-clockwise seen from above: south, east, north, west sides.
            let ring = [(r + 1, c), (r + 1, c + 1), (r, c + 1), (r, c)];
            let [a, b, cc, d] = ring.map(|p| corner(p, true));
            indices.extend_from_slice(&[a, b, cc, a, cc, d]);
            let [a, b, cc, d] = ring.map(|p| corner(p, false));
            indices.extend_from_slice(&[a, cc, b, a, d, cc]);

            let open = [
                !cells.get(r + 1, c),
                !cells.get(r, c + 1),
                r == 0 || !cells.get(r - 1, c),
                c == 0 || !cells.get(r, c - 1),
            ];
            for side in (0..4).filter(|&side| open[side]) {
                let (p, q) = (ring[side], ring[(side + 1) % 4]);
                let (pb, qb) = (corner(p, false), corner(q, false));
                let (pt, qt) = (corner(p, true), corner(q, true));
                indices.extend_from_slice(&[pb, qb, qt, pb, qt, pt]);
            }
        }
    }

    let mut mesh = GeomMesh::new(positions, indices);
    mesh.remove_unused_vertices();
    Ok(center_mesh(&mesh.with_normals()))
}

/// Board under `mesh`: its x/y footprint, `z_offset` thick (default the
/// mesh's own height), with its top on the mesh's lowest point.
pub fn create_enclosing_box(mesh: &GeomMesh, z_offset: Option<f64>) -> Result<GeomMesh, ReliefError> {
    let bounds = mesh.bounds().ok_or(ReliefError::NothingToExtrude)?;
    let depth = check_positive("board thickness", z_offset.unwrap_or(bounds.max.z - bounds.min.z))?;
    Ok(box_from_bounds(
        Point3::new(bounds.min.x, bounds.min.y, bounds.min.z - depth),
        Point3::new(bounds.max.x, bounds.max.y, bounds.min.z),
    )?)
}

/// The raised cells for `image` under `params`.
///
/// Stencils raise the sheet around the traced lines, with enclosed parts of
/// the sheet bridged to the rest so it prints as one piece.
pub fn relief_grid(image: &GrayImage, params: &ReliefParams) -> Result<BitGrid, ReliefError> {
    if !(0.0..1.0).contains(&params.threshold) {
        return Err(ReliefError::InvalidParameter {
            name: "threshold",
            value: params.threshold,
        });
    }
    let mut grid = match &params.stencil {
        Some(stencil) => {
            let lines = stencil_to_bits(&create_stencil(image, stencil.line_thickness, stencil.output_length));
            connect_all_zeros(&lines, stencil.path_width).inverted()
        }
        None => image_to_bits(image, params.invert, params.resolution, params.threshold),
    };
    for _ in 0..params.grow {
        grid = make_ones_bigger(&grid);
    }
    if let Some(width) = params.connect_path_width {
        grid = connect_all_zeros(&grid, width);
    }
    log::debug!("relief grid {}x{} with {} raised cells", grid.rows(), grid.cols(), grid.count_ones());
    Ok(grid)
}

/// A relief and the optional board printed under it.
#[derive(Debug, Clone, PartialEq)]
pub struct Relief {
    pub relief: GeomMesh,
    pub board: Option<GeomMesh>,
}

impl Relief {
    /// Relief and board in one file, as two shells that touch.
    #[must_use]
    pub fn into_named(self, name: &str) -> NamedMesh {
        NamedMesh::new(name, gather(std::iter::once(self.relief).chain(self.board)))
    }
}

pub fn image_to_relief(image: &GrayImage, params: &ReliefParams) -> Result<Relief, ReliefError> {
    let grid = relief_grid(image, params)?;
    if grid.cols() == 0 {
        return Err(ReliefError::NothingToExtrude);
    }
    let width = params.length * grid.rows() as f64 / grid.cols() as f64;
    let relief = create_extruded_mesh(&grid, params.length, width, params.height)?;
    let board = params
        .board_thickness
        .map(|thickness| create_enclosing_box(&relief, Some(thickness)))
        .transpose()?;
    Ok(Relief { relief, board })
}

/// Loads the picture named by `path`, falling back to `params.image`.
pub fn build(params: &ReliefParams, path: Option<&Path>) -> Result<Relief, ReliefError> {
    let path = path.or(params.image.as_deref()).ok_or(ReliefError::MissingImage)?;
    let image = load_image(path)?;
    log::info!("building relief from {}", path.display());
    image_to_relief(&image, params)
}
