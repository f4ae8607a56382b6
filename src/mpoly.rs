use crate::im::ROI;
use crate::{Error, Result};
use clipper2::{FillRule, One, Path, Paths, Point};
use serde::{Deserialize, Serialize};

pub type IntPoint = Point<One>;
pub type IntPath = Path<One>;
pub type IntPaths = Paths<One>;

/// Flat `x0, y0, x1, y1, ...` ring, the way shapes are persisted.
type FlatVerts = Vec<i64>;

/// A region shape: one or more closed integer rings (outer boundaries plus holes).
///
/// Pixel membership follows pixel centers: pixel `(x, y)` belongs to the shape
/// when the point `(x + 0.5, y + 0.5)` lies inside under the even-odd rule.
/// Shapes built from pixel sets therefore count exactly the pixels they came from.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "MPolyDesc", into = "MPolyDesc")]
pub struct MPoly {
    paths: IntPaths,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct MPolyDesc {
    rings: Vec<FlatVerts>,
}

impl TryFrom<MPolyDesc> for MPoly {
    type Error = String;

    fn try_from(desc: MPolyDesc) -> std::result::Result<Self, Self::Error> {
        let mut rings = Vec::with_capacity(desc.rings.len());
        for flat in desc.rings {
            if flat.len() % 2 != 0 {
                return Err(format!("ring has odd coordinate count {}", flat.len()));
            }
            rings.push(flat.chunks_exact(2).map(|c| [c[0], c[1]]).collect());
        }
        Ok(MPoly::from_rings(rings))
    }
}

impl From<MPoly> for MPolyDesc {
    fn from(mpoly: MPoly) -> Self {
        MPolyDesc {
            rings: mpoly
                .rings()
                .into_iter()
                .map(|ring| ring.into_iter().flatten().collect())
                .collect(),
        }
    }
}

// - callback: Takes the x-span (x_end is not inclusive) and the row y.
//   `x_end` will always be greater than `x_start`.
fn fill_rings_pixel_centers<F: FnMut(i64, i64, i64)>(
    clip: ROI,
    rings: &[Vec<[i64; 2]>],
    callback: &mut F,
) {
    // Even-odd scanline fill across multiple rings, sampled at pixel centers.
    // Holes come out naturally: include the outer ring + the hole ring(s).
    let mut x_intersections: Vec<f64> = Vec::new();

    for pixel_y in clip.t..clip.b {
        let yc = pixel_y as f64 + 0.5;
        x_intersections.clear();

        for ring in rings {
            if ring.len() < 3 {
                continue;
            }

            let last = ring[ring.len() - 1];
            let (mut x0, mut y0) = (last[0], last[1]);

            for &[x1, y1] in ring {
                if y0 != y1 {
                    let y_min = y0.min(y1) as f64;
                    let y_max = y0.max(y1) as f64;
                    if yc >= y_min && yc < y_max {
                        let t = (yc - y0 as f64) / (y1 - y0) as f64;
                        x_intersections.push(x0 as f64 + t * (x1 - x0) as f64);
                    }
                }
                x0 = x1;
                y0 = y1;
            }
        }

        if x_intersections.len() < 2 {
            continue;
        }

        x_intersections.sort_unstable_by(|a, b| a.total_cmp(b));

        for pair in x_intersections.chunks_exact(2) {
            // Pixel x is inside when x + 0.5 falls in [pair[0], pair[1]).
            let x_src = ((pair[0] - 0.5).ceil() as i64).max(clip.l);
            let x_dst = ((pair[1] - 0.5).ceil() as i64).min(clip.r);
            if x_src < x_dst {
                callback(x_src, x_dst, pixel_y);
            }
        }
    }
}

fn coords_from_path(path: &IntPath) -> Vec<[i64; 2]> {
    path.iter().map(|pt| [pt.x_scaled(), pt.y_scaled()]).collect()
}

fn path_from_coords(coords: &[[i64; 2]]) -> IntPath {
    IntPath::new(
        coords
            .iter()
            .map(|&[x, y]| IntPoint::from_scaled(x, y))
            .collect(),
    )
}

/// Twice the signed shoelace area of a ring.
fn signed_area2(ring: &[[i64; 2]]) -> i128 {
    let n = ring.len();
    let mut acc: i128 = 0;
    for i in 0..n {
        let [x0, y0] = ring[i];
        let [x1, y1] = ring[(i + 1) % n];
        acc += x0 as i128 * y1 as i128 - x1 as i128 * y0 as i128;
    }
    acc
}

impl MPoly {
    pub fn new(paths: Vec<IntPath>) -> Self {
        Self {
            paths: IntPaths::new(paths),
        }
    }

    pub fn from_paths(paths: IntPaths) -> Self {
        Self { paths }
    }

    pub fn from_rings(rings: Vec<Vec<[i64; 2]>>) -> Self {
        Self::new(rings.iter().map(|r| path_from_coords(r)).collect())
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Axis-aligned rectangle covering pixels `l..r` x `t..b`.
    pub fn rect(l: i64, t: i64, r: i64, b: i64) -> Self {
        Self::from_rings(vec![vec![[l, t], [r, t], [r, b], [l, b]]])
    }

    /// Build the outline of a pixel set by unioning its row runs.
    pub fn from_pixels<I: IntoIterator<Item = (i64, i64)>>(pixels: I) -> Result<Self> {
        let mut px: Vec<(i64, i64)> = pixels.into_iter().map(|(x, y)| (y, x)).collect();
        px.sort_unstable();
        px.dedup();

        let mut runs: Vec<IntPath> = Vec::new();
        let mut i = 0;
        while i < px.len() {
            let (y, x_start) = px[i];
            let mut x_end = x_start + 1;
            i += 1;
            while i < px.len() && px[i] == (y, x_end) {
                x_end += 1;
                i += 1;
            }
            runs.push(path_from_coords(&[
                [x_start, y],
                [x_end, y],
                [x_end, y + 1],
                [x_start, y + 1],
            ]));
        }

        if runs.is_empty() {
            return Ok(Self::empty());
        }
        let merged = clipper2::union(IntPaths::new(runs), IntPaths::new(Vec::new()), FillRule::NonZero)?;
        Ok(Self::from_paths(merged))
    }

    pub fn paths(&self) -> &IntPaths {
        &self.paths
    }

    pub fn into_paths(self) -> IntPaths {
        self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntPath> {
        self.paths.iter()
    }

    pub fn rings(&self) -> Vec<Vec<[i64; 2]>> {
        self.paths.iter().map(coords_from_path).collect()
    }

    /// Bounding box of all vertices. Empty shapes give an empty ROI.
    pub fn bounds(&self) -> ROI {
        let mut roi: Option<ROI> = None;
        for ring in self.rings() {
            for [x, y] in ring {
                let px = ROI { l: x, t: y, r: x, b: y };
                match roi.as_mut() {
                    Some(r) => r.union(px),
                    None => roi = Some(px),
                }
            }
        }
        roi.unwrap_or_default()
    }

    /// Visit every covered pixel span `(x_start, x_end, y)`, `x_end` exclusive.
    pub fn raster<F: FnMut(i64, i64, i64)>(&self, mut callback: F) {
        let rings = self.rings();
        fill_rings_pixel_centers(self.bounds(), &rings, &mut callback);
    }

    /// Number of pixels whose centers fall inside the shape.
    pub fn pixel_area(&self) -> u64 {
        let mut area = 0u64;
        self.raster(|x_start, x_end, _| area += (x_end - x_start) as u64);
        area
    }

    /// Covered pixels, sorted row-major.
    pub fn pixel_set(&self) -> Vec<(i64, i64)> {
        let mut out = Vec::new();
        self.raster(|x_start, x_end, y| out.extend((x_start..x_end).map(|x| (x, y))));
        out.sort_unstable_by_key(|&(x, y)| (y, x));
        out
    }

    /// Mean pixel-center position, `None` for an empty shape.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        let (mut n, mut sx, mut sy) = (0u64, 0f64, 0f64);
        self.raster(|x_start, x_end, y| {
            let len = (x_end - x_start) as u64;
            n += len;
            // Sum of (x + 0.5) over the run.
            sx += (x_start + x_end) as f64 * 0.5 * len as f64;
            sy += (y as f64 + 0.5) * len as f64;
        });
        (n > 0).then(|| (sx / n as f64, sy / n as f64))
    }

    /// Resolve self-overlapping rings into the area the booleans see.
    ///
    /// Pixel counts use the even-odd rule while booleans use non-zero winding;
    /// the two agree only after this.
    pub fn normalized(&self) -> Result<MPoly> {
        if self.is_empty() {
            return Ok(self.clone());
        }
        self.union(self)
    }

    pub fn intersect(&self, other: &MPoly) -> Result<MPoly> {
        if self.is_empty() || other.is_empty() || !self.bounds().intersects(&other.bounds()) {
            return Ok(MPoly::empty());
        }
        let paths = clipper2::intersect(self.paths.clone(), other.paths.clone(), FillRule::NonZero)?;
        Ok(MPoly::from_paths(paths))
    }

    pub fn union(&self, other: &MPoly) -> Result<MPoly> {
        let paths = clipper2::union(self.paths.clone(), other.paths.clone(), FillRule::NonZero)?;
        Ok(MPoly::from_paths(paths))
    }

    pub fn difference(&self, other: &MPoly) -> Result<MPoly> {
        if other.is_empty() || !self.bounds().intersects(&other.bounds()) {
            return Ok(self.clone());
        }
        let paths = clipper2::difference(self.paths.clone(), other.paths.clone(), FillRule::NonZero)?;
        Ok(MPoly::from_paths(paths))
    }

    pub fn xor(&self, other: &MPoly) -> Result<MPoly> {
        let paths = clipper2::xor(self.paths.clone(), other.paths.clone(), FillRule::NonZero)?;
        Ok(MPoly::from_paths(paths))
    }

    /// Split into disconnected pieces, each an outer ring with its holes.
    ///
    /// Pieces are ordered top-to-bottom, then left-to-right by bounding box.
    pub fn components(&self) -> Result<Vec<MPoly>> {
        let rings = self.rings();
        let areas: Vec<i128> = rings.iter().map(|r| signed_area2(r)).collect();

        // The largest ring is always an outer boundary; it fixes the orientation sign.
        let Some(outer_sign) = areas
            .iter()
            .max_by_key(|a| a.abs())
            .map(|a| a.signum())
            .filter(|&s| s != 0)
        else {
            return Ok(Vec::new());
        };

        let outers: Vec<(&Vec<[i64; 2]>, i128)> = rings
            .iter()
            .zip(&areas)
            .filter(|(_, a)| a.signum() == outer_sign)
            .map(|(r, a)| (r, a.abs()))
            .collect();

        if outers.len() == 1 {
            return Ok(vec![self.clone()]);
        }

        let mut pieces = Vec::with_capacity(outers.len());
        for &(outer, area) in &outers {
            let mut piece = self.intersect(&MPoly::from_rings(vec![outer.clone()]))?;
            // Islands sitting inside this outer's holes belong to their own piece.
            for &(other, other_area) in &outers {
                if other_area < area {
                    piece = piece.difference(&MPoly::from_rings(vec![other.clone()]))?;
                }
            }
            if piece.pixel_area() > 0 {
                pieces.push(piece);
            }
        }
        pieces.sort_by_key(|p| {
            let b = p.bounds();
            (b.t, b.l)
        });
        Ok(pieces)
    }

    /// Reject shapes that cover no pixel.
    pub fn ensure_area(&self, what: &str) -> Result<u64> {
        match self.pixel_area() {
            0 => Err(Error::DegenerateShape(what.to_string())),
            n => Ok(n),
        }
    }
}
