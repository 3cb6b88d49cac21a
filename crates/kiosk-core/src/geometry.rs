//! Axis-aligned bounding boxes in pixel space.
//!
//! A [`BBox`] keeps its corners and the derived width, height and area in
//! lock-step: every operator returns a box rebuilt from corners, so the
//! derived fields never drift out of sync.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("unsupported box shape: expected [x1, y1, width, height], got {0} values")]
    UnsupportedShape(usize),
    #[error("inverted corners: ({x1}, {y1}) must not exceed ({x2}, {y2})")]
    InvertedCorners { x1: i32, y1: i32, x2: i32, y2: i32 },
    #[error("union area is zero: both boxes are degenerate")]
    DegenerateUnion,
    #[error("box extent does not fit in i32 pixel coordinates")]
    Overflow,
}

/// Axis-aligned box with integer pixel corners, `x1 <= x2` and `y1 <= y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "BoxRecord", try_from = "BoxRecord")]
pub struct BBox {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    width: i32,
    height: i32,
    area: i64,
}

/// Key-value form of a box: top-left corner plus extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub x1: i32,
    pub y1: i32,
    pub width: i32,
    pub height: i32,
}

/// A box divided through by its image dimensions (unit-square coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBox {
    /// Scale back to pixel space, rounding each corner to the nearest pixel.
    pub fn denormalize(&self, image_width: u32, image_height: u32) -> BBox {
        let w = image_width as f64;
        let h = image_height as f64;
        BBox::rebuild(
            (self.x1 * w).round() as i32,
            (self.y1 * h).round() as i32,
            (self.x2 * w).round() as i32,
            (self.y2 * h).round() as i32,
        )
    }
}

impl BBox {
    /// Build a box from corner form `[x1, y1, x2, y2]`.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self, GeometryError> {
        if x1 > x2 || y1 > y2 {
            return Err(GeometryError::InvertedCorners { x1, y1, x2, y2 });
        }
        if x2.checked_sub(x1).is_none() || y2.checked_sub(y1).is_none() {
            return Err(GeometryError::Overflow);
        }
        Ok(Self::rebuild(x1, y1, x2, y2))
    }

    /// The single reconstruction step: orders the corners and derives
    /// width, height and area from them.
    ///
    /// An extent wider than `i32::MAX` pulls the far corner in so that
    /// `x2 - x1 == width` still holds.
    fn rebuild(ax: i32, ay: i32, bx: i32, by: i32) -> Self {
        let (x1, x2) = (ax.min(bx), ax.max(bx));
        let (y1, y2) = (ay.min(by), ay.max(by));
        let width = x2.saturating_sub(x1);
        let height = y2.saturating_sub(y1);
        let (x2, y2) = (x1 + width, y1 + height);
        Self {
            x1,
            y1,
            x2,
            y2,
            width,
            height,
            area: width as i64 * height as i64,
        }
    }

    /// Build a box from floating-point detector output `[x1, y1, x2, y2]`,
    /// rounding to the nearest pixel.
    pub fn from_xyxy_f32(xyxy: [f32; 4]) -> Self {
        let [x1, y1, x2, y2] = xyxy.map(|v| v.round() as i32);
        Self::rebuild(x1, y1, x2, y2)
    }

    /// Build a box from origin+extent form `[x1, y1, width, height]`.
    ///
    /// Fractional values are truncated toward zero.
    pub fn from_xywh(xywh: &[f64]) -> Result<Self, GeometryError> {
        let [x, y, w, h] = as_xywh(xywh)?;
        Self::new(x as i32, y as i32, (x + w) as i32, (y + h) as i32)
    }

    pub fn from_record(record: &BoxRecord) -> Result<Self, GeometryError> {
        let x2 = record.x1.checked_add(record.width);
        let y2 = record.y1.checked_add(record.height);
        match (x2, y2) {
            (Some(x2), Some(y2)) => Self::new(record.x1, record.y1, x2, y2),
            _ => Err(GeometryError::Overflow),
        }
    }

    pub fn to_record(&self) -> BoxRecord {
        BoxRecord {
            x1: self.x1,
            y1: self.y1,
            width: self.width,
            height: self.height,
        }
    }

    pub fn x1(&self) -> i32 {
        self.x1
    }

    pub fn y1(&self) -> i32 {
        self.y1
    }

    pub fn x2(&self) -> i32 {
        self.x2
    }

    pub fn y2(&self) -> i32 {
        self.y2
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn area(&self) -> i64 {
        self.area
    }

    /// Corner form `[x1, y1, x2, y2]`.
    pub fn to_xyxy(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Origin+extent form `[x1, y1, width, height]`.
    pub fn to_xywh(&self) -> [i32; 4] {
        [self.x1, self.y1, self.width, self.height]
    }

    /// Centroid, truncated toward zero.
    pub fn center(&self) -> (i32, i32) {
        (
            (self.x1 as f64 + self.width as f64 / 2.0) as i32,
            (self.y1 as f64 + self.height as f64 / 2.0) as i32,
        )
    }

    /// Corner points clockwise from the top-left.
    pub fn corners(&self) -> [(i32, i32); 4] {
        [
            (self.x1, self.y1),
            (self.x2, self.y1),
            (self.x2, self.y2),
            (self.x1, self.y2),
        ]
    }

    /// Normalized origin+extent `[x, y, w, h]`, the common dataset
    /// interchange layout (FiftyOne style). `None` for a zero-sized image.
    pub fn to_fiftyone(&self, image_width: u32, image_height: u32) -> Option<[f64; 4]> {
        let (w, h) = image_dims(image_width, image_height)?;
        Some([
            self.x1 as f64 / w,
            self.y1 as f64 / h,
            self.width as f64 / w,
            self.height as f64 / h,
        ])
    }

    /// Center-normalized `[cx, cy, w, h]` used by anchor-free (YOLO style)
    /// detectors. `None` for a zero-sized image.
    pub fn to_yolo(&self, image_width: u32, image_height: u32) -> Option<[f64; 4]> {
        let (w, h) = image_dims(image_width, image_height)?;
        Some([
            (self.x1 as f64 + self.width as f64 / 2.0) / w,
            (self.y1 as f64 + self.height as f64 / 2.0) / h,
            self.width as f64 / w,
            self.height as f64 / h,
        ])
    }

    /// Divide every coordinate by the image dimensions.
    ///
    /// The pixel box is left untouched; the unit-square result can only be
    /// mapped back with the original dimensions ([`NormalizedBox::denormalize`]).
    /// `None` for a zero-sized image.
    pub fn normalized(&self, image_width: u32, image_height: u32) -> Option<NormalizedBox> {
        let (w, h) = image_dims(image_width, image_height)?;
        Some(NormalizedBox {
            x1: self.x1 as f64 / w,
            y1: self.y1 as f64 / h,
            x2: self.x2 as f64 / w,
            y2: self.y2 as f64 / h,
            width: self.width as f64 / w,
            height: self.height as f64 / h,
        })
    }

    /// Intersection area with another box. Zero when they do not overlap.
    pub fn intersection_area(&self, other: &BBox) -> f64 {
        clipped_area(
            (self.x1 as f64, self.y1 as f64, self.x2 as f64, self.y2 as f64),
            (other.x1 as f64, other.y1 as f64, other.x2 as f64, other.y2 as f64),
        )
    }

    /// Intersection area with a raw origin+extent list `[x1, y1, width, height]`.
    pub fn intersection_area_xywh(&self, xywh: &[f64]) -> Result<f64, GeometryError> {
        let [x, y, w, h] = as_xywh(xywh)?;
        Ok(clipped_area(
            (self.x1 as f64, self.y1 as f64, self.x2 as f64, self.y2 as f64),
            (x, y, x + w, y + h),
        ))
    }

    /// Intersection-over-union, failing when the union area is zero.
    pub fn try_iou(&self, other: &BBox) -> Result<f64, GeometryError> {
        let inter = self.intersection_area(other);
        ratio(inter, self.area as f64 + other.area as f64 - inter)
    }

    /// Intersection-over-union; 0.0 for a degenerate (zero-area) union.
    pub fn iou(&self, other: &BBox) -> f64 {
        self.try_iou(other).unwrap_or_else(|e| {
            tracing::debug!(a = %self, b = %other, error = %e, "iou of degenerate boxes");
            0.0
        })
    }

    /// Intersection-over-union against a raw origin+extent list.
    /// A degenerate union yields 0.0; a malformed list is an error.
    pub fn iou_xywh(&self, xywh: &[f64]) -> Result<f64, GeometryError> {
        let inter = self.intersection_area_xywh(xywh)?;
        let other_area = xywh[2] * xywh[3];
        match ratio(inter, self.area as f64 + other_area - inter) {
            Err(GeometryError::DegenerateUnion) => Ok(0.0),
            other => other,
        }
    }

    /// Euclidean distance between the two centroids.
    pub fn distance(&self, other: &BBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((bx - ax) as f64).hypot((by - ay) as f64)
    }

    /// Scale width and height by `factor`, keeping the top-left corner fixed.
    /// Extents round to the nearest pixel and never go below zero.
    pub fn scaled(&self, factor: f64) -> Self {
        let width = (self.width as f64 * factor).round().max(0.0) as i32;
        let height = (self.height as f64 * factor).round().max(0.0) as i32;
        self.resized_to(width, height)
    }

    /// Set an explicit size, keeping the top-left corner fixed.
    /// Corners saturate at the `i32` range.
    pub fn resized_to(&self, width: i32, height: i32) -> Self {
        Self::rebuild(
            self.x1,
            self.y1,
            self.x1.saturating_add(width.max(0)),
            self.y1.saturating_add(height.max(0)),
        )
    }

    /// Shift all corners; they saturate at the `i32` range.
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self::rebuild(
            self.x1.saturating_add(dx),
            self.y1.saturating_add(dy),
            self.x2.saturating_add(dx),
            self.y2.saturating_add(dy),
        )
    }

    /// Rotate the top-left and bottom-right corners about the box center
    /// and rebuild an axis-aligned box from the two rotated points.
    /// Rotated coordinates truncate toward zero.
    ///
    /// This is not a rotated-rectangle transform: only two opposite corners
    /// take part, so the result is re-axis-aligned (a square rotated by 45°
    /// collapses to zero width).
    pub fn rotated(&self, angle_degrees: f64) -> Self {
        let cx = (self.x1 + self.x2) as f64 / 2.0;
        let cy = (self.y1 + self.y2) as f64 / 2.0;
        let (sin, cos) = angle_degrees.to_radians().sin_cos();

        let rotate = |x: i32, y: i32| -> (i32, i32) {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            (
                (dx * cos - dy * sin + cx) as i32,
                (dx * sin + dy * cos + cy) as i32,
            )
        };

        let (ax, ay) = rotate(self.x1, self.y1);
        let (bx, by) = rotate(self.x2, self.y2);
        Self::rebuild(ax, ay, bx, by)
    }

    /// True unless the boxes are fully separated on either axis.
    /// Touching edges count as overlap.
    pub fn overlaps(&self, other: &BBox) -> bool {
        !(self.x2 < other.x1 || self.x1 > other.x2 || self.y2 < other.y1 || self.y1 > other.y2)
    }

    /// True iff all four corners of `self` lie within `outer`.
    pub fn is_fully_inside(&self, outer: &BBox) -> bool {
        self.corners().iter().all(|&p| outer.contains_point(p))
    }

    pub fn contains_point(&self, (x, y): (i32, i32)) -> bool {
        self.x1 <= x && x <= self.x2 && self.y1 <= y && y <= self.y2
    }

    /// Clip to `[0, image_width] × [0, image_height]`.
    /// Returns `None` when nothing of the box remains inside the image.
    pub fn clipped_to(&self, image_width: u32, image_height: u32) -> Option<Self> {
        let x1 = self.x1.max(0);
        let y1 = self.y1.max(0);
        let x2 = self.x2.min(image_width.min(i32::MAX as u32) as i32);
        let y2 = self.y2.min(image_height.min(i32::MAX as u32) as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self::rebuild(x1, y1, x2, y2))
    }

    /// Width over height; infinite for zero height.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            f64::INFINITY
        } else {
            self.width as f64 / self.height as f64
        }
    }

    pub fn perimeter(&self) -> i64 {
        2 * (self.width as i64 + self.height as i64)
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x1: {} y1: {} width: {} height: {} area: {}",
            self.x1, self.y1, self.width, self.height, self.area
        )
    }
}

impl From<BBox> for BoxRecord {
    fn from(b: BBox) -> Self {
        b.to_record()
    }
}

impl TryFrom<BoxRecord> for BBox {
    type Error = GeometryError;

    fn try_from(record: BoxRecord) -> Result<Self, Self::Error> {
        BBox::from_record(&record)
    }
}

fn image_dims(image_width: u32, image_height: u32) -> Option<(f64, f64)> {
    (image_width > 0 && image_height > 0).then(|| (image_width as f64, image_height as f64))
}

fn as_xywh(values: &[f64]) -> Result<[f64; 4], GeometryError> {
    <[f64; 4]>::try_from(values).map_err(|_| GeometryError::UnsupportedShape(values.len()))
}

/// `max(0, min(x2) - max(x1)) * max(0, min(y2) - max(y1))`
fn clipped_area(a: (f64, f64, f64, f64), b: (f64, f64, f64, f64)) -> f64 {
    let w = (a.2.min(b.2) - a.0.max(b.0)).max(0.0);
    let h = (a.3.min(b.3) - a.1.max(b.1)).max(0.0);
    w * h
}

fn ratio(intersection: f64, union: f64) -> Result<f64, GeometryError> {
    if union > 0.0 {
        Ok(intersection / union)
    } else {
        Err(GeometryError::DegenerateUnion)
    }
}
