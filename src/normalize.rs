//! Image normalization: EXIF orientation fix-up, then center-crop and resize to the
//! resolution the generation model expects.

use std::io::Cursor;
use std::str::FromStr;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::debug;

use crate::error::Result;

pub const SQUARE_SIDE: u32 = 1024;
pub const LONG_SIDE: u32 = 1216;
pub const SHORT_SIDE: u32 = 832;

/// How uploads are shaped before submission. Picked per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropPolicy {
    /// Everything becomes 1024x1024.
    Square,
    /// 1216x832 for landscape, 832x1216 for portrait, 1024x1024 for square input.
    PortraitLandscape,
}

impl FromStr for CropPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "square" => Ok(CropPolicy::Square),
            "portrait-landscape" | "portrait_landscape" => Ok(CropPolicy::PortraitLandscape),
            other => Err(format!("unknown crop policy: {other}")),
        }
    }
}

/// Counter-clockwise rotation needed to undo the camera orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Ccw90,
    Ccw180,
    Ccw270,
}

impl Rotation {
    pub fn from_exif(orientation: u32) -> Option<Self> {
        match orientation {
            3 => Some(Rotation::Ccw180),
            6 => Some(Rotation::Ccw270),
            8 => Some(Rotation::Ccw90),
            _ => None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Ccw90 => 90,
            Rotation::Ccw180 => 180,
            Rotation::Ccw270 => 270,
        }
    }

    /// `image` rotates clockwise, so the quarter turns swap.
    pub fn apply(&self, img: DynamicImage) -> DynamicImage {
        match self {
            Rotation::Ccw90 => img.rotate270(),
            Rotation::Ccw180 => img.rotate180(),
            Rotation::Ccw270 => img.rotate90(),
        }
    }
}

/// Region to keep, in pixels. `x + width <= source width` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Best-effort orientation read. Missing or unreadable EXIF data means no rotation.
pub fn read_orientation(raw: &[u8]) -> Option<Rotation> {
    let mut cursor = Cursor::new(raw);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let orientation = exif
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))?;
    Rotation::from_exif(orientation)
}

/// Output resolution for a `width` x `height` input.
pub fn target_size(width: u32, height: u32, policy: CropPolicy) -> (u32, u32) {
    match policy {
        _ if width == height => (SQUARE_SIDE, SQUARE_SIDE),
        CropPolicy::Square => (SQUARE_SIDE, SQUARE_SIDE),
        CropPolicy::PortraitLandscape if width > height => (LONG_SIDE, SHORT_SIDE),
        CropPolicy::PortraitLandscape => (SHORT_SIDE, LONG_SIDE),
    }
}

/// Largest centered box with the target aspect ratio. `None` when the image already has it.
///
/// Spans are floored so the output size is exact; the offset is `floor((w - new_w) / 2)`.
pub fn crop_box(width: u32, height: u32, policy: CropPolicy) -> Option<CropBox> {
    let (ratio_w, ratio_h) = target_size(width, height, policy);
    let (w, h) = (u64::from(width), u64::from(height));
    let (rw, rh) = (u64::from(ratio_w), u64::from(ratio_h));

    let (new_w, new_h) = if w * rh >= h * rw {
        ((h * rw / rh).max(1), h)
    } else {
        (w, (w * rh / rw).max(1))
    };
    if new_w == w && new_h == h {
        return None;
    }

    Some(CropBox {
        x: ((w - new_w) / 2) as u32,
        y: ((h - new_h) / 2) as u32,
        width: new_w as u32,
        height: new_h as u32,
    })
}

/// Crops and resizes an already-oriented image.
pub fn rescale(img: DynamicImage, policy: CropPolicy) -> DynamicImage {
    let (width, height) = img.dimensions();
    let (target_w, target_h) = target_size(width, height, policy);

    let img = match crop_box(width, height, policy) {
        Some(b) => {
            debug!(?b, width, height, "center-cropping upload");
            img.crop_imm(b.x, b.y, b.width, b.height)
        }
        None => img,
    };

    img.resize_exact(target_w, target_h, FilterType::CatmullRom)
}

/// Decodes an upload and shapes it for the generation model.
pub fn normalize(raw: &[u8], policy: CropPolicy) -> Result<DynamicImage> {
    let img = image::load_from_memory(raw)?;

    let img = match read_orientation(raw) {
        Some(rotation) => {
            debug!(degrees = rotation.degrees(), "applying EXIF rotation");
            rotation.apply(img)
        }
        None => img,
    };

    Ok(rescale(img, policy))
}
