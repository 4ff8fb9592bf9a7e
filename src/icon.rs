use std::path::Path;

use crate::error::IconError;

/// Decoded RGBA8 image, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct IconImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl IconImage {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 4) as usize;
        self.rgba.get(idx..idx + 4).map(|p| [p[0], p[1], p[2], p[3]])
    }
}

/// Where icons come from. The renderer treats the result opaquely.
pub trait IconLoader {
    fn load_icon(&self, path: &Path) -> Result<IconImage, IconError>;
}

/// Decodes icons from disk with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileIconLoader;

impl IconLoader for FileIconLoader {
    fn load_icon(&self, path: &Path) -> Result<IconImage, IconError> {
        let image = image::open(path)?.to_rgba8();
        Ok(IconImage {
            width: image.width(),
            height: image.height(),
            rgba: image.into_raw(),
        })
    }
}
