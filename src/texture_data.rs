// Pixel decoding for textures and cubemap faces
//
// Both backends upload tightly packed RGBA8. Decoding happens synchronously
// inside `load_texture` / `load_cubemap`.

use image::ImageError;
use std::path::Path;
use thiserror::Error;

/// How a texture handle may be sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// One 2D image, bound to the `sampler2D` slot
    Flat,
    /// Six faces, never bound where a `sampler2D` is declared
    Cube,
}

impl TextureKind {
    pub fn of_faces(count: usize) -> Self {
        if count == 6 {
            TextureKind::Cube
        } else {
            TextureKind::Flat
        }
    }
}

/// Why a cubemap could not be assembled from its faces
#[derive(Debug, Error)]
pub enum CubeFaceError {
    #[error("face {index} could not be decoded: {source}")]
    Decode {
        index: usize,
        #[source]
        source: ImageError,
    },

    #[error("face {index} is {width}x{height}, expected {expected_width}x{expected_height}")]
    SizeMismatch {
        index: usize,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
}

/// Decoded RGBA8 pixels
#[derive(Debug, Clone)]
pub struct Pixels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Pixels {
    pub fn byte_len(&self) -> usize {
        self.rgba.len()
    }
}

/// Decode an image file into RGBA8.
///
/// 2D textures are flipped so row 0 is the bottom of the image, matching
/// OpenGL texture coordinates. Cubemap faces are loaded unflipped.
pub fn load_rgba8(path: &Path, flip_vertically: bool) -> Result<Pixels, ImageError> {
    let mut image = image::open(path)?;
    if flip_vertically {
        image = image.flipv();
    }
    let rgba = image.into_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Pixels {
        width,
        height,
        rgba: rgba.into_raw(),
    })
}

/// Decode the six faces of a cubemap (+X, -X, +Y, -Y, +Z, -Z).
///
/// Fails on the first face that cannot be decoded, or on the first face
/// whose size differs from face 0.
pub fn load_cube_faces(faces: &[&Path; 6]) -> Result<Vec<Pixels>, CubeFaceError> {
    let pixels = faces
        .iter()
        .enumerate()
        .map(|(index, face)| load_rgba8(face, false).map_err(|source| CubeFaceError::Decode { index, source }))
        .collect::<Result<Vec<_>, _>>()?;
    check_same_size(&pixels)?;
    Ok(pixels)
}

/// Every face must match the size of the first one.
pub fn check_same_size(faces: &[Pixels]) -> Result<(), CubeFaceError> {
    let Some(first) = faces.first() else {
        return Ok(());
    };
    match faces
        .iter()
        .enumerate()
        .find(|(_, face)| (face.width, face.height) != (first.width, first.height))
    {
        Some((index, face)) => Err(CubeFaceError::SizeMismatch {
            index,
            width: face.width,
            height: face.height,
            expected_width: first.width,
            expected_height: first.height,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn write_png(dir: &Path, name: &str, image: &RgbaImage) -> std::path::PathBuf {
        let path = dir.join(name);
        image.save(&path).unwrap();
        path
    }

    #[test]
    fn test_decodes_rgba_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "a.png", &RgbaImage::new(4, 2));
        let pixels = load_rgba8(&path, false).unwrap();
        assert_eq!((pixels.width, pixels.height), (4, 2));
        assert_eq!(pixels.byte_len(), 4 * 2 * 4);
    }

    #[test]
    fn test_rgb_sources_gain_opaque_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.png");
        RgbImage::from_pixel(1, 1, Rgb([10, 20, 30])).save(&path).unwrap();
        let pixels = load_rgba8(&path, false).unwrap();
        assert_eq!(pixels.rgba, vec![10, 20, 30, 255]);
    }

    #[test]
    fn test_flip_swaps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut img = RgbaImage::new(1, 2);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(0, 1, Rgba([0, 0, 255, 255]));
        let path = write_png(dir.path(), "rows.png", &img);

        let straight = load_rgba8(&path, false).unwrap();
        let flipped = load_rgba8(&path, true).unwrap();
        assert_eq!(&straight.rgba[..4], &[255, 0, 0, 255]);
        assert_eq!(&flipped.rgba[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_rgba8(&dir.path().join("missing.png"), true).is_err());
    }

    #[test]
    fn test_garbage_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(load_rgba8(&path, false).is_err());
    }

    #[test]
    fn test_cube_faces_report_first_bad_face() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_png(dir.path(), "good.png", &RgbaImage::new(2, 2));
        let bad = dir.path().join("bad.png");
        let faces = [
            good.as_path(),
            good.as_path(),
            good.as_path(),
            bad.as_path(),
            good.as_path(),
            good.as_path(),
        ];
        match load_cube_faces(&faces).unwrap_err() {
            CubeFaceError::Decode { index, .. } => assert_eq!(index, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cube_faces_reject_mismatched_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let small = write_png(dir.path(), "small.png", &RgbaImage::new(2, 2));
        let large = write_png(dir.path(), "large.png", &RgbaImage::new(4, 4));
        let faces = [
            small.as_path(),
            small.as_path(),
            large.as_path(),
            small.as_path(),
            small.as_path(),
            small.as_path(),
        ];
        let err = load_cube_faces(&faces).unwrap_err();
        assert!(matches!(
            err,
            CubeFaceError::SizeMismatch {
                index: 2,
                width: 4,
                height: 4,
                expected_width: 2,
                expected_height: 2,
            }
        ));
        assert_eq!(err.to_string(), "face 2 is 4x4, expected 2x2");
    }

    #[test]
    fn test_texture_kind_from_face_count() {
        assert_eq!(TextureKind::of_faces(1), TextureKind::Flat);
        assert_eq!(TextureKind::of_faces(6), TextureKind::Cube);
    }

    #[test]
    fn test_cube_faces_decode_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = (0..6u8)
            .map(|i| {
                let img = RgbaImage::from_pixel(1, 1, Rgba([i, 0, 0, 255]));
                write_png(dir.path(), &format!("face{i}.png"), &img)
            })
            .collect();
        let faces: [&Path; 6] = std::array::from_fn(|i| paths[i].as_path());
        let decoded = load_cube_faces(&faces).unwrap();
        for (i, face) in decoded.iter().enumerate() {
            assert_eq!(face.rgba[0], i as u8);
        }
    }
}
