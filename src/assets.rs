//! Icon files for the selector buttons and the tray.

use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Edge length of the selector button icons.
pub const BUTTON_ICON_SIZE: u32 = 64;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset {0} not found")]
    NotFound(String),

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone)]
pub struct Icon {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

pub fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .map(|p| p.parent().map(|p| p.to_path_buf()).unwrap_or(p))
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Directories searched for assets, most specific first.
pub fn search_dirs() -> Vec<PathBuf> {
    let exe = exe_dir();
    vec![exe.join("assets"), exe, PathBuf::from("assets"), PathBuf::from(".")]
}

pub fn find_asset(name: &str, dirs: &[PathBuf]) -> Result<PathBuf, AssetError> {
    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| AssetError::NotFound(name.to_string()))
}

/// Loads an image, optionally resized to a `size`×`size` square.
pub fn load_icon(path: &Path, size: Option<u32>) -> Result<Icon, AssetError> {
    let img = image::open(path)
        .map_err(|source| AssetError::Decode { path: path.to_path_buf(), source })?;
    let img = match size {
        Some(size) => img.resize_exact(size, size, FilterType::Lanczos3),
        None => img,
    };
    let rgba = img.into_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Icon { width, height, rgba: rgba.into_raw() })
}

/// Looks up `name` in the usual places and loads it.
pub fn load_named(name: &str, size: Option<u32>) -> Result<Icon, AssetError> {
    let path = find_asset(name, &search_dirs())?;
    load_icon(&path, size)
}

/// Plain square used when the tray icon file is missing.
pub fn solid_icon(size: u32, rgba: [u8; 4]) -> Icon {
    let pixels = (size * size) as usize;
    Icon { width: size, height: size, rgba: rgba.repeat(pixels) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_asset_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_asset("spotify.png", &[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, AssetError::NotFound(ref n) if n == "spotify.png"));
    }

    #[test]
    fn test_load_and_resize_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vlc.png");
        image::RgbaImage::from_pixel(16, 8, image::Rgba([255, 128, 0, 255])).save(&path).unwrap();

        let dirs = [dir.path().join("assets"), dir.path().to_path_buf()];
        let found = find_asset("vlc.png", &dirs).unwrap();
        assert_eq!(found, path);

        let icon = load_icon(&found, Some(BUTTON_ICON_SIZE)).unwrap();
        assert_eq!((icon.width, icon.height), (64, 64));
        assert_eq!(icon.rgba.len(), 64 * 64 * 4);

        let original = load_icon(&found, None).unwrap();
        assert_eq!((original.width, original.height), (16, 8));
    }

    #[test]
    fn test_garbage_file_fails_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.png");
        std::fs::write(&path, b"not a png").unwrap();
        assert!(matches!(load_icon(&path, Some(64)), Err(AssetError::Decode { .. })));
    }

    #[test]
    fn test_solid_icon() {
        let icon = solid_icon(4, [1, 2, 3, 4]);
        assert_eq!(icon.rgba.len(), 64);
        assert_eq!(&icon.rgba[..4], &[1, 2, 3, 4]);
    }
}
