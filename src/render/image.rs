//! 精灵图像句柄与加载
//!
//! 粒子只持有 [`ImageHandle`]；像素数据归宿主所有。
//! [`ImageRegistry`] 是默认的 [`ImageLoader`] 实现，按 ID 去重，
//! 读取文件头获得尺寸，用于精灵粒子的初始大小。

use crate::core::{ParticleError, ParticleResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 不透明的图像句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageHandle(pub u32);

/// 已注册图像的信息
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub handle: ImageHandle,
    pub width: u32,
    pub height: u32,
    pub path: Option<PathBuf>,
}

/// 图像加载接口
pub trait ImageLoader {
    /// 按 ID 加载；同一 ID 重复加载返回同一句柄
    fn load_image(&mut self, id: &str, path: &Path) -> ParticleResult<ImageHandle>;

    fn image_info(&self, handle: ImageHandle) -> Option<&ImageInfo>;
}

/// 默认图像注册表
#[derive(Debug, Default)]
pub struct ImageRegistry {
    by_id: HashMap<String, ImageHandle>,
    infos: HashMap<ImageHandle, ImageInfo>,
    next_handle: u32,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册宿主已加载的图像（不读文件）
    pub fn register(&mut self, id: &str, width: u32, height: u32) -> ImageHandle {
        if let Some(handle) = self.by_id.get(id) {
            return *handle;
        }
        self.insert(id, width, height, None)
    }

    pub fn get(&self, id: &str) -> Option<ImageHandle> {
        self.by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    fn insert(&mut self, id: &str, width: u32, height: u32, path: Option<PathBuf>) -> ImageHandle {
        self.next_handle += 1;
        let handle = ImageHandle(self.next_handle);
        self.by_id.insert(id.to_string(), handle);
        self.infos.insert(
            handle,
            ImageInfo {
                handle,
                width,
                height,
                path,
            },
        );
        handle
    }
}

impl ImageLoader for ImageRegistry {
    fn load_image(&mut self, id: &str, path: &Path) -> ParticleResult<ImageHandle> {
        if let Some(handle) = self.by_id.get(id) {
            return Ok(*handle);
        }
        let (width, height) =
            image::image_dimensions(path).map_err(|e| ParticleError::ImageLoad {
                id: id.to_string(),
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(
            target: "particles::render",
            "Loaded particle image '{}' ({}x{}) from {}",
            id,
            width,
            height,
            path.display()
        );
        Ok(self.insert(id, width, height, Some(path.to_path_buf())))
    }

    fn image_info(&self, handle: ImageHandle) -> Option<&ImageInfo> {
        self.infos.get(&handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_image_reads_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spark.png");
        image::RgbaImage::new(4, 2).save(&path).unwrap();

        let mut registry = ImageRegistry::new();
        let handle = registry.load_image("spark", &path).unwrap();
        let info = registry.image_info(handle).unwrap();
        assert_eq!((info.width, info.height), (4, 2));

        // 同一 ID 不会重复加载
        let again = registry.load_image("spark", Path::new("/does/not/exist.png")).unwrap();
        assert_eq!(again, handle);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_file_is_error() {
        let mut registry = ImageRegistry::new();
        let result = registry.load_image("smoke", Path::new("/does/not/exist.png"));
        assert!(matches!(result, Err(ParticleError::ImageLoad { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_host_image() {
        let mut registry = ImageRegistry::new();
        let a = registry.register("a", 16, 16);
        let b = registry.register("b", 8, 8);
        assert_ne!(a, b);
        assert_eq!(registry.register("a", 1, 1), a);
        assert_eq!(registry.get("b"), Some(b));
    }
}
