//! 图片存储 - 基础设施层
//!
//! 提取与落盘分离：解析只返回内存中的图片，
//! 需要文件时再显式调用 [`ImageStore::persist`]

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::infrastructure::ingestion::{DocumentFormat, ExtractedImage};

/// 图片存储目录
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 将图片写入存储目录，返回写入的文件路径（与输入顺序一致）
    ///
    /// 文件名形如 `pdf_image_20250101_120000_0.jpg`
    pub fn persist(&self, images: &[ExtractedImage]) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.dir)?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let mut paths = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            let file_name = format!(
                "{}_image_{}_{}.{}",
                image.source.as_str(),
                stamp,
                index,
                image.extension
            );
            let path = self.dir.join(file_name);
            std::fs::write(&path, &image.bytes)?;
            debug!("写入图片: {}", path.display());
            paths.push(path);
        }

        info!("🖼️ 已保存 {} 张图片到 {}", paths.len(), self.dir.display());
        Ok(paths)
    }

    /// 删除存储目录中由 [`ImageStore::persist`] 写入的图片，目录不存在时直接返回
    ///
    /// 只匹配 `pdf_image_` / `docx_image_` 前缀的文件，目录里的其他文件保持不变
    pub fn clear(&self) -> std::io::Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && is_persisted_image(&path) {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        debug!("清理图片目录 {}: 删除 {} 个文件", self.dir.display(), removed);
        Ok(removed)
    }
}

fn is_persisted_image(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    [DocumentFormat::Pdf, DocumentFormat::Docx]
        .iter()
        .any(|format| name.starts_with(&format!("{}_image_", format.as_str())))
}
