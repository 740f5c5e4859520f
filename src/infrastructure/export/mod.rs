//! 文档导出 - 基础设施层
//!
//! 同一份 Markdown 提案渲染成 DOCX 和 PDF 两种格式。
//! 两种格式都只插入前几张提取图片，mermaid 代码块统一替换为占位文字。

pub mod docx;
pub mod markdown;
pub mod pdf;

use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::{info, warn};

use crate::error::ExportError;
use crate::infrastructure::ingestion::ExtractedImage;

pub use docx::DocxExporter;
pub use markdown::{blocks, plain_text, Block, TextRun, DIAGRAM_PLACEHOLDER};
pub use pdf::PdfExporter;

/// DOCX 导出文件名
pub const DOCX_FILE_NAME: &str = "proposal_final.docx";
/// PDF 导出文件名
pub const PDF_FILE_NAME: &str = "proposal_final.pdf";

/// 导出结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub docx: PathBuf,
    pub pdf: PathBuf,
}

/// 将提案同时导出为 DOCX 和 PDF
///
/// 两个文件都先在内存中完整渲染，成功后才一次性写入磁盘
pub fn export_all(
    markdown: &str,
    images: &[ExtractedImage],
    max_images: usize,
    dir: &Path,
) -> Result<ExportedFiles, ExportError> {
    let images = &images[..images.len().min(max_images)];

    let docx_bytes = DocxExporter::render(markdown, images)?;
    let pdf_bytes = PdfExporter::render(markdown, images)?;

    std::fs::create_dir_all(dir)?;
    let files = ExportedFiles {
        docx: dir.join(DOCX_FILE_NAME),
        pdf: dir.join(PDF_FILE_NAME),
    };
    std::fs::write(&files.docx, docx_bytes)?;
    std::fs::write(&files.pdf, pdf_bytes)?;

    info!(
        "📥 提案已导出: {} / {}",
        files.docx.display(),
        files.pdf.display()
    );
    Ok(files)
}

/// 用 image 解码提取出的图片，无法识别的数据返回 None 并记录警告
pub fn decode_image(image: &ExtractedImage) -> Option<DynamicImage> {
    match image::load_from_memory(&image.bytes) {
        Ok(decoded) if decoded.width() > 0 && decoded.height() > 0 => Some(decoded),
        Ok(_) => None,
        Err(e) => {
            warn!("⚠️ 跳过无法解码的图片 ({}): {}", image.extension, e);
            None
        }
    }
}
