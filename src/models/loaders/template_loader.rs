use std::path::Path;

use tokio::fs;
use tracing::info;

use crate::error::IngestionError;
use crate::infrastructure::ingestion::{self, ExtractedImage};

/// 从文件加载的模板
#[derive(Debug, Clone, Default)]
pub struct LoadedTemplate {
    pub text: String,
    /// PDF/DOCX 模板中提取出的图片
    pub images: Vec<ExtractedImage>,
}

/// 从文件加载模板文本
///
/// - `.md` / `.markdown`: 直接读取文本
/// - `.pdf` / `.docx`: 通过文件解析提取文本和图片
/// - 其他扩展名: `UnsupportedFormat`
pub async fn load_template_file(path: &Path) -> Result<LoadedTemplate, IngestionError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let loaded = match extension.as_str() {
        "md" | "markdown" => LoadedTemplate {
            text: fs::read_to_string(path).await?,
            images: Vec::new(),
        },
        _ => {
            let document = ingestion::extract_file(path)?;
            LoadedTemplate {
                text: document.text,
                images: document.images,
            }
        }
    };

    info!(
        "📋 已加载模板文件: {} ({} 字符)",
        path.display(),
        loaded.text.chars().count()
    );
    Ok(loaded)
}
