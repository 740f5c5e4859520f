//! 基础设施层
//!
//! 文件解析、图片落盘和文档导出，只暴露能力，不关心生成流程

pub mod export;
pub mod image_store;
pub mod ingestion;

pub use export::{export_all, ExportedFiles};
pub use image_store::ImageStore;
pub use ingestion::{
    detect_format, extract_bytes, extract_file, DocumentFormat, ExtractedDocument, ExtractedImage,
};
