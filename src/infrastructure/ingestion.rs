//! 文件解析 - 基础设施层
//!
//! 只负责"从 PDF / DOCX 中提取文本和图片"能力，结果全部保存在内存中，
//! 图片落盘由 [`ImageStore`](crate::infrastructure::ImageStore) 单独负责。

use std::io::{Read, Seek, Write};
use std::path::Path;

use lopdf::{Document, Object};
use phf::phf_map;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, info, warn};

use crate::error::IngestionError;

/// 支持的文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// 标准扩展名，也用作图片文件名前缀
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
        }
    }
}

static SUPPORTED_FORMATS: phf::Map<&'static str, DocumentFormat> = phf_map! {
    "pdf" => DocumentFormat::Pdf,
    "docx" => DocumentFormat::Docx,
};

/// 提取出的图片（仅在内存中）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    /// 来源文件格式
    pub source: DocumentFormat,
    /// 图片扩展名（不含点）
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// 文件提取结果
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pub text: String,
    pub images: Vec<ExtractedImage>,
}

/// 根据扩展名判断文件格式（不区分大小写）
pub fn detect_format(path: &Path) -> Result<DocumentFormat, IngestionError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    SUPPORTED_FORMATS
        .get(extension.as_str())
        .copied()
        .ok_or(IngestionError::UnsupportedFormat { extension })
}

/// 提取磁盘文件中的文本和图片
pub fn extract_file(path: &Path) -> Result<ExtractedDocument, IngestionError> {
    let format = detect_format(path)?;
    info!("📄 正在提取: {}", path.display());

    let document = match format {
        DocumentFormat::Pdf => extract_pdf(path)?,
        DocumentFormat::Docx => extract_docx(path)?,
    };

    debug!(
        "提取完成: {} 字符, {} 张图片",
        document.text.chars().count(),
        document.images.len()
    );
    Ok(document)
}

/// 提取上传内容中的文本和图片
///
/// 内容先写入带原扩展名的临时文件，临时文件在任何退出路径上都会被删除
pub fn extract_bytes(file_name: &str, bytes: &[u8]) -> Result<ExtractedDocument, IngestionError> {
    let format = detect_format(Path::new(file_name))?;

    let mut staged = tempfile::Builder::new()
        .prefix("upload_")
        .suffix(&format!(".{}", format.as_str()))
        .tempfile()?;
    staged.write_all(bytes)?;
    staged.flush()?;

    extract_file(staged.path())
}

// ========== PDF ==========

fn extract_pdf(path: &Path) -> Result<ExtractedDocument, IngestionError> {
    let display = path.display().to_string();
    let doc = Document::load(path).map_err(|e| IngestionError::extraction_failed(&display, e))?;

    let mut pages = Vec::new();
    for page_number in doc.get_pages().keys() {
        let content = doc
            .extract_text(&[*page_number])
            .map_err(|e| IngestionError::extraction_failed(&display, e))?;
        pages.push(content);
    }

    let images = pdf_images(&doc);

    Ok(ExtractedDocument {
        text: pages.join("\n\n"),
        images,
    })
}

/// 收集 PDF 中可以直接作为图片文件保存的图像对象
///
/// 只有 DCTDecode (JPEG) 和 JPXDecode (JPEG 2000) 的数据流本身就是完整的图片文件，
/// 其他编码需要重新封装，直接跳过
fn pdf_images(doc: &Document) -> Vec<ExtractedImage> {
    let mut images = Vec::new();
    let mut skipped = 0usize;

    for object in doc.objects.values() {
        let Object::Stream(stream) = object else {
            continue;
        };
        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|name| name == b"Image")
            .unwrap_or(false);
        if !is_image {
            continue;
        }

        let filters: Vec<&[u8]> = match stream.dict.get(b"Filter") {
            Ok(Object::Name(name)) => vec![name.as_slice()],
            Ok(Object::Array(items)) => items.iter().filter_map(|o| o.as_name().ok()).collect(),
            _ => Vec::new(),
        };

        let extension = match filters.last().copied() {
            Some(b"DCTDecode") => "jpg",
            Some(b"JPXDecode") => "jp2",
            _ => {
                skipped += 1;
                continue;
            }
        };
        // 外层还有其他压缩时数据不是图片文件本身
        if filters.len() > 1 {
            skipped += 1;
            continue;
        }

        images.push(ExtractedImage {
            source: DocumentFormat::Pdf,
            extension: extension.to_string(),
            bytes: stream.content.clone(),
        });
    }

    if skipped > 0 {
        warn!("⚠️ PDF 中有 {} 张图片编码不受支持，已跳过", skipped);
    }
    images
}

// ========== DOCX ==========

fn extract_docx(path: &Path) -> Result<ExtractedDocument, IngestionError> {
    let display = path.display().to_string();
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(std::io::BufReader::new(file))
        .map_err(|e| IngestionError::extraction_failed(&display, e))?;

    let xml = read_entry_to_string(&mut archive, "word/document.xml")
        .map_err(|e| IngestionError::extraction_failed(&display, e))?;
    let paragraphs = parse_document_xml(&xml)
        .map_err(|e| IngestionError::extraction_failed(&display, e))?;

    // 图片提取失败时只保留文本
    let images = match docx_images(&mut archive) {
        Ok(images) => images,
        Err(e) => {
            warn!("⚠️ DOCX 图片提取失败: {}，仅提取文本", e);
            Vec::new()
        }
    };

    Ok(ExtractedDocument {
        text: paragraphs.join("\n"),
        images,
    })
}

fn read_entry_to_string<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<String, String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| format!("找不到 {name}: {e}"))?;
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| e.to_string())?;
    Ok(content)
}

/// 按段落提取 document.xml 中的文本
///
/// 段落内的 `w:tab` / `w:br` 分别还原为制表符和换行，空段落保留为空行
fn parse_document_xml(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    // 同一段落的多个 run 之间的空格需要保留，否则 "## " 会和标题粘在一起
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_text = true,
                b"w:p" => current.clear(),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                b"w:p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e.unescape().map_err(|e| e.to_string())?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML 解析失败: {e}")),
            _ => {}
        }
    }

    Ok(paragraphs)
}

fn docx_images<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<ExtractedImage>, zip::result::ZipError> {
    let mut images = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        if !name.starts_with("word/media/") || entry.is_dir() {
            continue;
        }

        let extension = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png")
            .to_ascii_lowercase();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;

        images.push(ExtractedImage {
            source: DocumentFormat::Docx,
            extension,
            bytes,
        });
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::write::SimpleFileOptions;

    /// 构造一个只包含正文和一张图片的最小 DOCX
    fn build_docx(document_xml: &str) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            writer.start_file("word/media/image1.PNG", options).unwrap();
            writer.write_all(&[0x89, b'P', b'N', b'G']).unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t xml:space="preserve">## </w:t></w:r><w:r><w:t>Scope</w:t></w:r></w:p>
<w:p><w:r><w:t>Define &amp; deliver</w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn test_detect_format() {
        assert_eq!(
            detect_format(Path::new("a/b/report.PDF")).unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            detect_format(Path::new("brief.docx")).unwrap(),
            DocumentFormat::Docx
        );
        match detect_format(Path::new("notes.txt")) {
            Err(IngestionError::UnsupportedFormat { extension }) => assert_eq!(extension, "txt"),
            other => panic!("应为 UnsupportedFormat，实际: {:?}", other),
        }
        assert!(matches!(
            detect_format(Path::new("no_extension")),
            Err(IngestionError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_parse_document_xml_keeps_run_spacing() {
        let paragraphs = parse_document_xml(DOCUMENT_XML).unwrap();
        assert_eq!(paragraphs, vec!["## Scope", "Define & deliver", "", "a\tb"]);
    }

    #[test]
    fn test_extract_docx_bytes() {
        let bytes = build_docx(DOCUMENT_XML);
        let document = extract_bytes("upload.docx", &bytes).unwrap();

        assert_eq!(document.text, "## Scope\nDefine & deliver\n\na\tb");
        assert_eq!(document.images.len(), 1);
        assert_eq!(document.images[0].extension, "png");
        assert_eq!(document.images[0].source, DocumentFormat::Docx);
    }

    #[test]
    fn test_extract_bytes_rejects_unsupported_before_staging() {
        let result = extract_bytes("requirements.txt", b"plain text");
        assert!(matches!(
            result,
            Err(IngestionError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_corrupt_docx_is_extraction_failure() {
        let result = extract_bytes("broken.docx", b"not a zip archive");
        assert!(matches!(
            result,
            Err(IngestionError::ExtractionFailed { .. })
        ));
    }
}
