//! DOCX 导出
//!
//! 直接拼装最小的 WordprocessingML 包：正文、样式、关系文件和图片

use std::io::{Cursor, Write};

use quick_xml::escape::escape;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ExportError;
use crate::infrastructure::export::decode_image;
use crate::infrastructure::export::markdown::{blocks, Block, TextRun, DIAGRAM_PLACEHOLDER};
use crate::infrastructure::ingestion::ExtractedImage;

/// 图片固定宽度（EMU）
const IMAGE_WIDTH_EMU: u64 = 2_000_000;

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Default Extension="png" ContentType="image/png"/>
<Default Extension="jpeg" ContentType="image/jpeg"/>
<Default Extension="jpg" ContentType="image/jpeg"/>
<Default Extension="gif" ContentType="image/gif"/>
<Default Extension="bmp" ContentType="image/bmp"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
<Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>
</Types>"#;

const PACKAGE_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:rPr><w:sz w:val="22"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:color w:val="2C3E50"/><w:sz w:val="36"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:outlineLvl w:val="1"/></w:pPr><w:rPr><w:b/><w:color w:val="3498DB"/><w:sz w:val="30"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading3"><w:name w:val="heading 3"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:outlineLvl w:val="2"/></w:pPr><w:rPr><w:b/><w:color w:val="555555"/><w:sz w:val="26"/></w:rPr></w:style>
</w:styles>"#;

/// Word 能直接显示的图片格式
const WORD_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

pub struct DocxExporter;

impl DocxExporter {
    /// 渲染 DOCX 文件内容
    ///
    /// 图片按顺序放在正文之前，Word 不支持的格式跳过
    pub fn render(markdown: &str, images: &[ExtractedImage]) -> Result<Vec<u8>, ExportError> {
        let images: Vec<&ExtractedImage> = images
            .iter()
            .filter(|img| WORD_IMAGE_EXTENSIONS.contains(&img.extension.as_str()))
            .collect();

        let mut body = String::new();
        for (index, image) in images.iter().enumerate() {
            body.push_str(&picture_paragraph(index + 1, image));
        }
        for block in blocks(markdown) {
            body.push_str(&block_paragraph(&block));
        }

        let document_xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><w:body>{body}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1134" w:right="1134" w:bottom="1134" w:left="1134" w:header="708" w:footer="708" w:gutter="0"/></w:sectPr></w:body></w:document>"#
        );

        let mut relationships = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rIdStyles" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
        );
        for (index, image) in images.iter().enumerate() {
            relationships.push_str(&format!(
                r#"<Relationship Id="rIdImage{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/{name}"/>"#,
                n = index + 1,
                name = media_name(index + 1, image),
            ));
        }
        relationships.push_str("</Relationships>");

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut buffer);
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

            let mut add = |name: &str, bytes: &[u8]| -> Result<(), ExportError> {
                writer
                    .start_file(name, options)
                    .map_err(|e| ExportError::Render(e.to_string()))?;
                writer.write_all(bytes)?;
                Ok(())
            };

            add("[Content_Types].xml", CONTENT_TYPES_XML.as_bytes())?;
            add("_rels/.rels", PACKAGE_RELS_XML.as_bytes())?;
            add("word/document.xml", document_xml.as_bytes())?;
            add("word/styles.xml", STYLES_XML.as_bytes())?;
            add("word/_rels/document.xml.rels", relationships.as_bytes())?;
            for (index, image) in images.iter().enumerate() {
                add(&format!("word/media/{}", media_name(index + 1, image)), &image.bytes)?;
            }

            writer
                .finish()
                .map_err(|e| ExportError::Render(e.to_string()))?;
        }

        Ok(buffer.into_inner())
    }
}

fn media_name(n: usize, image: &ExtractedImage) -> String {
    format!("image{}.{}", n, image.extension)
}

/// 表格边框（单线，灰色）
const TABLE_BORDERS: &str = r#"<w:tblBorders><w:top w:val="single" w:sz="4" w:space="0" w:color="999999"/><w:left w:val="single" w:sz="4" w:space="0" w:color="999999"/><w:bottom w:val="single" w:sz="4" w:space="0" w:color="999999"/><w:right w:val="single" w:sz="4" w:space="0" w:color="999999"/><w:insideH w:val="single" w:sz="4" w:space="0" w:color="999999"/><w:insideV w:val="single" w:sz="4" w:space="0" w:color="999999"/></w:tblBorders>"#;

fn block_paragraph(block: &Block) -> String {
    match block {
        Block::Heading { level, runs } => format!(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading{}"/></w:pPr>{}</w:p>"#,
            (*level).clamp(1, 3),
            text_runs(runs)
        ),
        Block::Paragraph(runs) => format!("<w:p>{}</w:p>", text_runs(runs)),
        Block::ListItem {
            marker,
            depth,
            runs,
        } => format!(
            r#"<w:p><w:pPr><w:ind w:left="{}" w:hanging="360"/></w:pPr>{}{}</w:p>"#,
            360 * (depth + 1),
            text_run(&TextRun::plain(format!("{marker} "))),
            text_runs(runs)
        ),
        Block::Table { header, rows } => table(header, rows),
        Block::Code(code) => {
            let lines: Vec<String> = code
                .lines()
                .map(|line| format!(r#"<w:t xml:space="preserve">{}</w:t>"#, escape(line)))
                .collect();
            format!(
                r#"<w:p><w:r><w:rPr><w:rFonts w:ascii="Courier New" w:hAnsi="Courier New"/></w:rPr>{}</w:r></w:p>"#,
                lines.join("<w:br/>")
            )
        }
        Block::DiagramPlaceholder => format!(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:i/><w:color w:val="777777"/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
            DIAGRAM_PLACEHOLDER
        ),
    }
}

fn text_runs(runs: &[TextRun]) -> String {
    runs.iter().map(text_run).collect()
}

fn text_run(run: &TextRun) -> String {
    let mut properties = String::new();
    if run.bold {
        properties.push_str("<w:b/>");
    }
    if run.italic {
        properties.push_str("<w:i/>");
    }
    if !properties.is_empty() {
        properties = format!("<w:rPr>{properties}</w:rPr>");
    }
    format!(
        r#"<w:r>{properties}<w:t xml:space="preserve">{}</w:t></w:r>"#,
        escape(run.text.as_str())
    )
}

/// 表头加粗，表格后补一个空段落
fn table(header: &[String], rows: &[Vec<String>]) -> String {
    let columns = std::iter::once(header)
        .chain(rows.iter().map(Vec::as_slice))
        .map(<[String]>::len)
        .max()
        .unwrap_or(0);
    if columns == 0 {
        return String::new();
    }

    let row_xml = |cells: &[String], bold: bool| -> String {
        let cells: String = (0..columns)
            .map(|i| {
                let run = TextRun {
                    text: cells.get(i).cloned().unwrap_or_default(),
                    bold,
                    italic: false,
                };
                format!("<w:tc><w:p>{}</w:p></w:tc>", text_run(&run))
            })
            .collect();
        format!("<w:tr>{cells}</w:tr>")
    };

    let mut xml = format!(
        r#"<w:tbl><w:tblPr><w:tblW w:w="0" w:type="auto"/>{TABLE_BORDERS}</w:tblPr><w:tblGrid>{}</w:tblGrid>"#,
        r#"<w:gridCol/>"#.repeat(columns)
    );
    if !header.is_empty() {
        xml.push_str(&row_xml(header, true));
    }
    for row in rows {
        xml.push_str(&row_xml(row, false));
    }
    xml.push_str("</w:tbl><w:p/>");
    xml
}

/// 固定宽度的内嵌图片，高度按原图比例计算，读不到尺寸时按 4:3
fn picture_paragraph(n: usize, image: &ExtractedImage) -> String {
    let height = decode_image(image)
        .map(|decoded| {
            IMAGE_WIDTH_EMU * u64::from(decoded.height()) / u64::from(decoded.width())
        })
        .unwrap_or(IMAGE_WIDTH_EMU * 3 / 4);
    let name = media_name(n, image);

    format!(
        r#"<w:p><w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0"><wp:extent cx="{w}" cy="{h}"/><wp:docPr id="{n}" name="Picture {n}"/><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:pic><pic:nvPicPr><pic:cNvPr id="{n}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr><pic:blipFill><a:blip r:embed="rIdImage{n}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill><pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{w}" cy="{h}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#,
        w = IMAGE_WIDTH_EMU,
        h = height,
    )
}
