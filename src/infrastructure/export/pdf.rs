//! PDF 导出
//!
//! 使用 lopdf 直接生成 A4 页面。
//! 字体为 Adobe-GB1 预置的 STSong-Light（Type0 + UniGB-UCS2-H），文本按 UTF-16BE 写入，
//! 中英文都能显示，字形由阅读器自带的 CJK 字体提供。

use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::error::ExportError;
use crate::infrastructure::export::decode_image;
use crate::infrastructure::export::markdown::{blocks, Block, TextRun, DIAGRAM_PLACEHOLDER};
use crate::infrastructure::ingestion::ExtractedImage;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
/// 2cm 页边距
const MARGIN: f32 = 56.7;
const BODY_SIZE: f32 = 11.0;
const CODE_SIZE: f32 = 9.5;
const LINE_SPACING: f32 = 1.4;
/// 每级列表缩进（pt）
const LIST_INDENT: f32 = 16.0;
/// 图片最大宽度（pt）
const MAX_IMAGE_WIDTH: f32 = 200.0;

/// 字体资源名
const FONT_REGULAR: &str = "F1";
const FONT_BOLD: &str = "F2";
const FONT_ITALIC: &str = "F3";

/// Adobe-GB1 预置字体，阅读器不需要内嵌字形
const CJK_BASE_FONT: &str = "STSong-Light";
/// Unicode (UCS-2) 到 Adobe-GB1 CID 的预置 CMap
const CJK_ENCODING: &str = "UniGB-UCS2-H";

/// 文本颜色（RGB 0..1）
const COLOR_TEXT: [f32; 3] = [0.0, 0.0, 0.0];
const COLOR_H1: [f32; 3] = [0.173, 0.243, 0.314];
const COLOR_H2: [f32; 3] = [0.204, 0.596, 0.859];
const COLOR_H3: [f32; 3] = [0.333, 0.333, 0.333];
const COLOR_CODE: [f32; 3] = [0.2, 0.2, 0.2];
const COLOR_PLACEHOLDER: [f32; 3] = [0.467, 0.467, 0.467];

pub struct PdfExporter;

impl PdfExporter {
    /// 渲染 PDF 文件内容
    ///
    /// 图片绘制在正文之前。image 能解码的格式都转成 RGB 位图嵌入，解码失败的跳过
    pub fn render(markdown: &str, images: &[ExtractedImage]) -> Result<Vec<u8>, ExportError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut fonts = Dictionary::new();
        for (name, style) in [
            (FONT_REGULAR, FontStyle::Regular),
            (FONT_BOLD, FontStyle::Bold),
            (FONT_ITALIC, FontStyle::Italic),
        ] {
            fonts.set(name, add_cjk_font(&mut doc, style));
        }

        let mut layout = PageLayout::new();
        let mut xobjects = Dictionary::new();
        let mut image_count = 0;
        for image in images {
            let Some(decoded) = decode_image(image) else {
                continue;
            };
            image_count += 1;
            let name = format!("Im{image_count}");
            let (width, height) = (decoded.width(), decoded.height());
            xobjects.set(name.as_str(), doc.add_object(image_xobject(&decoded)?));
            layout.image(&name, width, height);
        }

        for block in blocks(markdown) {
            match block {
                Block::Heading { level, runs } => {
                    let (size, color) = match level {
                        1 => (20.0, COLOR_H1),
                        2 => (16.0, COLOR_H2),
                        _ => (13.0, COLOR_H3),
                    };
                    let runs: Vec<TextRun> = runs
                        .into_iter()
                        .map(|run| TextRun { bold: true, ..run })
                        .collect();
                    layout.gap(size * 0.6);
                    layout.paragraph(&runs, size, color, 0.0);
                    layout.gap(size * 0.3);
                }
                Block::Paragraph(runs) => {
                    layout.paragraph(&runs, BODY_SIZE, COLOR_TEXT, 0.0);
                    layout.gap(BODY_SIZE * 0.4);
                }
                Block::ListItem {
                    marker,
                    depth,
                    runs,
                } => {
                    let mut item = vec![TextRun::plain(format!("{marker} "))];
                    item.extend(runs);
                    layout.paragraph(&item, BODY_SIZE, COLOR_TEXT, LIST_INDENT * depth as f32);
                    layout.gap(BODY_SIZE * 0.2);
                }
                Block::Table { header, rows } => {
                    if !header.is_empty() {
                        let header = TextRun {
                            text: header.join("  |  "),
                            bold: true,
                            italic: false,
                        };
                        layout.paragraph(&[header], BODY_SIZE, COLOR_TEXT, 0.0);
                    }
                    for row in rows {
                        let row = TextRun::plain(row.join("  |  "));
                        layout.paragraph(&[row], BODY_SIZE, COLOR_TEXT, 0.0);
                    }
                    layout.gap(BODY_SIZE * 0.4);
                }
                Block::Code(code) => {
                    for line in code.lines() {
                        let line = TextRun::plain(line);
                        layout.paragraph(&[line], CODE_SIZE, COLOR_CODE, LIST_INDENT);
                    }
                    layout.gap(BODY_SIZE * 0.4);
                }
                Block::DiagramPlaceholder => {
                    let placeholder = TextRun {
                        text: DIAGRAM_PLACEHOLDER.to_string(),
                        bold: false,
                        italic: true,
                    };
                    layout.gap(20.0);
                    layout.centered(&placeholder, BODY_SIZE, COLOR_PLACEHOLDER);
                    layout.gap(20.0);
                }
            }
        }

        let resources_id = doc.add_object(dictionary! {
            "Font" => fonts,
            "XObject" => xobjects,
        });

        let mut kids = Vec::new();
        for operations in layout.finish() {
            let content = Content { operations };
            let encoded = content
                .encode()
                .map_err(|e| ExportError::Render(e.to_string()))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let page_count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0i64.into(), 0i64.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| ExportError::Render(e.to_string()))?;
        Ok(buffer)
    }
}

#[derive(Debug, Clone, Copy)]
enum FontStyle {
    Regular,
    Bold,
    Italic,
}

/// Type0 字体 → CIDFontType0 → FontDescriptor
///
/// 粗体和斜体用 `,Bold` / `,Italic` 后缀交给阅读器合成
fn add_cjk_font(doc: &mut Document, style: FontStyle) -> ObjectId {
    let (base_font, flags, italic_angle) = match style {
        FontStyle::Regular => (CJK_BASE_FONT.to_string(), 6i64, 0i64),
        FontStyle::Bold => (format!("{CJK_BASE_FONT},Bold"), 6 + 262_144, 0),
        FontStyle::Italic => (format!("{CJK_BASE_FONT},Italic"), 6 + 64, -11),
    };

    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => base_font.clone(),
        "Flags" => flags,
        "FontBBox" => vec![(-25i64).into(), (-254i64).into(), 1000i64.into(), 880i64.into()],
        "ItalicAngle" => italic_angle,
        "Ascent" => 880i64,
        "Descent" => -120i64,
        "CapHeight" => 880i64,
        "StemV" => 93i64,
    });

    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType0",
        "BaseFont" => base_font.clone(),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("GB1"),
            "Supplement" => 2i64,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 1000i64,
        // CID 1..95 是半角拉丁字符
        "W" => vec![1i64.into(), 95i64.into(), 500i64.into()],
    });

    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => base_font,
        "Encoding" => CJK_ENCODING,
        "DescendantFonts" => vec![cid_font_id.into()],
    })
}

/// 按 UniGB-UCS2-H 需要的 UTF-16BE 编码文本
fn encode_utf16be(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

/// 解码后的图片统一转成 8 位 RGB 并用 FlateDecode 压缩
fn image_xobject(decoded: &DynamicImage) -> Result<Stream, ExportError> {
    let rgb = decoded.to_rgb8();
    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(rgb.width()),
            "Height" => i64::from(rgb.height()),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
        },
        rgb.into_raw(),
    );
    stream
        .compress()
        .map_err(|e| ExportError::Render(e.to_string()))?;
    Ok(stream)
}

/// 全角字符（中日韩文字、全角标点）按 1 个字号宽，其余按半个字号
fn is_wide(c: char) -> bool {
    u32::from(c) >= 0x2E80
}

fn char_width(c: char, size: f32) -> f32 {
    if is_wide(c) {
        size
    } else {
        size * 0.5
    }
}

fn text_width(text: &str, size: f32) -> f32 {
    text.chars().map(|c| char_width(c, size)).sum()
}

fn font_for(run: &TextRun) -> &'static str {
    match (run.bold, run.italic) {
        (true, _) => FONT_BOLD,
        (false, true) => FONT_ITALIC,
        (false, false) => FONT_REGULAR,
    }
}

/// 同一字体的一段文字
#[derive(Debug, Clone, PartialEq)]
struct Segment {
    font: &'static str,
    text: String,
}

/// 折行的最小单位：一个拉丁单词或一个全角字符
struct Token {
    font: &'static str,
    text: String,
    space_before: bool,
}

fn tokenize(runs: &[TextRun]) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut space_before = false;
    let mut word = String::new();

    for run in runs {
        let font = font_for(run);
        for c in run.text.chars() {
            if c.is_whitespace() || is_wide(c) {
                if !word.is_empty() {
                    tokens.push(Token {
                        font,
                        text: std::mem::take(&mut word),
                        space_before,
                    });
                    space_before = false;
                }
                if c.is_whitespace() {
                    space_before = !tokens.is_empty();
                } else {
                    tokens.push(Token {
                        font,
                        text: c.to_string(),
                        space_before,
                    });
                    space_before = false;
                }
            } else {
                word.push(c);
            }
        }
        if !word.is_empty() {
            tokens.push(Token {
                font,
                text: std::mem::take(&mut word),
                space_before,
            });
            space_before = false;
        }
    }
    tokens
}

/// 按宽度折行，每行是若干同字体片段；超宽的单词按字符硬切
fn wrap_runs(runs: &[TextRun], size: f32, max_width: f32) -> Vec<Vec<Segment>> {
    let mut lines: Vec<Vec<Segment>> = Vec::new();
    let mut line: Vec<Segment> = Vec::new();
    let mut line_width = 0.0;

    let push = |line: &mut Vec<Segment>, font: &'static str, text: &str| match line.last_mut() {
        Some(last) if last.font == font => last.text.push_str(text),
        _ => line.push(Segment {
            font,
            text: text.to_string(),
        }),
    };

    for token in tokenize(runs) {
        let space = if token.space_before && !line.is_empty() {
            char_width(' ', size)
        } else {
            0.0
        };
        let width = text_width(&token.text, size);

        if !line.is_empty() && line_width + space + width > max_width {
            lines.push(std::mem::take(&mut line));
            line_width = 0.0;
        } else if space > 0.0 {
            push(&mut line, token.font, " ");
            line_width += space;
        }

        if width <= max_width {
            push(&mut line, token.font, &token.text);
            line_width += width;
            continue;
        }

        for c in token.text.chars() {
            let w = char_width(c, size);
            if !line.is_empty() && line_width + w > max_width {
                lines.push(std::mem::take(&mut line));
                line_width = 0.0;
            }
            push(&mut line, token.font, c.encode_utf8(&mut [0; 4]));
            line_width += w;
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// 简单的自上而下排版，空间不足时换页
struct PageLayout {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    /// 下一行的顶部位置（PDF 坐标，原点在左下角）
    cursor_y: f32,
}

impl PageLayout {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            cursor_y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn usable_width() -> f32 {
        PAGE_WIDTH - 2.0 * MARGIN
    }

    fn ensure_space(&mut self, height: f32) {
        if self.cursor_y - height < MARGIN && !self.current.is_empty() {
            self.pages.push(std::mem::take(&mut self.current));
            self.cursor_y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn gap(&mut self, height: f32) {
        self.cursor_y -= height;
    }

    fn paragraph(&mut self, runs: &[TextRun], size: f32, color: [f32; 3], indent: f32) {
        let max_width = (Self::usable_width() - indent).max(size);
        for line in wrap_runs(runs, size, max_width) {
            self.line(&line, size, color, MARGIN + indent);
        }
    }

    fn centered(&mut self, run: &TextRun, size: f32, color: [f32; 3]) {
        for line in wrap_runs(std::slice::from_ref(run), size, Self::usable_width()) {
            let width: f32 = line.iter().map(|s| text_width(&s.text, size)).sum();
            let x = MARGIN + (Self::usable_width() - width).max(0.0) / 2.0;
            self.line(&line, size, color, x);
        }
    }

    /// 一行文字放在一个 BT/ET 内，各片段依次 Tj，字体切换用 Tf
    fn line(&mut self, segments: &[Segment], size: f32, color: [f32; 3], x: f32) {
        let line_height = size * LINE_SPACING;
        self.ensure_space(line_height);
        self.cursor_y -= line_height;

        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "rg",
                vec![color[0].into(), color[1].into(), color[2].into()],
            ),
            Operation::new("Td", vec![x.into(), self.cursor_y.into()]),
        ]);
        for segment in segments {
            self.current.extend([
                Operation::new("Tf", vec![segment.font.into(), size.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        encode_utf16be(&segment.text),
                        StringFormat::Hexadecimal,
                    )],
                ),
            ]);
        }
        self.current.push(Operation::new("ET", vec![]));
    }

    fn image(&mut self, name: &str, pixel_width: u32, pixel_height: u32) {
        if pixel_width == 0 || pixel_height == 0 {
            return;
        }
        let width = (pixel_width as f32).min(MAX_IMAGE_WIDTH);
        let height = width * pixel_height as f32 / pixel_width as f32;

        self.ensure_space(height + 10.0);
        self.cursor_y -= height;
        self.current.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0i64.into(),
                    0i64.into(),
                    height.into(),
                    MARGIN.into(),
                    self.cursor_y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ]);
        self.cursor_y -= 10.0;
    }

    /// 结束排版，至少返回一页
    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}
