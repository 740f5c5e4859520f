//! 提案章节

use serde::{Deserialize, Serialize};

/// 模板中的一个章节
///
/// `title` 为二级标题去掉 `## ` 后的文本，`raw_content` 保留标题行和占位正文的原始内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub raw_content: String,
}

impl Section {
    /// 标题行（`raw_content` 去掉首尾空白后的第一行）
    pub fn heading_line(&self) -> &str {
        self.raw_content.trim().lines().next().unwrap_or_default()
    }

    /// 占位正文（标题行之后的所有行）
    pub fn placeholder_body(&self) -> String {
        self.raw_content
            .trim()
            .lines()
            .skip(1)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 章节生成策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// 生成 mermaid 流程图
    Diagram,
    /// 生成正文
    Standard,
}

/// 章节分类器
///
/// 标题中包含任一标记（区分大小写的子串匹配）即为流程图章节。
/// 这是一个纯粹按标题文本的规则，不识别同义词或其他语言的写法，需要时通过配置增加标记。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionClassifier {
    diagram_markers: Vec<String>,
}

impl SectionClassifier {
    pub fn new(diagram_markers: Vec<String>) -> Self {
        Self { diagram_markers }
    }

    /// 判断章节的生成策略
    pub fn classify(&self, title: &str) -> SectionKind {
        if self
            .diagram_markers
            .iter()
            .any(|marker| !marker.is_empty() && title.contains(marker.as_str()))
        {
            SectionKind::Diagram
        } else {
            SectionKind::Standard
        }
    }
}

impl Default for SectionClassifier {
    fn default() -> Self {
        Self::new(vec!["Workflow".to_string()])
    }
}
