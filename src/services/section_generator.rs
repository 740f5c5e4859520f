//! 章节生成服务 - 业务能力层
//!
//! 只负责"为一个章节生成内容"能力，不关心章节顺序和会话状态
//!
//! 两种策略：
//! - 流程图章节：根据需求生成 mermaid 流程图，失败时回退为模板原文并给出警告
//! - 普通章节：结合需求和检索到的上下文生成正文，失败直接返回错误

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::clients::LanguageModel;
use crate::error::{LlmError, SessionError};
use crate::models::{Section, SectionClassifier, SectionKind};
use crate::services::prompts;

/// mermaid 流程图必须以此开头
pub const DIAGRAM_HEADER: &str = "graph TD";

/// 部分模型会输出 `<think>...</think>` 推理过程
static THINK_TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").ok());

/// 流程图生成失败的警告（不影响生成流程）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramWarning {
    pub section: String,
    pub message: String,
}

impl fmt::Display for DiagramWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "生成章节 '{}' 的流程图失败: {}，已使用模板默认内容",
            self.section, self.message
        )
    }
}

/// 单个章节的生成结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSection {
    pub content: String,
    pub kind: SectionKind,
    pub warning: Option<DiagramWarning>,
}

/// 章节生成器
#[derive(Debug, Clone, Default)]
pub struct SectionGenerator {
    classifier: SectionClassifier,
}

impl SectionGenerator {
    pub fn new(classifier: SectionClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &SectionClassifier {
        &self.classifier
    }

    /// 生成一个章节的完整内容（含标题行）
    ///
    /// # 参数
    /// - `section`: 模板章节
    /// - `requirements`: 项目需求
    /// - `context`: 知识库检索到的相关内容（可为空）
    /// - `llm`: 文本生成能力
    ///
    /// # 返回
    /// 流程图章节总是成功（失败时带警告回退为模板原文）；
    /// 普通章节在模型调用失败或返回空内容时返回 [`SessionError::Generation`]
    pub async fn generate(
        &self,
        section: &Section,
        requirements: &str,
        context: &str,
        llm: &dyn LanguageModel,
    ) -> Result<GeneratedSection, SessionError> {
        match self.classifier.classify(&section.title) {
            SectionKind::Diagram => Ok(self.generate_diagram(section, requirements, llm).await),
            SectionKind::Standard => self
                .generate_standard(section, requirements, context, llm)
                .await
                .map_err(|source| SessionError::Generation {
                    section: section.title.clone(),
                    source,
                }),
        }
    }

    async fn generate_diagram(
        &self,
        section: &Section,
        requirements: &str,
        llm: &dyn LanguageModel,
    ) -> GeneratedSection {
        info!("📈 生成流程图: {}", section.title);

        let result = llm
            .invoke(&prompts::workflow_prompt(requirements))
            .await
            .and_then(|raw| {
                normalize_diagram(&raw).ok_or_else(|| LlmError::EmptyContent {
                    model: llm.model_name().to_string(),
                })
            });

        match result {
            Ok(diagram) => GeneratedSection {
                content: format!("## {}\n\n```mermaid\n{}\n```", section.title, diagram),
                kind: SectionKind::Diagram,
                warning: None,
            },
            Err(e) => {
                let warning = DiagramWarning {
                    section: section.title.clone(),
                    message: e.to_string(),
                };
                warn!("⚠️ {}", warning);
                GeneratedSection {
                    content: section.raw_content.clone(),
                    kind: SectionKind::Diagram,
                    warning: Some(warning),
                }
            }
        }
    }

    async fn generate_standard(
        &self,
        section: &Section,
        requirements: &str,
        context: &str,
        llm: &dyn LanguageModel,
    ) -> Result<GeneratedSection, LlmError> {
        info!("📝 生成章节: {}", section.title);

        let placeholder = section.placeholder_body();
        let prompt = prompts::section_prompt(&section.title, &placeholder, requirements, context);
        debug!(
            "章节提示词长度: {} 字符，上下文长度: {} 字符",
            prompt.chars().count(),
            context.chars().count()
        );

        let raw = llm.invoke(&prompt).await?;
        let body = clean_model_output(&raw);
        if body.is_empty() {
            return Err(LlmError::EmptyContent {
                model: llm.model_name().to_string(),
            });
        }

        Ok(GeneratedSection {
            content: format!("{}\n\n{}", section.heading_line(), body),
            kind: SectionKind::Standard,
            warning: None,
        })
    }
}

/// 删除所有完整的 `<think>...</think>` 片段
///
/// 只有开始标签没有结束标签时原样保留
pub fn strip_think_tags(text: &str) -> String {
    match THINK_TAG.as_ref() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// 删除推理片段并去掉首尾空白
pub fn clean_model_output(raw: &str) -> String {
    strip_think_tags(raw.trim()).trim().to_string()
}

/// 清理模型输出并补齐 `graph TD` 头，内容为空时返回 None
pub fn normalize_diagram(raw: &str) -> Option<String> {
    let diagram = clean_model_output(raw);
    if diagram.is_empty() {
        None
    } else if diagram.starts_with(DIAGRAM_HEADER) {
        Some(diagram)
    } else {
        Some(format!("{DIAGRAM_HEADER}\n{diagram}"))
    }
}
