//! 章节生成会话 - 流程层
//!
//! 核心职责：按模板顺序逐个生成章节，并记录生成结果
//!
//! 状态：
//! - `Empty`: 没有可生成的章节
//! - `Pending`: 还有章节未生成
//! - `Complete`: 所有章节已生成
//!
//! 游标就是已生成章节的数量，两者不可能出现不一致

use std::fmt;

use tracing::{debug, warn};

use crate::clients::LanguageModel;
use crate::error::SessionError;
use crate::models::{Section, Template};
use crate::services::{DiagramWarning, SectionGenerator};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Pending { cursor: usize, total: usize },
    Complete { total: usize },
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Empty => write!(f, "未加载可生成的模板"),
            SessionState::Pending { cursor, total } => {
                write!(f, "已生成 {}/{} 个章节", cursor, total)
            }
            SessionState::Complete { total } => write!(f, "全部 {} 个章节已生成", total),
        }
    }
}

/// 一次成功生成的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// 章节序号（从 0 开始）
    pub index: usize,
    pub total: usize,
    pub title: String,
    pub content: String,
    /// 流程图章节回退为模板内容时的警告
    pub warning: Option<DiagramWarning>,
}

impl StepOutcome {
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total
    }
}

/// 章节生成会话
///
/// - 模板变化时整体替换章节列表并清空生成结果
/// - 每次成功的 `advance` 只追加一个章节
/// - 任何失败都不会修改会话状态
#[derive(Debug, Clone, Default)]
pub struct GenerationSession {
    template: Template,
    generated: Vec<String>,
    generator: SectionGenerator,
}

impl GenerationSession {
    pub fn new(generator: SectionGenerator) -> Self {
        Self {
            template: Template::default(),
            generated: Vec::new(),
            generator,
        }
    }

    /// 解析并加载模板，返回章节数
    ///
    /// 总是清空已生成的内容
    pub fn load_template(&mut self, text: &str) -> usize {
        self.load_parsed(Template::parse(text))
    }

    /// 加载已解析的模板
    pub fn load_parsed(&mut self, template: Template) -> usize {
        self.template = template;
        self.generated.clear();
        self.template.len()
    }

    pub fn state(&self) -> SessionState {
        let total = self.total();
        let cursor = self.cursor();
        if total == 0 {
            SessionState::Empty
        } else if cursor < total {
            SessionState::Pending { cursor, total }
        } else {
            SessionState::Complete { total }
        }
    }

    pub fn generator(&self) -> &SectionGenerator {
        &self.generator
    }

    pub fn sections(&self) -> &[Section] {
        self.template.sections()
    }

    pub fn generated_bodies(&self) -> &[String] {
        &self.generated
    }

    /// 下一个待生成章节的序号
    pub fn cursor(&self) -> usize {
        self.generated.len()
    }

    pub fn total(&self) -> usize {
        self.template.len()
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state(), SessionState::Complete { .. })
    }

    /// 下一个待生成的章节
    pub fn current_section(&self) -> Option<&Section> {
        self.template.get(self.cursor())
    }

    /// 最近一个已生成章节的内容
    pub fn last_generated(&self) -> Option<&str> {
        self.generated.last().map(String::as_str)
    }

    /// 生成下一个章节
    ///
    /// # 参数
    /// - `requirements`: 项目需求，不能为空
    /// - `context`: 检索到的相关内容
    /// - `llm`: 文本生成能力
    ///
    /// # 错误
    /// - `NotReady`: 需求为空
    /// - `NothingToGenerate`: 模板没有章节
    /// - `Done`: 已全部生成
    /// - `Generation`: 普通章节生成失败
    pub async fn advance(
        &mut self,
        requirements: &str,
        context: &str,
        llm: &dyn LanguageModel,
    ) -> Result<StepOutcome, SessionError> {
        if requirements.trim().is_empty() {
            return Err(SessionError::NotReady("请先提供项目需求".to_string()));
        }

        let total = self.total();
        let index = self.cursor();
        let section = match self.state() {
            SessionState::Empty => return Err(SessionError::NothingToGenerate),
            SessionState::Complete { total } => return Err(SessionError::Done { total }),
            SessionState::Pending { .. } => self
                .template
                .get(index)
                .ok_or(SessionError::Done { total })?,
        };

        debug!("✍️ 生成第 {}/{} 个章节: {}", index + 1, total, section.title);
        let generated = self
            .generator
            .generate(section, requirements, context, llm)
            .await?;
        let title = section.title.clone();

        self.generated.push(generated.content.clone());

        Ok(StepOutcome {
            index,
            total,
            title,
            content: generated.content,
            warning: generated.warning,
        })
    }

    /// 清空已生成的章节，保留模板
    pub fn reset(&mut self) -> Result<(), SessionError> {
        if self.generated.is_empty() {
            return Err(SessionError::NothingToReset);
        }
        warn!("🔄 清空已生成的 {} 个章节", self.generated.len());
        self.generated.clear();
        Ok(())
    }

    /// 用人工编辑后的内容覆盖最近一个已生成章节
    pub fn edit_current(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        let last = self
            .generated
            .last_mut()
            .ok_or(SessionError::NothingToEdit)?;
        *last = text.into();
        Ok(())
    }
}
