//! 文档组装

/// 把已生成的章节拼接成完整文档
///
/// 只是生成结果的视图，不保存任何状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAssembler {
    title: String,
}

impl DocumentAssembler {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// 没有任何章节时返回空串，调用方据此跳过导出
    pub fn assemble(&self, bodies: &[String]) -> String {
        if bodies.is_empty() {
            return String::new();
        }
        format!("# {}\n\n{}", self.title, bodies.join("\n\n"))
    }
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::new("Proposal")
    }
}
