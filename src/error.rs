use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 生成会话错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 文件解析错误
    #[error("文件错误: {0}")]
    Ingestion(#[from] IngestionError),
    /// 知识库错误
    #[error("知识库错误: {0}")]
    Corpus(#[from] CorpusError),
    /// 导出错误
    #[error("导出错误: {0}")]
    Export(#[from] ExportError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 生成会话错误
///
/// 所有变体都不会修改会话状态
#[derive(Debug, Error)]
pub enum SessionError {
    /// 模板中没有二级标题，没有可生成的章节
    #[error("模板中没有可生成的章节")]
    NothingToGenerate,
    /// 前置条件不满足（缺少需求、API 密钥或知识库）
    #[error("尚未就绪: {0}")]
    NotReady(String),
    /// 所有章节已经生成完毕
    #[error("所有 {total} 个章节已经生成完毕")]
    Done { total: usize },
    /// 尚未生成任何章节，无需重置
    #[error("尚未生成任何章节，无需重置")]
    NothingToReset,
    /// 尚未生成任何章节，无法编辑
    #[error("尚未生成任何章节，无法编辑")]
    NothingToEdit,
    /// 普通章节生成失败
    #[error("生成章节 '{section}' 失败: {source}")]
    Generation {
        section: String,
        #[source]
        source: LlmError,
    },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 请求构建失败
    #[error("LLM请求构建失败: {0}")]
    RequestBuild(String),
}

/// 文件解析错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 不支持的文件格式
    #[error("不支持的文件格式: '{extension}'，仅支持 PDF 和 DOCX 文件")]
    UnsupportedFormat { extension: String },
    /// 内容提取失败
    #[error("提取文件内容失败 ({path}): {reason}")]
    ExtractionFailed { path: String, reason: String },
    /// IO 错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 知识库错误
#[derive(Debug, Error)]
pub enum CorpusError {
    /// 向量化失败
    #[error("向量化失败: {0}")]
    Embedding(String),
    /// 向量维度不一致
    #[error("向量维度不一致: 期望 {expected}，实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// 导出错误
#[derive(Debug, Error)]
pub enum ExportError {
    /// 渲染失败
    #[error("文档渲染失败: {0}")]
    Render(String),
    /// IO 错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 读取配置文件失败
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),
}

// ========== 便捷构造函数 ==========

impl LlmError {
    /// 创建LLM API调用错误
    pub fn api_failed(model: impl Into<String>, message: impl std::fmt::Display) -> Self {
        LlmError::ApiCallFailed {
            model: model.into(),
            message: message.to_string(),
        }
    }
}

impl IngestionError {
    /// 创建内容提取错误
    pub fn extraction_failed(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        IngestionError::ExtractionFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
