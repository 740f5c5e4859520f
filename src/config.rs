use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ConfigError;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "proposal.toml";

/// 可选的向量化模型
pub const EMBEDDING_MODEL_OPTIONS: &[&str] = &[
    "BAAI/bge-multilingual-gemma2",
    "BAAI/bge-en-icl",
    "intfloat/e5-mistral-7b-instruct",
];

/// 可选的文本生成模型
pub const TEXT_MODEL_OPTIONS: &[&str] = &[
    "deepseek-ai/DeepSeek-R1-0528",
    "Qwen/Qwen3-32B",
    "meta-llama/Llama-3.3-70B-Instruct",
];

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    // --- 向量化配置 ---
    pub embedding_model_name: String,
    /// 每次向量化请求包含的文本块数量
    pub embedding_batch_size: usize,
    // --- 知识库配置 ---
    /// 文本块最大字符数
    pub chunk_size: usize,
    /// 相邻文本块重叠字符数
    pub chunk_overlap: usize,
    /// 每个章节检索的文本块数量
    pub retrieval_top_k: usize,
    /// 生成章节前是否必须先创建知识库
    pub require_knowledge_base: bool,
    // --- 章节分类 ---
    /// 标题包含任一标记即视为流程图章节（区分大小写）
    pub diagram_markers: Vec<String>,
    // --- 文档输出 ---
    /// 完整提案的一级标题
    pub document_title: String,
    /// 提取图片的存放目录
    pub image_dir: PathBuf,
    /// 导出文件目录
    pub output_dir: PathBuf,
    /// 导出时最多插入的图片数量
    pub max_export_images: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.studio.nebius.com/v1/".to_string(),
            llm_model_name: TEXT_MODEL_OPTIONS[0].to_string(),
            llm_temperature: 0.2,
            llm_max_tokens: 4096,
            embedding_model_name: EMBEDDING_MODEL_OPTIONS[0].to_string(),
            embedding_batch_size: 32,
            chunk_size: 1000,
            chunk_overlap: 100,
            retrieval_top_k: 5,
            require_knowledge_base: false,
            diagram_markers: vec!["Workflow".to_string()],
            document_title: "Proposal".to_string(),
            image_dir: PathBuf::from("extracted_images"),
            output_dir: PathBuf::from("output"),
            max_export_images: 2,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 按 默认值 → TOML 文件 → 环境变量 的顺序加载配置
    ///
    /// 配置文件路径取自 `PROPOSAL_CONFIG`，未设置时使用当前目录下的 `proposal.toml`，
    /// 文件不存在时跳过该层
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("PROPOSAL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let base = if path.exists() {
            info!("📄 读取配置文件: {}", path.display());
            Self::from_toml_file(&path)?
        } else {
            debug!("未找到配置文件 {}，使用默认配置", path.display());
            Self::default()
        };

        Ok(base.with_env_overrides())
    }

    /// 从 TOML 文件读取配置，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::TomlParseFailed {
            path: origin.to_string(),
            source,
        })
    }

    /// 仅使用默认值和环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(self) -> Self {
        Self {
            llm_api_key: env("LLM_API_KEY")
                .or_else(|| env("NEBIUS_API_KEY"))
                .unwrap_or(self.llm_api_key),
            llm_api_base_url: env("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: env("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            llm_temperature: parsed("LLM_TEMPERATURE").unwrap_or(self.llm_temperature),
            llm_max_tokens: parsed("LLM_MAX_TOKENS").unwrap_or(self.llm_max_tokens),
            embedding_model_name: env("EMBEDDING_MODEL_NAME")
                .unwrap_or(self.embedding_model_name),
            embedding_batch_size: parsed("EMBEDDING_BATCH_SIZE")
                .unwrap_or(self.embedding_batch_size),
            chunk_size: parsed("CHUNK_SIZE").unwrap_or(self.chunk_size),
            chunk_overlap: parsed("CHUNK_OVERLAP").unwrap_or(self.chunk_overlap),
            retrieval_top_k: parsed("RETRIEVAL_TOP_K").unwrap_or(self.retrieval_top_k),
            require_knowledge_base: parsed("REQUIRE_KNOWLEDGE_BASE")
                .unwrap_or(self.require_knowledge_base),
            diagram_markers: env("DIAGRAM_MARKERS")
                .map(|v| {
                    v.split(',')
                        .map(|m| m.trim().to_string())
                        .filter(|m| !m.is_empty())
                        .collect()
                })
                .unwrap_or(self.diagram_markers),
            document_title: env("DOCUMENT_TITLE").unwrap_or(self.document_title),
            image_dir: env("IMAGE_DIR").map(PathBuf::from).unwrap_or(self.image_dir),
            output_dir: env("OUTPUT_DIR").map(PathBuf::from).unwrap_or(self.output_dir),
            max_export_images: parsed("MAX_EXPORT_IMAGES").unwrap_or(self.max_export_images),
            verbose_logging: parsed("VERBOSE_LOGGING").unwrap_or(self.verbose_logging),
        }
    }

    /// 是否已配置 API 密钥
    pub fn has_api_key(&self) -> bool {
        !self.llm_api_key.trim().is_empty()
    }
}

/// 读取非空环境变量
fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// 读取并解析环境变量，解析失败时视为未设置
fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env(name).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            llm_model_name = "Qwen/Qwen3-32B"
            retrieval_top_k = 3
            diagram_markers = ["Workflow", "工作流程"]
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.llm_model_name, "Qwen/Qwen3-32B");
        assert_eq!(config.retrieval_top_k, 3);
        assert_eq!(config.diagram_markers, vec!["Workflow", "工作流程"]);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.max_export_images, 2);
    }

    #[test]
    fn test_malformed_toml_is_error() {
        let result = Config::from_toml_str("retrieval_top_k = \"five\"", "inline");
        assert!(matches!(result, Err(ConfigError::TomlParseFailed { .. })));
    }

    #[test]
    fn test_default_has_no_api_key() {
        assert!(!Config::default().has_api_key());
    }
}
