//! 提案工作区 - 编排层
//!
//! ## 职责
//!
//! 持有一次提案编写所需的全部状态：需求、模板、生成会话、知识库文件、
//! 向量化后的知识库和提取出的图片。
//! 交互界面的每个操作都对应这里的一个方法，方法之间没有隐式的共享状态。
//!
//! ## 资源
//!
//! - 文本生成和向量化能力以 trait 对象持有，测试中可替换；
//!   运行时修改 API 密钥或模型时按新配置重建
//! - 知识库以 `Arc` 持有，重建成功后整体替换，构建中途失败不影响旧知识库

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::clients::{Embedder, EmbeddingClient, LanguageModel, LlmClient};
use crate::config::{Config, EMBEDDING_MODEL_OPTIONS, TEXT_MODEL_OPTIONS};
use crate::error::{AppResult, ExportError, IngestionError, SessionError};
use crate::infrastructure::{export_all, ingestion, ExportedFiles, ExtractedImage, ImageStore};
use crate::models::{
    load_template_file, SectionClassifier, SectionKind, DEFAULT_PROPOSAL_TEMPLATE,
};
use crate::services::{
    DocumentAssembler, KnowledgeCorpus, RetrievalProvider, SectionGenerator, TextSplitter,
};
use crate::utils::logging;
use crate::workflow::{GenerationSession, SessionState, StepOutcome};

/// 添加到知识库的文件，内容在添加时读入
#[derive(Debug, Clone)]
pub struct KnowledgeFile {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl KnowledgeFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// 提案工作区
pub struct ProposalWorkspace {
    config: Config,
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    session: GenerationSession,
    assembler: DocumentAssembler,
    splitter: TextSplitter,
    image_store: ImageStore,
    requirements: String,
    template_text: String,
    knowledge_files: Vec<KnowledgeFile>,
    corpus: Option<Arc<KnowledgeCorpus>>,
    /// 知识库文件中的图片，每次构建知识库时整体替换
    knowledge_images: Vec<ExtractedImage>,
    /// 需求文件和模板文件中的图片
    document_images: Vec<ExtractedImage>,
}

impl ProposalWorkspace {
    /// 使用配置中的 API 创建工作区
    pub fn new(config: Config) -> Self {
        let llm: Arc<dyn LanguageModel> = Arc::new(LlmClient::new(&config));
        let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::new(&config));
        Self::with_capabilities(config, llm, embedder)
    }

    /// 使用指定的文本生成和向量化能力创建工作区
    pub fn with_capabilities(
        config: Config,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let classifier = SectionClassifier::new(config.diagram_markers.clone());
        let mut workspace = Self {
            llm,
            embedder,
            session: GenerationSession::new(SectionGenerator::new(classifier)),
            assembler: DocumentAssembler::new(config.document_title.clone()),
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap),
            image_store: ImageStore::new(config.image_dir.clone()),
            requirements: String::new(),
            template_text: String::new(),
            knowledge_files: Vec::new(),
            corpus: None,
            knowledge_images: Vec::new(),
            document_images: Vec::new(),
            config,
        };
        workspace.use_default_template();
        workspace
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &GenerationSession {
        &self.session
    }

    // ========== 模型 ==========

    pub fn text_model(&self) -> &str {
        self.llm.model_name()
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    /// 设置 API 密钥，文本生成和向量化客户端都按新密钥重建
    pub fn set_api_key(&mut self, key: impl Into<String>) {
        self.config.llm_api_key = key.into().trim().to_string();
        self.llm = Arc::new(LlmClient::new(&self.config));
        self.embedder = Arc::new(EmbeddingClient::new(&self.config));
        info!("🔑 已更新 API 密钥");
    }

    /// 切换文本生成模型，已生成的章节保持不变
    pub fn set_text_model(&mut self, name: impl Into<String>) {
        self.config.llm_model_name = name.into();
        if !TEXT_MODEL_OPTIONS.contains(&self.config.llm_model_name.as_str()) {
            warn!("⚠️ {} 不在可选文本模型列表中", self.config.llm_model_name);
        }
        self.llm = Arc::new(LlmClient::new(&self.config));
        info!("🤖 文本模型: {}", self.config.llm_model_name);
    }

    /// 切换向量模型
    ///
    /// 旧知识库的向量来自另一个模型，直接丢弃，需要重新构建
    pub fn set_embedding_model(&mut self, name: impl Into<String>) {
        self.config.embedding_model_name = name.into();
        if !EMBEDDING_MODEL_OPTIONS.contains(&self.config.embedding_model_name.as_str()) {
            warn!("⚠️ {} 不在可选向量模型列表中", self.config.embedding_model_name);
        }
        self.embedder = Arc::new(EmbeddingClient::new(&self.config));
        if self.corpus.take().is_some() {
            warn!("⚠️ 向量模型已变更，请重新构建知识库");
        }
        info!("🧮 向量模型: {}", self.config.embedding_model_name);
    }

    // ========== 需求 ==========

    pub fn requirements(&self) -> &str {
        &self.requirements
    }

    pub fn set_requirements(&mut self, text: impl Into<String>) {
        self.requirements = text.into();
        info!("📝 已更新项目需求 ({} 字符)", self.requirements.chars().count());
    }

    /// 从 PDF/DOCX 文件提取需求，返回提取的字符数
    ///
    /// 文件内容读入后经临时文件提取，与上传内容走同一条路径
    pub fn load_requirements_file(&mut self, path: &Path) -> AppResult<usize> {
        ingestion::detect_format(path)?;
        let bytes = std::fs::read(path).map_err(IngestionError::from)?;
        let document = ingestion::extract_bytes(&file_name(path), &bytes)?;
        let count = document.text.chars().count();
        self.document_images.extend(document.images);
        self.set_requirements(document.text);
        Ok(count)
    }

    // ========== 知识库 ==========

    /// 添加知识库文件
    ///
    /// 不支持的格式立即拒绝；同名文件只保留第一个，重复添加返回 false。
    /// 文件内容在添加时读入，之后磁盘上的文件变化不影响知识库
    pub fn add_knowledge_file(&mut self, path: &Path) -> Result<bool, IngestionError> {
        ingestion::detect_format(path)?;

        let name = file_name(path);
        if self.knowledge_files.iter().any(|f| f.file_name() == name) {
            warn!("⚠️ 文件已在知识库列表中: {}", path.display());
            return Ok(false);
        }
        let bytes = std::fs::read(path)?;
        self.knowledge_files.push(KnowledgeFile {
            path: path.to_path_buf(),
            bytes,
        });
        info!("📎 已添加知识库文件: {}", path.display());
        Ok(true)
    }

    pub fn knowledge_files(&self) -> &[KnowledgeFile] {
        &self.knowledge_files
    }

    /// 知识库中的片段数，未构建时为 None
    pub fn corpus_size(&self) -> Option<usize> {
        self.corpus.as_ref().map(|c| c.len())
    }

    /// 清空知识库文件、已构建的知识库和提取出的图片
    pub fn clear_knowledge_base(&mut self) -> AppResult<()> {
        self.knowledge_files.clear();
        self.corpus = None;
        self.knowledge_images.clear();
        self.document_images.clear();
        let removed = self.image_store.clear().map_err(ExportError::from)?;
        info!("🗑️ 知识库已清空，删除 {} 个图片文件", removed);
        Ok(())
    }

    /// 用需求文本和所有知识库文件构建知识库
    ///
    /// 单个文件提取失败时跳过该文件；返回新知识库的片段数，没有任何文本时为 None
    pub async fn build_knowledge_base(&mut self) -> AppResult<Option<usize>> {
        if !self.config.has_api_key() {
            return Err(SessionError::NotReady("请先配置 API 密钥".to_string()).into());
        }
        if self.requirements.trim().is_empty() && self.knowledge_files.is_empty() {
            return Err(
                SessionError::NotReady("请先提供项目需求或知识库文件".to_string()).into(),
            );
        }

        let mut texts = Vec::with_capacity(self.knowledge_files.len() + 1);
        if !self.requirements.trim().is_empty() {
            texts.push(self.requirements.clone());
        }

        let mut images = Vec::new();
        for file in &self.knowledge_files {
            match ingestion::extract_bytes(&file.file_name(), &file.bytes) {
                Ok(document) => {
                    texts.push(document.text);
                    images.extend(document.images);
                }
                Err(e) => warn!("⚠️ 跳过文件 {}: {}", file.path.display(), e),
            }
        }

        info!("📚 正在构建知识库 ({} 份文本)...", texts.len());
        let corpus = KnowledgeCorpus::build(
            &texts,
            &self.splitter,
            self.embedder.clone(),
            self.config.embedding_batch_size,
        )
        .await?;

        self.knowledge_images = images;
        self.corpus = corpus.map(Arc::new);
        match self.corpus_size() {
            Some(size) => info!("✓ 知识库构建完成: {} 个片段", size),
            None => warn!("⚠️ 没有可用文本，知识库为空"),
        }
        Ok(self.corpus_size())
    }

    // ========== 模板 ==========

    pub fn template_text(&self) -> &str {
        &self.template_text
    }

    /// 使用内置的默认模板
    pub fn use_default_template(&mut self) -> usize {
        self.load_template_text(DEFAULT_PROPOSAL_TEMPLATE)
    }

    /// 加载模板文本，返回章节数
    ///
    /// 文本与当前模板相同时保留已生成的进度
    pub fn load_template_text(&mut self, text: &str) -> usize {
        if text == self.template_text {
            return self.session.total();
        }
        self.template_text = text.to_string();
        let total = self.session.load_template(text);
        if total == 0 {
            warn!("⚠️ 模板中没有二级标题 (## )，没有可生成的章节");
        } else {
            info!("📋 模板已加载: {} 个章节", total);
        }
        total
    }

    /// 从文件加载模板，返回章节数
    pub async fn load_template_file(&mut self, path: &Path) -> AppResult<usize> {
        let loaded = load_template_file(path).await?;
        self.document_images.extend(loaded.images);
        Ok(self.load_template_text(&loaded.text))
    }

    // ========== 生成 ==========

    /// 生成下一个章节
    ///
    /// 普通章节会先用 "标题 需求" 检索知识库作为上下文
    pub async fn generate_next(&mut self) -> AppResult<StepOutcome> {
        if !self.config.has_api_key() {
            return Err(SessionError::NotReady("请先配置 API 密钥".to_string()).into());
        }
        if self.config.require_knowledge_base && self.corpus.is_none() {
            return Err(SessionError::NotReady("请先构建知识库".to_string()).into());
        }

        let context = self.retrieve_context().await?;
        if let Some(section) = self.session.current_section() {
            logging::log_section_start(
                self.session.cursor(),
                self.session.total(),
                &section.title,
            );
        }

        let outcome = self
            .session
            .advance(&self.requirements, &context, self.llm.as_ref())
            .await?;

        if let Some(warning) = &outcome.warning {
            warn!("⚠️ {}", warning);
        }
        logging::log_progress(self.session.cursor(), self.session.total());
        Ok(outcome)
    }

    /// 检索当前章节的上下文，没有知识库或无需上下文时为空串
    async fn retrieve_context(&self) -> AppResult<String> {
        let (Some(section), Some(corpus)) = (self.session.current_section(), &self.corpus) else {
            return Ok(String::new());
        };
        let kind = self.session.generator().classifier().classify(&section.title);
        if self.requirements.trim().is_empty() || kind == SectionKind::Diagram {
            return Ok(String::new());
        }

        let query = format!("{} {}", section.title, self.requirements);
        let chunks = corpus.query(&query, self.config.retrieval_top_k).await?;
        Ok(chunks.join("\n\n"))
    }

    /// 用人工编辑后的内容覆盖最近生成的章节
    pub fn edit_current(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        self.session.edit_current(text)?;
        info!("✏️ 已保存对当前章节的修改");
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.session.reset()
    }

    /// 最近生成的章节内容
    pub fn current_section_text(&self) -> Option<&str> {
        self.session.last_generated()
    }

    /// 已生成章节拼接成的完整文档
    pub fn preview(&self) -> String {
        self.assembler.assemble(self.session.generated_bodies())
    }

    pub fn progress(&self) -> SessionState {
        self.session.state()
    }

    // ========== 导出 ==========

    /// 所有提取出的图片，知识库图片在前
    pub fn images(&self) -> impl Iterator<Item = &ExtractedImage> {
        self.knowledge_images.iter().chain(&self.document_images)
    }

    /// 导出 DOCX 和 PDF，`dir` 为空时使用配置的输出目录
    ///
    /// 还没有生成任何章节时返回 `Ok(None)`
    pub fn export(&self, dir: Option<&Path>) -> AppResult<Option<ExportedFiles>> {
        let markdown = self.preview();
        if markdown.is_empty() {
            warn!("⚠️ 还没有生成任何章节，跳过导出");
            return Ok(None);
        }

        let images: Vec<ExtractedImage> = self.images().cloned().collect();
        let dir = dir.unwrap_or(&self.config.output_dir);
        let files = export_all(&markdown, &images, self.config.max_export_images, dir)?;
        Ok(Some(files))
    }

    /// 把提取出的图片写入磁盘，`dir` 为空时使用配置的图片目录
    pub fn persist_images(&self, dir: Option<&Path>) -> AppResult<Vec<PathBuf>> {
        let images: Vec<ExtractedImage> = self.images().cloned().collect();
        let paths = match dir {
            Some(dir) => ImageStore::new(dir).persist(&images),
            None => self.image_store.persist(&images),
        }
        .map_err(ExportError::from)?;
        Ok(paths)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::Embedding;
    use crate::error::{AppError, CorpusError, LlmError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 记录收到的提示词，返回固定内容
    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn invoke(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("generated body".to_string())
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    /// 按文本长度生成一维向量
    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, CorpusError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn model_name(&self) -> &str {
            "length"
        }
    }

    fn test_config() -> Config {
        Config {
            llm_api_key: "test-key".to_string(),
            ..Config::default()
        }
    }

    fn workspace_with(model: Arc<RecordingModel>, config: Config) -> ProposalWorkspace {
        ProposalWorkspace::with_capabilities(config, model, Arc::new(LengthEmbedder))
    }

    #[test]
    fn test_default_template_loaded() {
        let workspace = workspace_with(Arc::default(), test_config());
        assert_eq!(workspace.progress(), SessionState::Pending { cursor: 0, total: 7 });
        assert_eq!(workspace.preview(), "");
    }

    #[tokio::test]
    async fn test_generate_requires_api_key() {
        let mut workspace = workspace_with(Arc::default(), Config::default());
        workspace.set_requirements("做一个 CRM 系统");

        let result = workspace.generate_next().await;
        assert!(matches!(
            result,
            Err(AppError::Session(SessionError::NotReady(_)))
        ));
    }

    #[tokio::test]
    async fn test_generate_requires_knowledge_base_when_configured() {
        let config = Config {
            require_knowledge_base: true,
            ..test_config()
        };
        let mut workspace = workspace_with(Arc::default(), config);
        workspace.set_requirements("做一个 CRM 系统");

        assert!(matches!(
            workspace.generate_next().await,
            Err(AppError::Session(SessionError::NotReady(_)))
        ));
        assert_eq!(workspace.session().cursor(), 0);
    }

    #[tokio::test]
    async fn test_same_template_keeps_progress() {
        let mut workspace = workspace_with(Arc::default(), test_config());
        workspace.set_requirements("req");
        workspace.generate_next().await.unwrap();

        workspace.use_default_template();
        assert_eq!(workspace.session().cursor(), 1);

        workspace.load_template_text("## A\n## B");
        assert_eq!(workspace.progress(), SessionState::Pending { cursor: 0, total: 2 });
    }

    #[tokio::test]
    async fn test_context_comes_from_knowledge_base() {
        let model = Arc::new(RecordingModel::default());
        let mut workspace = workspace_with(model.clone(), test_config());
        workspace.load_template_text("## Intro\n[overview]");
        workspace.set_requirements("budget is 42 units");

        assert_eq!(workspace.build_knowledge_base().await.unwrap(), Some(1));
        workspace.generate_next().await.unwrap();

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("# RELEVANT CONTEXT\nbudget is 42 units"));
    }

    #[tokio::test]
    async fn test_build_requires_some_text() {
        let mut workspace = workspace_with(Arc::default(), test_config());
        assert!(matches!(
            workspace.build_knowledge_base().await,
            Err(AppError::Session(SessionError::NotReady(_)))
        ));
    }

    #[test]
    fn test_add_knowledge_file_dedup_and_reject() {
        let temp = tempfile::tempdir().unwrap();
        for dir in ["a", "b"] {
            std::fs::create_dir(temp.path().join(dir)).unwrap();
            std::fs::write(temp.path().join(dir).join("report.pdf"), dir).unwrap();
        }
        let mut workspace = workspace_with(Arc::default(), test_config());

        assert!(workspace
            .add_knowledge_file(&temp.path().join("a/report.pdf"))
            .unwrap());
        assert!(!workspace
            .add_knowledge_file(&temp.path().join("b/report.pdf"))
            .unwrap());
        assert!(matches!(
            workspace.add_knowledge_file(Path::new("notes.txt")),
            Err(IngestionError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            workspace.add_knowledge_file(&temp.path().join("missing.docx")),
            Err(IngestionError::Io(_))
        ));

        let files = workspace.knowledge_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name(), "report.pdf");
        assert_eq!(files[0].bytes, b"a".to_vec());
    }

    #[test]
    fn test_export_without_sections_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = workspace_with(Arc::default(), test_config());
        assert!(workspace.export(Some(dir.path())).unwrap().is_none());
        assert!(!dir.path().join("proposal_final.docx").exists());
    }

    #[tokio::test]
    async fn test_switching_models_rebuilds_clients() {
        let mut workspace = workspace_with(Arc::default(), test_config());
        workspace.set_requirements("budget is 42 units");
        workspace.build_knowledge_base().await.unwrap();
        assert_eq!(workspace.text_model(), "recording");

        workspace.set_text_model(TEXT_MODEL_OPTIONS[1]);
        assert_eq!(workspace.text_model(), TEXT_MODEL_OPTIONS[1]);
        assert_eq!(workspace.config().llm_model_name, TEXT_MODEL_OPTIONS[1]);
        assert_eq!(workspace.corpus_size(), Some(1));

        workspace.set_embedding_model(EMBEDDING_MODEL_OPTIONS[2]);
        assert_eq!(workspace.embedding_model(), EMBEDDING_MODEL_OPTIONS[2]);
        assert_eq!(workspace.corpus_size(), None);
    }

    #[tokio::test]
    async fn test_api_key_entered_at_runtime() {
        let mut workspace = workspace_with(Arc::default(), Config::default());
        assert!(!workspace.config().has_api_key());

        workspace.set_api_key("  sk-runtime  ");
        assert_eq!(workspace.config().llm_api_key, "sk-runtime");
        assert!(workspace.config().has_api_key());
        assert_eq!(workspace.text_model(), workspace.config().llm_model_name);
    }
}
