use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use proposal_generator::clients::{Embedder, Embedding, LanguageModel};
use proposal_generator::config::Config;
use proposal_generator::error::{AppError, CorpusError, IngestionError, LlmError, SessionError};
use proposal_generator::infrastructure::export::DIAGRAM_PLACEHOLDER;
use proposal_generator::infrastructure::ingestion;
use proposal_generator::services::SectionGenerator;
use proposal_generator::utils::logging;
use proposal_generator::{GenerationSession, ProposalWorkspace, SessionState};
use zip::write::SimpleFileOptions;

const TEMPLATE: &str = "## Intro\nplaceholder\n## Workflow Plan\nplaceholder";

/// 原样返回提示词
struct EchoModel;

#[async_trait]
impl LanguageModel for EchoModel {
    async fn invoke(&self, prompt: &str) -> Result<String, LlmError> {
        Ok(prompt.to_string())
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

/// 正文章节返回固定内容，流程图章节返回不带头的节点
struct ScriptedModel;

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn invoke(&self, prompt: &str) -> Result<String, LlmError> {
        if prompt.contains("mermaid syntax") {
            Ok("<think>plan the phases</think>\nA[Kickoff] --> B[Delivery]".to_string())
        } else {
            Ok("<think>draft</think>We deliver a focused CRM rollout.".to_string())
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// 按关键词生成向量
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, CorpusError> {
        Ok(texts
            .iter()
            .map(|t| {
                vec![
                    t.matches("budget").count() as f32,
                    t.matches("team").count() as f32,
                    1.0,
                ]
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

fn test_config(root: &Path) -> Config {
    Config {
        llm_api_key: "test-key".to_string(),
        image_dir: root.join("images"),
        output_dir: root.join("output"),
        ..Config::default()
    }
}

fn workspace(config: Config, llm: Arc<dyn LanguageModel>) -> ProposalWorkspace {
    ProposalWorkspace::with_capabilities(config, llm, Arc::new(KeywordEmbedder))
}

/// 写一个包含一段正文和一张图片的 DOCX
fn write_docx(path: &Path, paragraphs: &[&str]) {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );

    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    writer.start_file("word/document.xml", options).unwrap();
    writer.write_all(xml.as_bytes()).unwrap();
    writer.start_file("word/media/image1.png", options).unwrap();
    writer.write_all(&[0x89, b'P', b'N', b'G']).unwrap();
    writer.finish().unwrap();
}

#[test]
fn test_end_to_end_session() {
    logging::init(false);

    tokio_test::block_on(async {
        let mut session = GenerationSession::new(SectionGenerator::default());
        assert_eq!(session.load_template(TEMPLATE), 2);

        let titles: Vec<&str> = session.sections().iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Intro", "Workflow Plan"]);

        session.advance("Build a CRM", "", &EchoModel).await.unwrap();
        session.advance("Build a CRM", "", &EchoModel).await.unwrap();

        assert_eq!(session.generated_bodies().len(), 2);
        assert_eq!(session.cursor(), 2);
        assert_eq!(session.state(), SessionState::Complete { total: 2 });

        session.reset().unwrap();
        assert_eq!(session.cursor(), 0);
        assert!(session.generated_bodies().is_empty());
        assert_eq!(session.sections().len(), 2);
    });
}

#[tokio::test]
async fn test_unsupported_file_leaves_corpus_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "plain text").unwrap();

    match ingestion::extract_file(&notes) {
        Err(IngestionError::UnsupportedFormat { extension }) => assert_eq!(extension, "txt"),
        other => panic!("应返回 UnsupportedFormat，实际: {:?}", other.map(|d| d.text)),
    }

    let mut workspace = workspace(test_config(dir.path()), Arc::new(EchoModel));
    workspace.set_requirements("budget review for the team");
    let before = workspace.build_knowledge_base().await.unwrap();
    assert!(before.is_some());

    assert!(workspace.add_knowledge_file(&notes).is_err());
    assert!(workspace.knowledge_files().is_empty());
    assert_eq!(workspace.corpus_size(), before);
}

#[tokio::test]
async fn test_generate_and_export_proposal() {
    let dir = tempfile::tempdir().unwrap();
    let mut workspace = workspace(test_config(dir.path()), Arc::new(ScriptedModel));
    workspace.load_template_text(TEMPLATE);

    assert!(workspace.export(None).unwrap().is_none());

    workspace.set_requirements("Build a CRM");
    let intro = workspace.generate_next().await.unwrap();
    assert_eq!(intro.content, "## Intro\n\nWe deliver a focused CRM rollout.");

    let diagram = workspace.generate_next().await.unwrap();
    assert!(diagram.warning.is_none());
    assert_eq!(
        diagram.content,
        "## Workflow Plan\n\n```mermaid\ngraph TD\nA[Kickoff] --> B[Delivery]\n```"
    );
    assert!(matches!(
        workspace.generate_next().await,
        Err(AppError::Session(SessionError::Done { total: 2 }))
    ));

    let preview = workspace.preview();
    assert!(preview.starts_with("# Proposal\n\n## Intro"));

    let files = workspace.export(None).unwrap().unwrap();
    assert!(files.docx.ends_with("proposal_final.docx"));
    assert!(files.pdf.ends_with("proposal_final.pdf"));

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&files.docx).unwrap()).unwrap();
    let mut document = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut document)
        .unwrap();
    assert!(document.contains("We deliver a focused CRM rollout."));
    assert!(document.contains(DIAGRAM_PLACEHOLDER));
    assert!(!document.contains("graph TD"));

    let pdf = lopdf::Document::load(&files.pdf).unwrap();
    assert!(!pdf.get_pages().is_empty());
}

#[tokio::test]
async fn test_knowledge_file_feeds_context_and_images() {
    let dir = tempfile::tempdir().unwrap();
    let brief = dir.path().join("brief.docx");
    write_docx(&brief, &["The budget is capped at 50k.", "Weather was sunny."]);

    let config = Config {
        chunk_size: 30,
        chunk_overlap: 0,
        retrieval_top_k: 1,
        ..test_config(dir.path())
    };
    let mut workspace = workspace(config, Arc::new(EchoModel));
    workspace.load_template_text("## budget plan\n[costs]");
    workspace.set_requirements("CRM");

    assert!(workspace.add_knowledge_file(&brief).unwrap());
    assert!(!workspace.add_knowledge_file(&brief).unwrap());
    // 内容在添加时已读入，构建不再依赖磁盘上的文件
    std::fs::remove_file(&brief).unwrap();
    let size = workspace.build_knowledge_base().await.unwrap();
    assert_eq!(size, Some(3));

    let outcome = workspace.generate_next().await.unwrap();
    assert!(outcome
        .content
        .contains("# RELEVANT CONTEXT\nThe budget is capped at 50k."));

    let paths = workspace.persist_images(None).unwrap();
    assert_eq!(paths.len(), 1);
    let name = paths[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("docx_image_"));
    assert!(name.ends_with(".png"));

    workspace.clear_knowledge_base().unwrap();
    assert!(workspace.knowledge_files().is_empty());
    assert_eq!(workspace.corpus_size(), None);
    assert!(!paths[0].exists());
}

#[test]
fn test_requirements_file_is_extracted() {
    let dir = tempfile::tempdir().unwrap();
    let brief = dir.path().join("requirements.docx");
    write_docx(&brief, &["Build a CRM for 20 sales reps.", "Budget: 50k."]);

    let mut workspace = workspace(test_config(dir.path()), Arc::new(EchoModel));
    let count = workspace.load_requirements_file(&brief).unwrap();

    assert_eq!(
        workspace.requirements(),
        "Build a CRM for 20 sales reps.\nBudget: 50k."
    );
    assert_eq!(count, workspace.requirements().chars().count());
    assert_eq!(workspace.images().count(), 1);

    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "plain").unwrap();
    assert!(matches!(
        workspace.load_requirements_file(&notes),
        Err(AppError::Ingestion(IngestionError::UnsupportedFormat { .. }))
    ));
}
