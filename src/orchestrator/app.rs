//! 交互式命令行 - 编排层
//!
//! 从标准输入逐行读取命令，每条命令调用一次工作区操作。
//! 任何失败只打印错误信息，循环继续。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::config::{Config, EMBEDDING_MODEL_OPTIONS, TEXT_MODEL_OPTIONS};
use crate::orchestrator::ProposalWorkspace;
use crate::utils::logging;

const HELP: &str = "\
可用命令:
  help                  显示帮助
  status                查看当前进度和可选模型
  key <密钥>            设置 API 密钥
  model <名称>          切换文本生成模型
  embed-model <名称>    切换向量模型（需要重新构建知识库）
  req <文本>            设置项目需求
  req-file <路径>       从 PDF/DOCX 提取项目需求
  kb-add <路径>         添加知识库文件 (PDF/DOCX)
  kb-list               列出知识库文件
  kb-build              构建知识库
  kb-clear              清空知识库和提取的图片
  template default      使用默认模板
  template file <路径>  从文件加载模板 (md/pdf/docx)
  next                  生成下一个章节
  edit <路径>           用文件内容替换最近生成的章节
  show                  显示最近生成的章节
  preview               预览完整提案
  reset                 清空已生成的章节
  export [目录]         导出 DOCX 和 PDF
  images [目录]         保存提取出的图片
  quit                  退出";

/// 一条交互命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    ApiKey(String),
    TextModel(String),
    EmbeddingModel(String),
    Requirements(String),
    RequirementsFile(PathBuf),
    KnowledgeAdd(PathBuf),
    KnowledgeList,
    KnowledgeBuild,
    KnowledgeClear,
    TemplateDefault,
    TemplateFile(PathBuf),
    Next,
    Edit(PathBuf),
    Show,
    Preview,
    Reset,
    Export(Option<PathBuf>),
    Images(Option<PathBuf>),
    Quit,
}

impl Command {
    /// 解析一行输入，空行返回 `Ok(None)`
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (line, ""),
        };

        let required = |usage: &str| -> Result<String, String> {
            if arg.is_empty() {
                Err(format!("用法: {usage}"))
            } else {
                Ok(arg.to_string())
            }
        };
        let optional_path = || (!arg.is_empty()).then(|| PathBuf::from(arg));

        let command = match name {
            "help" | "?" => Command::Help,
            "status" => Command::Status,
            "key" => Command::ApiKey(required("key <密钥>")?),
            "model" => {
                let usage = model_usage("model", TEXT_MODEL_OPTIONS);
                Command::TextModel(required(usage.as_str())?)
            }
            "embed-model" => {
                let usage = model_usage("embed-model", EMBEDDING_MODEL_OPTIONS);
                Command::EmbeddingModel(required(usage.as_str())?)
            }
            "req" => Command::Requirements(required("req <文本>")?),
            "req-file" => Command::RequirementsFile(required("req-file <路径>")?.into()),
            "kb-add" => Command::KnowledgeAdd(required("kb-add <路径>")?.into()),
            "kb-list" => Command::KnowledgeList,
            "kb-build" => Command::KnowledgeBuild,
            "kb-clear" => Command::KnowledgeClear,
            "template" => match arg.split_once(char::is_whitespace) {
                _ if arg == "default" => Command::TemplateDefault,
                Some(("file", path)) if !path.trim().is_empty() => {
                    Command::TemplateFile(PathBuf::from(path.trim()))
                }
                _ => return Err("用法: template default | template file <路径>".to_string()),
            },
            "next" => Command::Next,
            "edit" => Command::Edit(required("edit <路径>")?.into()),
            "show" => Command::Show,
            "preview" => Command::Preview,
            "reset" => Command::Reset,
            "export" => Command::Export(optional_path()),
            "images" => Command::Images(optional_path()),
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("未知命令: {other}，输入 help 查看可用命令")),
        };
        Ok(Some(command))
    }
}

/// 应用主结构
pub struct App {
    workspace: ProposalWorkspace,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(&config);
        Ok(Self {
            workspace: ProposalWorkspace::new(config),
        })
    }

    /// 运行交互循环，直到 `quit` 或输入结束
    pub async fn run(mut self) -> Result<()> {
        println!("{HELP}");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await.context("读取输入失败")? {
            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(message) => {
                    warn!("{}", message);
                    continue;
                }
            };
            if command == Command::Quit {
                break;
            }
            if let Err(e) = self.execute(command).await {
                error!("❌ {:#}", e);
            }
        }

        info!("👋 已退出");
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        let workspace = &mut self.workspace;
        match command {
            Command::Help => println!("{HELP}"),
            Command::Status => print_status(workspace),
            Command::ApiKey(key) => workspace.set_api_key(key),
            Command::TextModel(name) => workspace.set_text_model(name),
            Command::EmbeddingModel(name) => workspace.set_embedding_model(name),
            Command::Requirements(text) => workspace.set_requirements(text),
            Command::RequirementsFile(path) => {
                let count = workspace.load_requirements_file(&path)?;
                info!("✓ 已从 {} 提取 {} 字符的需求", path.display(), count);
            }
            Command::KnowledgeAdd(path) => {
                workspace.add_knowledge_file(&path)?;
            }
            Command::KnowledgeList => {
                if workspace.knowledge_files().is_empty() {
                    println!("(知识库为空)");
                }
                for (i, file) in workspace.knowledge_files().iter().enumerate() {
                    println!("{}. {}", i + 1, file.path.display());
                }
            }
            Command::KnowledgeBuild => {
                workspace.build_knowledge_base().await?;
            }
            Command::KnowledgeClear => workspace.clear_knowledge_base()?,
            Command::TemplateDefault => {
                workspace.use_default_template();
            }
            Command::TemplateFile(path) => {
                workspace.load_template_file(&path).await?;
            }
            Command::Next => {
                let outcome = workspace.generate_next().await?;
                println!("{}", outcome.content);
            }
            Command::Edit(path) => {
                let text = read_text(&path).await?;
                workspace.edit_current(text)?;
            }
            Command::Show => match workspace.current_section_text() {
                Some(text) => println!("{text}"),
                None => println!("(还没有生成任何章节)"),
            },
            Command::Preview => {
                let document = workspace.preview();
                if document.is_empty() {
                    println!("(还没有生成任何章节)");
                } else {
                    println!("{document}");
                }
            }
            Command::Reset => workspace.reset()?,
            Command::Export(dir) => {
                if let Some(files) = workspace.export(dir.as_deref())? {
                    println!("{}\n{}", files.docx.display(), files.pdf.display());
                }
            }
            Command::Images(dir) => {
                let paths = workspace.persist_images(dir.as_deref())?;
                for path in paths {
                    println!("{}", path.display());
                }
            }
            Command::Quit => {}
        }
        Ok(())
    }
}

fn model_usage(command: &str, options: &[&str]) -> String {
    format!("{command} <名称>，可选: {}", options.join(", "))
}

fn print_models(label: &str, current: &str, options: &[&str]) {
    println!("{label}: {current}");
    for option in options {
        let mark = if *option == current { "*" } else { " " };
        println!("  {mark} {option}");
    }
}

fn print_status(workspace: &ProposalWorkspace) {
    println!("进度: {}", workspace.progress());
    println!(
        "API 密钥: {}",
        if workspace.config().has_api_key() { "已设置" } else { "未设置" }
    );
    print_models("文本模型", workspace.text_model(), TEXT_MODEL_OPTIONS);
    print_models("向量模型", workspace.embedding_model(), EMBEDDING_MODEL_OPTIONS);
    println!(
        "需求: {}",
        if workspace.requirements().trim().is_empty() {
            "(未设置)".to_string()
        } else {
            logging::truncate_text(workspace.requirements(), 60)
        }
    );
    println!("知识库文件: {} 个", workspace.knowledge_files().len());
    match workspace.corpus_size() {
        Some(size) => println!("知识库: {} 个片段", size),
        None => println!("知识库: 未构建"),
    }
    if let Some(section) = workspace.session().current_section() {
        println!("下一个章节: {}", section.title);
    }
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取文件: {}", path.display()))
}
