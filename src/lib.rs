//! # Proposal Generator
//!
//! 根据项目需求和背景资料，借助 LLM 逐章节生成商业提案
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure / Clients）
//! - `clients/` - LLM 和向量化 API，只暴露能力（`LanguageModel` / `Embedder`）
//! - `infrastructure/` - PDF/DOCX 解析、图片落盘、DOCX/PDF 导出
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个章节
//! - `SectionGenerator` - 生成一个章节（流程图 / 正文）
//! - `KnowledgeCorpus` - 切分、向量化、相似度检索
//! - `DocumentAssembler` - 拼接完整文档
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"按模板顺序逐个生成"的流程
//! - `GenerationSession` - 游标 + 已生成内容的状态机
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/workspace` - 提案工作区，持有全部状态
//! - `orchestrator/app` - 交互式命令行
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{Embedder, LanguageModel};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{Section, SectionKind, Template};
pub use orchestrator::{App, ProposalWorkspace};
pub use services::{DocumentAssembler, KnowledgeCorpus, SectionGenerator};
pub use workflow::{GenerationSession, SessionState, StepOutcome};
