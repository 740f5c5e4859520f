//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `workspace` - 提案工作区
//! - 持有需求、模板、生成会话、知识库和图片
//! - 每个用户操作对应一个方法
//! - 检查 API 密钥和知识库等前置条件
//!
//! ### `app` - 交互式命令行
//! - 解析命令并调用工作区
//! - 打印结果和错误，失败不退出
//!
//! ## 层次关系
//!
//! ```text
//! app (命令行)
//!     ↓
//! workspace (ProposalWorkspace)
//!     ↓
//! workflow::GenerationSession (逐章节生成)
//!     ↓
//! services (能力层：章节生成 / 知识库 / 文档组装)
//!     ↓
//! clients + infrastructure (LLM / 向量化 / 文件解析 / 导出)
//! ```

pub mod app;
pub mod workspace;

pub use app::{App, Command};
pub use workspace::{KnowledgeFile, ProposalWorkspace};
