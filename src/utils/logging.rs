/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化日志
///
/// `RUST_LOG` 优先；未设置时默认 `info`，`verbose` 为 true 时为 `debug`。
/// 重复调用不会报错（测试中会多次初始化）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 提案生成器启动");
    info!("🤖 文本模型: {}", config.llm_model_name);
    info!("🧮 向量模型: {}", config.embedding_model_name);
    info!(
        "📐 切分参数: {} 字符 / 重叠 {} 字符 / 检索 {} 条",
        config.chunk_size, config.chunk_overlap, config.retrieval_top_k
    );
    if !config.has_api_key() {
        info!("🔑 尚未配置 API 密钥，可设置 LLM_API_KEY 或输入 key <密钥>");
    }
    info!("{}", "=".repeat(60));
}

/// 记录章节开始生成
///
/// # 参数
/// - `index`: 章节序号（从 0 开始）
/// - `total`: 章节总数
/// - `title`: 章节标题
pub fn log_section_start(index: usize, total: usize, title: &str) {
    info!("\n{}", "─".repeat(60));
    info!("📄 第 {}/{} 个章节: {}", index + 1, total, title);
    info!("{}", "─".repeat(60));
}

/// 记录生成进度
pub fn log_progress(done: usize, total: usize) {
    if done == total {
        info!("✅ 全部 {} 个章节生成完毕，可以导出", total);
    } else {
        info!("📊 进度: {}/{}", done, total);
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
