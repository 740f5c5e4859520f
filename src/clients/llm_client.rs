/// LLM API 客户端
///
/// 封装所有与 LLM API 相关的调用逻辑
///
/// ## 技术栈
/// - 使用 `async-openai` crate 进行 API 调用
/// - 兼容 OpenAI API 的服务（如 Nebius, Azure, Doubao 等）
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::LlmError;

/// 文本生成能力
///
/// 输入完整的提示词，返回模型生成的文本。章节生成只依赖这个能力，测试中可替换为模拟实现。
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 调用模型生成文本
    async fn invoke(&self, prompt: &str) -> Result<String, LlmError>;

    /// 模型名称（用于日志）
    fn model_name(&self) -> &str;
}

/// LLM 客户端
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(config.llm_api_base_url.trim_end_matches('/'));

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
        }
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    /// 发送单条用户消息
    ///
    /// # 参数
    /// - `prompt`: 用户消息内容
    ///
    /// # 返回
    /// 返回去掉首尾空白的响应内容
    async fn invoke(&self, prompt: &str) -> Result<String, LlmError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("提示词长度: {} 字符", prompt.chars().count());

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| LlmError::RequestBuild(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| LlmError::RequestBuild(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            LlmError::api_failed(&self.model_name, e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
