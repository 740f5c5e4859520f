//! 向量化 API 客户端
//!
//! 直接调用 OpenAI 兼容的 `/embeddings` 接口

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::CorpusError;

/// 向量
pub type Embedding = Vec<f32>;

/// 文本向量化能力
#[async_trait]
pub trait Embedder: Send + Sync {
    /// 批量向量化，返回顺序与输入一致
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, CorpusError>;

    /// 向量化单条文本
    async fn embed(&self, text: &str) -> Result<Embedding, CorpusError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CorpusError::Embedding(format!("无法为文本生成向量: {text}")))
    }

    /// 模型名称（用于日志）
    fn model_name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Embedding,
}

/// 向量化客户端
pub struct EmbeddingClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model_name: String,
}

impl EmbeddingClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.llm_api_key.clone(),
            endpoint: format!(
                "{}/embeddings",
                config.llm_api_base_url.trim_end_matches('/')
            ),
            model_name: config.embedding_model_name.clone(),
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, CorpusError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            "调用向量化 API，模型: {}，文本数: {}",
            self.model_name,
            texts.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model_name,
                "input": texts,
            }))
            .send()
            .await
            .map_err(|e| {
                warn!("向量化 API 请求失败: {}", e);
                CorpusError::Embedding(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CorpusError::Embedding(format!(
                "向量化 API 返回错误 ({status}): {body}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CorpusError::Embedding(format!("响应解析失败: {e}")))?;

        let embeddings = order_by_index(parsed.data);
        if embeddings.len() != texts.len() {
            return Err(CorpusError::Embedding(format!(
                "返回向量数量 {} 与输入数量 {} 不一致",
                embeddings.len(),
                texts.len()
            )));
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// 按接口返回的 index 排序，未提供 index 时保持原顺序
fn order_by_index(mut items: Vec<EmbeddingItem>) -> Vec<Embedding> {
    items.sort_by_key(|item| item.index.unwrap_or(usize::MAX));
    items.into_iter().map(|item| item.embedding).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_by_index() {
        let response: EmbeddingResponse = serde_json::from_value(serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        }))
        .unwrap();

        assert_eq!(
            order_by_index(response.data),
            vec![vec![1.0, 0.0], vec![0.0, 1.0]]
        );
    }

    #[test]
    fn test_endpoint_from_base_url() {
        let config = Config {
            llm_api_base_url: "https://api.example.com/v1/".to_string(),
            ..Config::default()
        };
        let client = EmbeddingClient::new(&config);
        assert_eq!(client.endpoint, "https://api.example.com/v1/embeddings");
    }

    #[tokio::test]
    #[ignore]
    async fn test_embed_live() {
        let client = EmbeddingClient::new(&Config::from_env());
        let embedding = client.embed("项目需求").await.unwrap();
        assert!(!embedding.is_empty());
    }
}
