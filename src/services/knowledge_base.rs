//! 知识库服务
//!
//! 把需求文本和上传的背景资料切分、向量化，生成章节时按相似度检索相关片段。
//! 知识库建好后只读，重建时整体替换。

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::clients::{Embedder, Embedding};
use crate::error::CorpusError;

/// 从粗到细依次尝试的分隔符，空串表示按字符切分
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// 同时进行的向量化请求数
const EMBED_CONCURRENCY: usize = 4;

/// 检索能力：给定查询文本，返回最相关的若干片段（最相关的在前）
#[async_trait]
pub trait RetrievalProvider: Send + Sync {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<String>, CorpusError>;
}

/// 递归字符切分器
///
/// 长度按字符计。先按段落切，段落过长再按行、按空格、最后按字符切，
/// 然后把小片段合并到不超过 `chunk_size`，相邻块之间保留最多 `chunk_overlap` 个字符的重叠。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting = Vec::new();
        for piece in pieces {
            if char_len(piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }
        chunks
    }

    /// 合并小片段，块与块之间保留重叠
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);
            let joined_len = |window: &VecDeque<&str>| if window.is_empty() { 0 } else { sep_len };

            if total + len + joined_len(&window) > self.chunk_size && !window.is_empty() {
                push_chunk(&mut chunks, &window, separator);
                while total > self.chunk_overlap
                    || (total > 0 && total + len + joined_len(&window) > self.chunk_size)
                {
                    let Some(first) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(first) + if window.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + joined_len(&window);
            window.push_back(piece);
        }
        push_chunk(&mut chunks, &window, separator);
        chunks
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn push_chunk(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// 已向量化的知识库
pub struct KnowledgeCorpus {
    chunks: Vec<String>,
    embeddings: Vec<Embedding>,
    embedder: Arc<dyn Embedder>,
}

impl KnowledgeCorpus {
    /// 构建知识库
    ///
    /// # 参数
    /// - `texts`: 需求文本和背景资料，合并后统一切分
    /// - `splitter`: 文本切分器
    /// - `embedder`: 向量化能力，查询时也会用到
    /// - `batch_size`: 每次向量化请求的片段数
    ///
    /// # 返回
    /// 没有任何文本或切分后没有片段时返回 `Ok(None)`
    pub async fn build(
        texts: &[String],
        splitter: &TextSplitter,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Option<Self>, CorpusError> {
        let combined = texts
            .iter()
            .map(|t| t.as_str())
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if combined.is_empty() {
            debug!("没有可用的文本，跳过知识库构建");
            return Ok(None);
        }

        let chunks = splitter.split_text(&combined);
        if chunks.is_empty() {
            return Ok(None);
        }
        info!(
            "🧮 向量化 {} 个文本片段 (模型: {})",
            chunks.len(),
            embedder.model_name()
        );

        let embedder_ref = embedder.as_ref();
        let batches: Vec<Vec<Embedding>> = stream::iter(chunks.chunks(batch_size.max(1)))
            .map(|batch| async move {
                let vectors = embedder_ref.embed_batch(batch).await?;
                if vectors.len() != batch.len() {
                    return Err(CorpusError::Embedding(format!(
                        "返回向量数量 {} 与片段数量 {} 不一致",
                        vectors.len(),
                        batch.len()
                    )));
                }
                Ok::<_, CorpusError>(vectors)
            })
            .buffered(EMBED_CONCURRENCY)
            .try_collect()
            .await?;
        let embeddings: Vec<Embedding> = batches.into_iter().flatten().collect();

        if let Some(first) = embeddings.first() {
            let expected = first.len();
            if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
                return Err(CorpusError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        Ok(Some(Self {
            chunks,
            embeddings,
            embedder,
        }))
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 按余弦相似度排序，相同得分保持原顺序
    fn rank(&self, query: &[f32], k: usize) -> Result<Vec<String>, CorpusError> {
        let mut scored = Vec::with_capacity(self.embeddings.len());
        for (index, embedding) in self.embeddings.iter().enumerate() {
            if embedding.len() != query.len() {
                return Err(CorpusError::DimensionMismatch {
                    expected: embedding.len(),
                    actual: query.len(),
                });
            }
            scored.push((index, cosine_similarity(query, embedding)));
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(index, _)| self.chunks[index].clone())
            .collect())
    }
}

#[async_trait]
impl RetrievalProvider for KnowledgeCorpus {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<String>, CorpusError> {
        if k == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed(text).await?;
        let results = self.rank(&query, k)?;
        debug!("检索到 {} 个相关片段", results.len());
        Ok(results)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 按关键词出现与否生成二维向量
    #[derive(Default)]
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, CorpusError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    vec![
                        if t.contains("apple") { 1.0 } else { 0.0 },
                        if t.contains("banana") { 1.0 } else { 0.0 },
                    ]
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "keyword"
        }
    }

    #[test]
    fn test_split_with_overlap() {
        let text = "aaaa bbbb cccc";
        assert_eq!(
            TextSplitter::new(10, 0).split_text(text),
            vec!["aaaa bbbb", "cccc"]
        );
        assert_eq!(
            TextSplitter::new(10, 4).split_text(text),
            vec!["aaaa bbbb", "bbbb cccc"]
        );
    }

    #[test]
    fn test_split_prefers_paragraphs() {
        let splitter = TextSplitter::new(1000, 100);
        assert_eq!(splitter.split_text("p1\n\np2"), vec!["p1\n\np2"]);

        let splitter = TextSplitter::new(12, 0);
        assert_eq!(
            splitter.split_text("apple pie\n\nbanana split"),
            vec!["apple pie", "banana split"]
        );
    }

    #[test]
    fn test_split_falls_back_to_characters() {
        let chunks = TextSplitter::new(10, 0).split_text(&"x".repeat(25));
        assert_eq!(
            chunks.iter().map(|c| c.chars().count()).collect::<Vec<_>>(),
            vec![10, 10, 5]
        );
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let chunks = TextSplitter::new(4, 0).split_text("项目需求 背景资料");
        assert_eq!(chunks, vec!["项目需求", "背景资料"]);
    }

    #[test]
    fn test_split_drops_blank_text() {
        assert!(TextSplitter::new(10, 0).split_text("  \n\n  ").is_empty());
    }

    #[tokio::test]
    async fn test_build_empty_returns_none() {
        let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::default());
        let splitter = TextSplitter::new(100, 10);

        let corpus = KnowledgeCorpus::build(&[], &splitter, embedder.clone(), 8)
            .await
            .unwrap();
        assert!(corpus.is_none());

        let corpus = KnowledgeCorpus::build(&["   ".to_string()], &splitter, embedder, 8)
            .await
            .unwrap();
        assert!(corpus.is_none());
    }

    #[tokio::test]
    async fn test_build_embeds_in_batches() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let corpus = KnowledgeCorpus::build(
            &["apple pie\n\nbanana split".to_string()],
            &TextSplitter::new(12, 0),
            embedder.clone(),
            1,
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(corpus.chunks(), ["apple pie", "banana split"]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let corpus = KnowledgeCorpus::build(
            &["banana split".to_string(), "apple pie".to_string()],
            &TextSplitter::new(12, 0),
            Arc::new(KeywordEmbedder::default()),
            8,
        )
        .await
        .unwrap()
        .unwrap();

        let results = corpus.query("apple", 5).await.unwrap();
        assert_eq!(results, vec!["apple pie", "banana split"]);

        let results = corpus.query("banana", 1).await.unwrap();
        assert_eq!(results, vec!["banana split"]);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }
}
