//! Retrieval-augmented question answering.
//!
//! Retrieves the top-k chunks for a question, places all of them in one
//! grounded prompt, and asks the chat model. The answer comes back with the
//! chunks it was built from so callers can cite them.

use serde::Serialize;

use crate::completion::ChatModel;
use crate::error::{Error, Result};
use crate::models::ScoredChunk;
use crate::store::VectorIndex;

/// Characters of chunk text kept in each [`SourceRef::excerpt`].
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    pub score: f32,
    pub excerpt: String,
}

impl From<&ScoredChunk> for SourceRef {
    fn from(chunk: &ScoredChunk) -> Self {
        Self {
            source: chunk.metadata.source.clone(),
            source_id: chunk.metadata.source_id.clone(),
            page: chunk.metadata.page,
            sheet_name: chunk.metadata.sheet_name.clone(),
            score: chunk.score,
            excerpt: chunk.content.chars().take(EXCERPT_CHARS).collect(),
        }
    }
}

pub fn build_prompt(question: &str, context: &[ScoredChunk]) -> String {
    let context = context
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "You are an assistant that answers only from the provided context. \
         If the answer is not in the context, say that you don't know.\n\n\
         Context: {}\n\nQuestion: {}",
        context, question
    )
}

pub async fn answer_question(
    index: &dyn VectorIndex,
    chat: &dyn ChatModel,
    question: &str,
    k: usize,
) -> Result<Answer> {
    let question = question.trim();
    if question.is_empty() {
        return Err(Error::InvalidInput(
            "question must not be empty".to_string(),
        ));
    }

    let hits = index.similarity_search(question, k).await?;
    tracing::debug!(hits = hits.len(), k, "context retrieved");

    let answer = chat.complete(&build_prompt(question, &hits)).await?;
    Ok(Answer {
        question: question.to_string(),
        answer,
        sources: hits.iter().map(SourceRef::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::models::{Chunk, ChunkMetadata};
    use crate::store::InMemoryIndex;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Echoes the prompt back so tests can inspect it.
    struct EchoChat {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for EchoChat {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.seen.lock().unwrap().push(prompt.to_string());
            Ok("forty-two".to_string())
        }
    }

    async fn seeded_index() -> InMemoryIndex {
        let index = InMemoryIndex::new(Arc::new(HashingEmbedder::default()));
        let long = "The warehouse opens at nine. ".repeat(10);
        index
            .add(&[
                Chunk {
                    content: long,
                    metadata: ChunkMetadata {
                        source: "data/ops.pdf".to_string(),
                        source_id: "ops.pdf".to_string(),
                        file_type: "pdf".to_string(),
                        page: Some(3),
                        sheet_name: None,
                    },
                },
                Chunk {
                    content: "Cats like warm windowsills.".to_string(),
                    metadata: ChunkMetadata {
                        source: "data/cats.txt".to_string(),
                        source_id: "cats.txt".to_string(),
                        file_type: "txt".to_string(),
                        page: None,
                        sheet_name: None,
                    },
                },
            ])
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn answer_cites_retrieved_chunks() {
        let index = seeded_index().await;
        let chat = EchoChat {
            seen: Mutex::new(Vec::new()),
        };

        let answer = answer_question(&index, &chat, "  When does the warehouse open? ", 1)
            .await
            .unwrap();
        assert_eq!(answer.question, "When does the warehouse open?");
        assert_eq!(answer.answer, "forty-two");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].source_id, "ops.pdf");
        assert_eq!(answer.sources[0].page, Some(3));
        assert_eq!(answer.sources[0].excerpt.chars().count(), 200);

        let seen = chat.seen.lock().unwrap();
        let prompt = &seen[0];
        assert!(prompt.contains("The warehouse opens at nine."));
        assert!(prompt.contains("Question: When does the warehouse open?"));
        assert!(prompt.contains("don't know"));
    }

    #[tokio::test]
    async fn empty_question_rejected() {
        let index = seeded_index().await;
        let chat = EchoChat {
            seen: Mutex::new(Vec::new()),
        };
        let err = answer_question(&index, &chat, "   ", 5).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{}", err);
        assert_eq!(err.to_string(), "invalid input: question must not be empty");
        assert!(chat.seen.lock().unwrap().is_empty());
    }
}
