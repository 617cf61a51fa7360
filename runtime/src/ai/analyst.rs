use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use super::{
    chat::{ChatClient, ChatMessage, ChatRequest, Usage},
    tokenizer::{Tokenizer, truncate_to_budget},
};
use crate::{config::LlmConfig, ingest::StructureSummary};

const ANALYZE_PROMPT: &str = "You are a helpful document analysis assistant. Analyze the provided document and answer questions about it accurately and concisely. Use the document structure information to provide more accurate answers.";
const TABULAR_PROMPT: &str = "You are a data analysis assistant. Analyze the provided CSV data and answer questions about it.";
const TABULAR_TEMPERATURE: f32 = 0.2;

/// What the analyst sees: extracted text, the optional structure digest,
/// and the user's question.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub text: &'a str,
    pub summary: Option<&'a StructureSummary>,
    pub query: &'a str,
    pub tabular: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub response: String,
    pub model: String,
    pub usage: Usage,
    pub used_structure: bool,
}

#[async_trait]
pub trait DocumentAnalyst: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest<'_>) -> Result<Analysis>;
}

pub struct OpenAiAnalyst {
    client: ChatClient,
    tokenizer: Arc<dyn Tokenizer>,
    config: LlmConfig,
}

impl OpenAiAnalyst {
    pub fn new(client: ChatClient, tokenizer: Arc<dyn Tokenizer>, config: LlmConfig) -> Self {
        Self {
            client,
            tokenizer,
            config,
        }
    }
}

#[async_trait]
impl DocumentAnalyst for OpenAiAnalyst {
    async fn analyze(&self, request: AnalysisRequest<'_>) -> Result<Analysis> {
        let content = truncate_to_budget(
            self.tokenizer.as_ref(),
            request.text,
            self.config.max_context_tokens,
        )
        .context("failed to fit document into token budget")?;

        let chat = ChatRequest {
            model: self.config.model.clone(),
            messages: build_messages(&request, &content),
            temperature: if request.tabular {
                TABULAR_TEMPERATURE
            } else {
                self.config.temperature
            },
            max_tokens: self.config.max_response_tokens,
        };

        let completion = self.client.complete(&chat).await?;
        info!(
            model = %self.config.model,
            total_tokens = completion.usage.total_tokens,
            "document query answered"
        );

        Ok(Analysis {
            response: completion.content,
            model: self.config.model.clone(),
            usage: completion.usage,
            used_structure: request.summary.is_some() && !request.tabular,
        })
    }
}

/// System + user messages for a query. `content` is the already-truncated text.
pub fn build_messages(request: &AnalysisRequest<'_>, content: &str) -> Vec<ChatMessage> {
    if request.tabular {
        return vec![
            ChatMessage::system(TABULAR_PROMPT),
            ChatMessage::user(format!("CSV DATA:\n{content}\n\nQUERY:\n{}", request.query)),
        ];
    }

    let user = match request.summary {
        Some(summary) => format!(
            "DOCUMENT TITLE: {}\n\nDOCUMENT STRUCTURE:\n{}\n\nDOCUMENT CONTENT:\n{content}\n\nQUERY:\n{}",
            summary.title,
            summary.render(),
            request.query
        ),
        None => format!("DOCUMENT:\n{content}\n\nQUERY:\n{}", request.query),
    };
    vec![ChatMessage::system(ANALYZE_PROMPT), ChatMessage::user(user)]
}
