//! Answer generation from retrieved page images.

use crate::config::LlmConfig;
use crate::corpus::PageImage;
use crate::error::Result;
use crate::llm::{ContentPart, LlmClient, Message, Prompts};
use async_trait::async_trait;

/// Writes an answer to a question given the relevant page images.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(
        &self,
        images: &[PageImage],
        question: &str,
        max_new_tokens: u32,
    ) -> Result<String>;
}

/// Vision-language model behind an OpenAI-compatible endpoint.
pub struct VisionGenerator {
    client: LlmClient,
}

impl VisionGenerator {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: LlmClient::new(config),
        }
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }
}

#[async_trait]
impl AnswerGenerator for VisionGenerator {
    async fn generate(
        &self,
        images: &[PageImage],
        question: &str,
        max_new_tokens: u32,
    ) -> Result<String> {
        let mut parts = Vec::with_capacity(images.len() + 1);
        for image in images {
            let bytes = image.read_bytes()?;
            parts.push(ContentPart::image(image.mime_type(), &bytes));
        }
        parts.push(ContentPart::text(question));

        tracing::debug!(
            model = self.client.model(),
            images = images.len(),
            "generating answer"
        );
        let messages = vec![
            Message::system(Prompts::answer_from_pages()),
            Message::user_parts(parts),
        ];
        let response = self.client.chat_with_limit(messages, max_new_tokens).await?;
        if response.is_truncated() {
            tracing::warn!(max_new_tokens, "answer stopped at the output token limit");
        }
        Ok(response.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::PageRef;
    use mockito::Matcher;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sends_images_before_question() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.png");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let images = vec![PageImage {
            page: PageRef::new(0, 1),
            path,
        }];

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({"max_tokens": 64})),
                Matcher::Regex(r"data:image/png;base64,AQID.*What is on the page\?".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"  A wiring diagram.\n"}}]}"#)
            .create_async()
            .await;

        let generator = VisionGenerator::new(LlmConfig {
            api_base: server.url(),
            ..Default::default()
        });
        let answer = generator
            .generate(&images, "What is on the page?", 64)
            .await
            .unwrap();

        assert_eq!(answer, "A wiring diagram.");
        mock.assert_async().await;
    }
}
