//! [`Oracle`] backed by an OpenAI-compatible chat completions endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::error::OracleError;
use crate::{Message, Oracle};

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct OpenAiOracle {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiOracle {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

fn extract_reply(response: ChatCompletionResponse) -> Result<String, OracleError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| {
            OracleError::MalformedResponse("response contained no message content".into())
        })
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn complete(&self, conversation: &[Message]) -> Result<String, OracleError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: conversation,
            max_tokens: self.config.max_tokens,
        };
        debug!(model = %self.config.model, messages = conversation.len(), "calling oracle");

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| OracleError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| OracleError::MalformedResponse(err.to_string()))?;
        extract_reply(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_chat_roles() {
        let messages = vec![Message::system("be brief"), Message::user("your move")];
        let body = serde_json::to_value(ChatCompletionRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            max_tokens: 3000,
        })
        .unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "your move");
        assert_eq!(body["max_tokens"], 3000);
    }

    #[test]
    fn reply_is_trimmed_first_choice() {
        let response: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "  thinking...\n**Move: e4**\n "}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_reply(response).unwrap(), "thinking...\n**Move: e4**");
    }

    #[test]
    fn reports_configured_model() {
        let oracle = OpenAiOracle::new(OpenAiConfig::new("sk-test").with_model("gpt-4o"));
        assert_eq!(oracle.model(), "gpt-4o");
    }

    #[test]
    fn empty_envelope_is_malformed() {
        let response: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            extract_reply(response),
            Err(OracleError::MalformedResponse(_))
        ));

        let response: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert!(extract_reply(response).is_err());
    }
}
