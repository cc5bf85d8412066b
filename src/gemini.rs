//! Client for the Gemini Generative Language REST API.

use std::future::Future;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::EndpointError;
use crate::session::Turn;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A piece of the new content sent with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    InlineData { mime_type: String, data: Vec<u8> },
}

/// Anything that can answer a conversation. The history is resent in full on
/// every call; implementations keep no state between calls.
pub trait ModelEndpoint {
    fn generate(
        &self,
        history: &[Turn],
        content: &[Part],
    ) -> impl Future<Output = Result<String, EndpointError>> + Send;
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn build_request<'a>(history: &'a [Turn], content: &'a [Part]) -> GenerateContentRequest<'a> {
    let mut contents: Vec<Content<'a>> = history
        .iter()
        .map(|turn| Content {
            role: turn.role().as_str(),
            parts: vec![WirePart::Text { text: turn.content() }],
        })
        .collect();

    let parts = content
        .iter()
        .map(|part| match part {
            Part::Text(text) => WirePart::Text { text },
            Part::InlineData { mime_type, data } => WirePart::InlineData {
                inline_data: Blob {
                    mime_type,
                    data: base64::engine::general_purpose::STANDARD.encode(data),
                },
            },
        })
        .collect();
    contents.push(Content { role: "user", parts });

    GenerateContentRequest { contents }
}

fn reply_text(response: GenerateContentResponse) -> Result<String, EndpointError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(EndpointError::Blocked(reason));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(EndpointError::EmptyResponse)?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return match candidate.finish_reason.as_deref() {
            Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") | Some("PROHIBITED_CONTENT") => {
                Err(EndpointError::Blocked(candidate.finish_reason.unwrap_or_default()))
            }
            _ => Err(EndpointError::EmptyResponse),
        };
    }

    Ok(text)
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn with_config(base_url: String, model: String, api_key: String) -> Self {
        GeminiClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Same credentials and connection pool, different model.
    pub fn for_model(&self, model: &str) -> Self {
        GeminiClient {
            model: model.to_string(),
            ..self.clone()
        }
    }

    pub fn get_model(&self) -> &str {
        &self.model
    }

    /// Shared HTTP client, also used for document downloads.
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }
}

impl ModelEndpoint for GeminiClient {
    async fn generate(&self, history: &[Turn], content: &[Part]) -> Result<String, EndpointError> {
        let request = build_request(history, content);
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        tracing::debug!(
            model = %self.model,
            history = history.len(),
            parts = content.len(),
            "sending generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EndpointError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EndpointError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Gemini API returned an error");
            return Err(EndpointError::Status { status: status.as_u16(), body });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| EndpointError::Decode(e.to_string()))?;
        let text = reply_text(parsed)?;

        tracing::debug!(model = %self.model, chars = text.len(), "received reply");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_reply(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    #[test]
    fn test_build_request_keeps_history_order() {
        let history = vec![
            Turn::user("Hello"),
            Turn::model("Hi there"),
            Turn::user("How are you?"),
            Turn::model("Fine"),
        ];
        let content = vec![Part::Text("And you?".into())];

        let value = serde_json::to_value(build_request(&history, &content)).unwrap();
        let contents = value["contents"].as_array().unwrap();

        let roles: Vec<_> = contents.iter().map(|c| c["role"].as_str().unwrap()).collect();
        assert_eq!(roles, ["user", "model", "user", "model", "user"]);
        assert_eq!(contents[1]["parts"][0]["text"], "Hi there");
        assert_eq!(contents[4]["parts"][0]["text"], "And you?");
    }

    #[test]
    fn test_build_request_inline_data() {
        let content = vec![
            Part::Text("What is this?".into()),
            Part::InlineData { mime_type: "image/png".into(), data: vec![1, 2, 3] },
        ];

        let value = serde_json::to_value(build_request(&[], &content)).unwrap();
        let parts = &value["contents"][0]["parts"];

        assert_eq!(parts[0]["text"], "What is this?");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "AQID");
    }

    #[test]
    fn test_reply_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hi " }, { "text": "there" }] } }]
        }))
        .unwrap();
        assert_eq!(reply_text(response).unwrap(), "Hi there");
    }

    #[test]
    fn test_reply_text_blocked_prompt() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        assert!(matches!(reply_text(response), Err(EndpointError::Blocked(r)) if r == "SAFETY"));
    }

    #[test]
    fn test_reply_text_without_candidates() {
        let response: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(reply_text(response), Err(EndpointError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_generate_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-pro:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("Hi there")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::with_config(server.uri(), "gemini-pro".into(), "test-key".into());
        let reply = client
            .generate(&[], &[Part::Text("Hello".into())])
            .await
            .unwrap();
        assert_eq!(reply, "Hi there");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hello");
    }

    #[tokio::test]
    async fn test_generate_reports_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let client = GeminiClient::with_config(server.uri(), "gemini-pro".into(), "k".into());
        let err = client.generate(&[], &[Part::Text("Hello".into())]).await.unwrap_err();
        assert!(matches!(err, EndpointError::Status { status: 429, ref body } if body == "quota exceeded"));
    }

    #[test]
    fn test_for_model_keeps_endpoint() {
        let client = GeminiClient::with_config(
            "https://example.test/v1beta/".into(),
            "gemini-pro".into(),
            "k".into(),
        );
        let vision = client.for_model("gemini-1.5-flash");
        assert_eq!(vision.get_model(), "gemini-1.5-flash");
        assert_eq!(vision.base_url, "https://example.test/v1beta");
    }
}
