use anyhow::Result;

use crate::models::{AnalysisResult, AnalyzeFoodRequest, AnalyzeFoodResponse};

/// Client for the tracker's own `/api/analyze-food` endpoint.
pub struct TrackerClient {
    server_url: String,
    client: reqwest::Client,
}

impl TrackerClient {
    pub fn new(server_url: String) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn analyze_food(
        &self,
        image_data_uri: &str,
        description: Option<&str>,
    ) -> Result<AnalysisResult> {
        let request = AnalyzeFoodRequest {
            image: Some(image_data_uri.to_string()),
            description: description.map(str::to_string),
        };

        log::info!("🔍 Starting food analysis, sending image to {}", self.server_url);

        let response = self
            .client
            .post(format!("{}/api/analyze-food", self.server_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body: AnalyzeFoodResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Unexpected reply from server ({}): {}", status, e))?;

        match body.into_result() {
            Ok(result) => {
                log::info!("✅ Food analyzed: {} ({} calories)", result.name, result.calories);
                Ok(result)
            }
            Err(message) => {
                log::error!("❌ Analysis failed ({}): {}", status, message);
                anyhow::bail!(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/analyze-food")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"image":"data:image/jpeg;base64,AAAA","description":"toast"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"name":"Toast","calories":120,"analysis":"One slice"}"#)
            .create_async()
            .await;

        let result = TrackerClient::new(format!("{}/", server.url()))
            .analyze_food("data:image/jpeg;base64,AAAA", Some("toast"))
            .await
            .unwrap();

        assert_eq!(result.name, "Toast");
        assert_eq!(result.calories, 120);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failure_reply_carries_error_and_details() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/analyze-food")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":false,"error":"Invalid API key. Please check your OpenAI API key.","details":"The OpenAI API key is invalid or expired."}"#)
            .create_async()
            .await;

        let err = TrackerClient::new(server.url())
            .analyze_food("data:image/jpeg;base64,AAAA", None)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Invalid API key. Please check your OpenAI API key. The OpenAI API key is invalid or expired."
        );
    }
}
