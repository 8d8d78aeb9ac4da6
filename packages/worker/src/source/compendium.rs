use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{ArtifactSource, Monster, SourceError};

#[derive(Debug, Deserialize)]
struct CategoryResponse {
    data: Vec<Monster>,
}

/// HTTP client for the monsters category of the Hyrule compendium API.
#[derive(Clone)]
pub struct CompendiumClient {
    http: reqwest::Client,
    base_url: String,
}

impl CompendiumClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn monsters_url(&self) -> String {
        format!("{}/category/monsters", self.base_url)
    }
}

#[async_trait]
impl ArtifactSource for CompendiumClient {
    async fn fetch_rows(&self) -> Result<Vec<Monster>, SourceError> {
        let url = self.monsters_url();
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let parsed: CategoryResponse =
            serde_json::from_slice(&body).map_err(|e| SourceError::Decode(e.to_string()))?;

        debug!(url = %url, rows = parsed.data.len(), "Fetched source rows");
        Ok(parsed.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(template: ResponseTemplate) -> (CompendiumClient, MockServer) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/compendium/category/monsters"))
            .respond_with(template)
            .mount(&server)
            .await;
        let client = CompendiumClient::new(
            format!("{}/api/v3/compendium/", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn decodes_monsters() {
        let body = serde_json::json!({
            "data": [
                {
                    "id": 123,
                    "name": "bokoblin",
                    "description": "common enemy",
                    "common_locations": ["Hyrule Field", "Great Plateau"],
                    "drops": ["bokoblin horn"],
                    "category": "monsters",
                    "image": "https://example.com/123/image",
                    "dlc": false
                }
            ]
        });
        let (client, _server) = client_for(ResponseTemplate::new(200).set_body_json(body)).await;

        let rows = client.fetch_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 123);
        assert_eq!(rows[0].common_locations, vec!["Hyrule Field", "Great Plateau"]);
    }

    #[tokio::test]
    async fn empty_data_is_not_an_error_here() {
        let (client, _server) =
            client_for(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
                .await;
        assert!(client.fetch_rows().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_success_status() {
        let (client, _server) = client_for(ResponseTemplate::new(503)).await;
        assert!(matches!(
            client.fetch_rows().await,
            Err(SourceError::Status(503))
        ));
    }

    #[tokio::test]
    async fn undecodable_body() {
        let (client, _server) =
            client_for(ResponseTemplate::new(200).set_body_string("<html>oops</html>")).await;
        assert!(matches!(
            client.fetch_rows().await,
            Err(SourceError::Decode(_))
        ));
    }
}
