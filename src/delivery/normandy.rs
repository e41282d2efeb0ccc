use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{DeliveryClient, DeliveryError, RecipeStatus};
use crate::experiment::UserId;

/// REST client for the Normandy recipe API
#[derive(Debug, Clone)]
pub struct NormandyClient {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct RecipeResponse {
    #[serde(default)]
    approved_revision: Option<Revision>,
}

#[derive(Debug, Deserialize)]
struct Revision {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    enabled_states: Vec<EnabledState>,
    #[serde(default)]
    arguments: Option<Arguments>,
}

#[derive(Debug, Deserialize)]
struct EnabledState {
    #[serde(default)]
    creator: Option<Creator>,
}

#[derive(Debug, Deserialize)]
struct Creator {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Arguments {
    #[serde(rename = "isEnrollmentPaused", default)]
    is_enrollment_paused: bool,
}

impl NormandyClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn recipe_url(&self, recipe_id: u64) -> String {
        format!("{}/recipe/{}/", self.api_url, recipe_id)
    }
}

#[async_trait]
impl DeliveryClient for NormandyClient {
    async fn recipe_status(&self, recipe_id: u64) -> Result<RecipeStatus, DeliveryError> {
        let url = self.recipe_url(recipe_id);
        debug!(recipe_id, url = %url, "Fetching recipe");
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            warn!(recipe_id, "Recipe not found");
            return Err(DeliveryError::RecipeNotFound { recipe_id });
        }
        if !response.status().is_success() {
            return Err(DeliveryError::UnexpectedStatus {
                recipe_id,
                status: response.status().as_u16(),
            });
        }

        let body: RecipeResponse = response.json().await?;
        let Some(revision) = body.approved_revision else {
            return Ok(RecipeStatus {
                recipe_id,
                ..Default::default()
            });
        };

        let enabled_by = revision
            .enabled_states
            .first()
            .and_then(|s| s.creator.as_ref())
            .and_then(|c| c.email.clone())
            .map(UserId::new);

        Ok(RecipeStatus {
            recipe_id,
            approved: true,
            enabled: revision.enabled,
            enrollment_paused: revision
                .arguments
                .map(|a| a.is_enrollment_paused)
                .unwrap_or(false),
            enabled_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipe_url_normalizes_trailing_slash() {
        let client = NormandyClient::new("https://normandy.example.com/api/v3/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.recipe_url(42),
            "https://normandy.example.com/api/v3/recipe/42/"
        );
    }

    #[test]
    fn test_response_parsing_tolerates_null_creator() {
        let raw = r#"{"approved_revision": {"enabled": true, "enabled_states": [{"creator": null}]}}"#;
        let body: RecipeResponse = serde_json::from_str(raw).unwrap();
        let revision = body.approved_revision.unwrap();
        assert!(revision.enabled);
        assert!(revision.enabled_states[0].creator.is_none());
        assert!(revision.arguments.is_none());
    }
}
