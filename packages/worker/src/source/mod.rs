mod compendium;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use compendium::CompendiumClient;

/// One row of the monsters export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monster {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub common_locations: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub drops: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub dlc: bool,
}

/// The upstream API sends `null` instead of `[]` for monsters without drops.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response body could not be decoded: {0}")]
    Decode(String),
}

/// Supplies the rows of a report.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn fetch_rows(&self) -> Result<Vec<Monster>, SourceError>;
}
