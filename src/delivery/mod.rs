// Delivery system (Normandy) collaborator: recipe lookups and recipe payloads

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::experiment::UserId;

pub mod normandy;
pub mod recipe;

pub use normandy::NormandyClient;
pub use recipe::{build_recipe, filter_expression, RecipeArguments, RecipePayload};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Recipe {recipe_id} not found")]
    RecipeNotFound { recipe_id: u64 },

    #[error("Delivery API returned HTTP {status} for recipe {recipe_id}")]
    UnexpectedStatus { recipe_id: u64, status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Recipe payload unavailable: {reason}")]
    PayloadUnavailable { reason: String },
}

/// What the delivery system currently says about one recipe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeStatus {
    pub recipe_id: u64,
    /// An approved revision exists
    pub approved: bool,
    /// The approved revision is enabled (shipping to users)
    pub enabled: bool,
    pub enrollment_paused: bool,
    /// Who flipped the recipe on, if the delivery system says
    pub enabled_by: Option<UserId>,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn recipe_status(&self, recipe_id: u64) -> Result<RecipeStatus, DeliveryError>;
}
