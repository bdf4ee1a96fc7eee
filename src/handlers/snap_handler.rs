use anyhow::Result;
use chrono::Utc;
use std::path::Path;

use crate::models::FoodItem;
use crate::services::report::{format_goal_bar, GoalProgress};
use crate::services::{FoodLogStore, ImageNormalizer, TrackerClient, UploadedImage};

/// Photo -> JPEG -> calorie estimate -> today's log.
pub struct SnapHandler {
    normalizer: ImageNormalizer,
    client: TrackerClient,
}

impl SnapHandler {
    pub fn new(normalizer: ImageNormalizer, client: TrackerClient) -> Self {
        Self { normalizer, client }
    }

    pub async fn handle_photo(
        &self,
        store: &mut FoodLogStore,
        photo: &Path,
        description: Option<&str>,
    ) -> Result<FoodItem> {
        log::info!("📨 New photo: {} | Description: {:?}", photo.display(), description);

        let upload = UploadedImage::from_path(photo).await?;
        // Consumes the raw file; only the JPEG is kept past this point.
        let encoded = self.normalizer.normalize_blocking(upload).await?;

        let result = self
            .client
            .analyze_food(&encoded.data_uri, description)
            .await?;

        store
            .add_item(
                result,
                description.map(str::to_string),
                Some(encoded.data_uri),
                Utc::now(),
            )
            .await
    }
}

/// Confirmation shown after a photo is logged.
pub fn format_snap_summary(item: &FoodItem, today_total: u32, goal: u32) -> String {
    format!(
        "✅ Logged!\n\n\
         🍽️ {}\n\
         🔥 {} kcal\n\
         📝 {}\n\n\
         {}",
        item.name,
        item.calories,
        item.analysis,
        format_goal_bar(&GoalProgress::new(today_total, goal))
    )
}
