use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{AnalysisResult, DailyLog, FoodItem, FoodItemUpdate};

pub const DEFAULT_DAILY_GOAL: u32 = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreDocument {
    #[serde(default)]
    food_logs: Vec<DailyLog>,
    #[serde(default = "default_goal")]
    daily_goal: u32,
}

fn default_goal() -> u32 {
    DEFAULT_DAILY_GOAL
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            food_logs: Vec::new(),
            daily_goal: DEFAULT_DAILY_GOAL,
        }
    }
}

/// Local key-value store of daily food logs and the calorie goal, kept in a
/// single JSON file that is rewritten after every change.
pub struct FoodLogStore {
    path: PathBuf,
    document: StoreDocument,
}

impl FoodLogStore {
    /// Loads the store; a missing file means an empty log.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let document = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("Corrupted food log store {}: {}", path.display(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("📁 No food log at {}, starting empty", path.display());
                StoreDocument::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self { path, document })
    }

    async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let raw = serde_json::to_string_pretty(&self.document)?;
        tokio::fs::write(&self.path, raw).await?;
        log::debug!("💾 Food log saved to {}", self.path.display());
        Ok(())
    }

    pub fn daily_goal(&self) -> u32 {
        self.document.daily_goal
    }

    pub async fn set_daily_goal(&mut self, goal: u32) -> Result<()> {
        if goal == 0 {
            anyhow::bail!("Daily goal must be greater than zero");
        }

        self.document.daily_goal = goal;
        self.save().await
    }

    pub fn logs(&self) -> &[DailyLog] {
        &self.document.food_logs
    }

    pub fn log_for(&self, date: NaiveDate) -> Option<&DailyLog> {
        self.document.food_logs.iter().find(|log| log.date == date)
    }

    pub fn calories_for(&self, date: NaiveDate) -> u32 {
        self.log_for(date).map(DailyLog::calories).unwrap_or(0)
    }

    /// Records an analyzed photo in the log of the day `now` falls on.
    pub async fn add_item(
        &mut self,
        result: AnalysisResult,
        description: Option<String>,
        image_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<FoodItem> {
        let description = description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| result.name.clone());

        let item = FoodItem {
            id: self.next_id(now),
            name: result.name,
            description: Some(description),
            calories: result.calories,
            analysis: result.analysis,
            image_url,
            timestamp: now,
        };

        let date = now.date_naive();
        let index = match self.document.food_logs.iter().position(|log| log.date == date) {
            Some(index) => index,
            None => {
                self.document.food_logs.push(DailyLog::new(date));
                self.document.food_logs.len() - 1
            }
        };

        let log = &mut self.document.food_logs[index];
        log.items.push(item.clone());
        log.total_calories = log.calories();

        self.save().await?;
        log::info!("🍽️ Logged {} ({} kcal) on {}", item.name, item.calories, date);
        Ok(item)
    }

    /// Applies `update` to the item with `id`. Returns `false` when no such
    /// item exists.
    pub async fn update_item(&mut self, id: &str, update: FoodItemUpdate) -> Result<bool> {
        let mut found = false;

        for log in &mut self.document.food_logs {
            if let Some(item) = log.items.iter_mut().find(|item| item.id == id) {
                if let Some(name) = update.name.clone() {
                    item.name = name;
                }
                if let Some(description) = update.description.clone() {
                    item.description = Some(description);
                }
                if let Some(calories) = update.calories {
                    item.calories = calories;
                }
                log.total_calories = log.calories();
                found = true;
                break;
            }
        }

        if found {
            self.save().await?;
        }
        Ok(found)
    }

    /// Returns `false` when no item with `id` exists.
    pub async fn delete_item(&mut self, id: &str) -> Result<bool> {
        let mut found = false;

        for log in &mut self.document.food_logs {
            let before = log.items.len();
            log.items.retain(|item| item.id != id);
            if log.items.len() != before {
                log.total_calories = log.calories();
                found = true;
            }
        }

        if found {
            self.save().await?;
        }
        Ok(found)
    }

    /// Millisecond timestamp, bumped past any id already in use.
    fn next_id(&self, now: DateTime<Utc>) -> String {
        let mut candidate = now.timestamp_millis();
        while self.contains_id(&candidate.to_string()) {
            candidate += 1;
        }
        candidate.to_string()
    }

    fn contains_id(&self, id: &str) -> bool {
        self.document
            .food_logs
            .iter()
            .flat_map(|log| log.items.iter())
            .any(|item| item.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn result(name: &str, calories: u32) -> AnalysisResult {
        AnalysisResult {
            name: name.to_string(),
            calories,
            analysis: format!("{} analysis", name),
        }
    }

    fn noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty_with_default_goal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FoodLogStore::open(dir.path().join("logs.json")).await.unwrap();

        assert!(store.logs().is_empty());
        assert_eq!(store.daily_goal(), DEFAULT_DAILY_GOAL);
    }

    #[tokio::test]
    async fn test_items_grouped_by_day_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logs.json");

        let mut store = FoodLogStore::open(&path).await.unwrap();
        store.add_item(result("Oatmeal", 150), None, None, noon(4)).await.unwrap();
        store
            .add_item(result("Pasta", 600), Some("big bowl".to_string()), None, noon(4))
            .await
            .unwrap();
        store.add_item(result("Salad", 250), None, None, noon(5)).await.unwrap();

        let reopened = FoodLogStore::open(&path).await.unwrap();
        assert_eq!(reopened.logs().len(), 2);
        assert_eq!(reopened.calories_for(noon(4).date_naive()), 750);
        assert_eq!(reopened.calories_for(noon(5).date_naive()), 250);
        assert_eq!(reopened.log_for(noon(4).date_naive()).unwrap().total_calories, 750);

        let items = &reopened.log_for(noon(4).date_naive()).unwrap().items;
        assert_eq!(items[0].description.as_deref(), Some("Oatmeal"));
        assert_eq!(items[1].description.as_deref(), Some("big bowl"));
    }

    #[tokio::test]
    async fn test_ids_stay_unique_within_same_millisecond() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FoodLogStore::open(dir.path().join("logs.json")).await.unwrap();

        let first = store.add_item(result("Apple", 95), None, None, noon(1)).await.unwrap();
        let second = store.add_item(result("Pear", 100), None, None, noon(1)).await.unwrap();

        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FoodLogStore::open(dir.path().join("logs.json")).await.unwrap();
        let item = store.add_item(result("Burger", 700), None, None, noon(2)).await.unwrap();

        let updated = store
            .update_item(
                &item.id,
                FoodItemUpdate {
                    calories: Some(550),
                    ..FoodItemUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(updated);
        assert_eq!(store.calories_for(noon(2).date_naive()), 550);
        assert_eq!(store.log_for(noon(2).date_naive()).unwrap().items[0].name, "Burger");

        assert!(!store.update_item("missing", FoodItemUpdate::default()).await.unwrap());

        assert!(store.delete_item(&item.id).await.unwrap());
        assert_eq!(store.calories_for(noon(2).date_naive()), 0);
        assert!(!store.delete_item(&item.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_goal_must_be_positive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.json");
        let mut store = FoodLogStore::open(&path).await.unwrap();

        assert!(store.set_daily_goal(0).await.is_err());
        store.set_daily_goal(1800).await.unwrap();

        assert_eq!(FoodLogStore::open(&path).await.unwrap().daily_goal(), 1800);
    }

    #[tokio::test]
    async fn test_reads_browser_style_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.json");
        tokio::fs::write(
            &path,
            r#"{"foodLogs":[{"date":"2024-03-01","items":[{"id":"1","name":"Tea","calories":30,"analysis":"Cup","timestamp":"2024-03-01T08:00:00Z"}],"totalCalories":0}]}"#,
        )
        .await
        .unwrap();

        let store = FoodLogStore::open(&path).await.unwrap();

        assert_eq!(store.daily_goal(), DEFAULT_DAILY_GOAL);
        assert_eq!(store.calories_for(noon(1).date_naive()), 30);
    }
}
