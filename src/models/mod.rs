use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FOOD_NAME: &str = "Unknown Food";
pub const DEFAULT_CALORIES: u32 = 300;
pub const DEFAULT_ANALYSIS: &str = "Unable to analyze food item";

/// Calorie estimate for one photographed food item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub name: String,
    pub calories: u32,
    pub analysis: String,
}

/// Body of `POST /api/analyze-food`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeFoodRequest {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Wire shape of every `POST /api/analyze-food` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalyzeFoodResponse {
    Success {
        success: bool,
        name: String,
        calories: u32,
        analysis: String,
    },
    Failure {
        success: bool,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl AnalyzeFoodResponse {
    pub fn success(result: AnalysisResult) -> Self {
        AnalyzeFoodResponse::Success {
            success: true,
            name: result.name,
            calories: result.calories,
            analysis: result.analysis,
        }
    }

    pub fn failure(error: impl Into<String>, details: Option<String>) -> Self {
        AnalyzeFoodResponse::Failure {
            success: false,
            error: error.into(),
            details,
        }
    }

    /// Converts the reply into a result, joining error and details into one
    /// user-facing line on failure.
    pub fn into_result(self) -> Result<AnalysisResult, String> {
        match self {
            AnalyzeFoodResponse::Success {
                name,
                calories,
                analysis,
                ..
            } => Ok(AnalysisResult {
                name,
                calories,
                analysis,
            }),
            AnalyzeFoodResponse::Failure { error, details, .. } => match details {
                Some(details) => Err(format!("{}. {}", error.trim_end_matches('.'), details)),
                None => Err(error),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub calories: u32,
    pub analysis: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Partial edit of a logged item; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct FoodItemUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub calories: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    pub date: NaiveDate,
    pub items: Vec<FoodItem>,
    #[serde(default)]
    pub total_calories: u32,
}

impl DailyLog {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            items: Vec::new(),
            total_calories: 0,
        }
    }

    pub fn calories(&self) -> u32 {
        self.items.iter().map(|item| item.calories).sum()
    }
}
