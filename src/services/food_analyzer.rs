use serde_json::{Map, Value};
use std::sync::Arc;

use super::VisionService;
use crate::models::{
    AnalysisResult, AnalyzeFoodRequest, AnalyzeFoodResponse, DEFAULT_ANALYSIS, DEFAULT_CALORIES,
    DEFAULT_FOOD_NAME,
};

/// Largest data URI forwarded upstream (20 MiB).
pub const MAX_IMAGE_DATA_URI_LEN: usize = 20 * 1024 * 1024;

pub const SUPPORTED_IMAGE_SUBTYPES: &[&str] = &[
    "jpeg", "jpg", "png", "gif", "bmp", "tiff", "tif", "webp", "avif", "heic", "heif",
];

/// Everything a food analysis request can fail with. Each variant maps to an
/// HTTP status and a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("No image provided")]
    MissingImage,
    #[error("OpenAI API key not configured")]
    ServiceUnavailable,
    #[error("{}", invalid_format_message(.rejected_upstream))]
    InvalidFormat { rejected_upstream: bool },
    #[error("Unsupported image format. Please use JPEG, PNG, WebP, HEIC, AVIF, or other common image formats.")]
    UnsupportedFormat,
    #[error("Image file is too large. Please use a smaller image.")]
    TooLarge,
    #[error("Invalid API key. Please check your OpenAI API key.")]
    InvalidCredential,
    #[error("API quota exceeded. Please check your OpenAI account or try again later.")]
    RateLimited,
    #[error("Failed to analyze food image")]
    Unknown(String),
}

fn invalid_format_message(rejected_upstream: &bool) -> &'static str {
    if *rejected_upstream {
        "Image format not supported. Please try taking a new photo or using a different image."
    } else {
        "Invalid image format. Please upload a valid image file."
    }
}

impl AnalysisError {
    pub fn status_code(&self) -> u16 {
        match self {
            AnalysisError::MissingImage
            | AnalysisError::InvalidFormat { .. }
            | AnalysisError::UnsupportedFormat
            | AnalysisError::TooLarge => 400,
            AnalysisError::InvalidCredential => 401,
            AnalysisError::RateLimited => 429,
            AnalysisError::ServiceUnavailable | AnalysisError::Unknown(_) => 500,
        }
    }

    pub fn details(&self) -> Option<String> {
        let details = match self {
            AnalysisError::InvalidFormat {
                rejected_upstream: true,
            } => "The image format is not supported by OpenAI. Try taking a new photo with your camera or using a different image file. Camera photos sometimes need to be converted to a different format.",
            AnalysisError::TooLarge => {
                "The image is larger than 20MB. Please compress or resize the image and try again."
            }
            AnalysisError::InvalidCredential => "The OpenAI API key is invalid or expired.",
            AnalysisError::RateLimited => "You have exceeded your OpenAI API usage limits. Check your account at platform.openai.com or wait for limits to reset.",
            AnalysisError::Unknown(raw) => return Some(raw.clone()),
            _ => return None,
        };
        Some(details.to_string())
    }

    pub fn to_response(&self) -> AnalyzeFoodResponse {
        AnalyzeFoodResponse::failure(self.to_string(), self.details())
    }
}

/// Turns a photo data URI into a calorie estimate through an injected vision
/// model. Holds no per-request state.
pub struct FoodAnalyzer {
    vision: Option<Arc<dyn VisionService>>,
}

impl FoodAnalyzer {
    /// `vision` is `None` when no upstream credential is configured.
    pub fn new(vision: Option<Arc<dyn VisionService>>) -> Self {
        Self { vision }
    }

    pub async fn analyze(
        &self,
        request: &AnalyzeFoodRequest,
    ) -> Result<AnalysisResult, AnalysisError> {
        let image = match request.image.as_deref() {
            Some(image) if !image.is_empty() => image,
            _ => return Err(AnalysisError::MissingImage),
        };

        let vision = self.vision.as_ref().ok_or_else(|| {
            log::error!("❌ Analysis requested but no OpenAI API key is configured");
            AnalysisError::ServiceUnavailable
        })?;

        log::info!(
            "📸 Received image: {}... (length: {})",
            image.chars().take(50).collect::<String>(),
            image.len()
        );

        validate_image(image)?;

        let prompt = build_prompt(request.description.as_deref());

        let content = vision.complete(&prompt, image).await.map_err(|e| {
            log::error!("❌ Error analyzing food: {:#}", e);
            classify_upstream_error(&format!("{:#}", e))
        })?;

        let result = parse_model_output(&content);
        log::info!("🍽️ Food analyzed: {} ({} kcal)", result.name, result.calories);
        Ok(result)
    }
}

/// Checks the data URI prefix, media subtype and length.
pub fn validate_image(image: &str) -> Result<(), AnalysisError> {
    let rest = image
        .strip_prefix("data:image/")
        .ok_or(AnalysisError::InvalidFormat {
            rejected_upstream: false,
        })?;

    let subtype_end = rest.find(|c: char| c == ';' || c == ',').unwrap_or(rest.len());
    let subtype = rest[..subtype_end].to_ascii_lowercase();
    if !SUPPORTED_IMAGE_SUBTYPES.contains(&subtype.as_str()) {
        log::warn!("⚠️ Unsupported image subtype: {}", subtype);
        return Err(AnalysisError::UnsupportedFormat);
    }

    if image.len() > MAX_IMAGE_DATA_URI_LEN {
        log::warn!("⚠️ Image too large for OpenAI API: {} bytes", image.len());
        return Err(AnalysisError::TooLarge);
    }

    Ok(())
}

pub fn build_prompt(description: Option<&str>) -> String {
    let context = match description.map(str::trim) {
        Some(description) if !description.is_empty() => {
            format!("Additional context: {}", description)
        }
        _ => String::new(),
    };

    format!(
        "Analyze this food image and provide:\n\
         1. The name of the food item\n\
         2. Estimated calories (be specific and realistic)\n\
         3. A brief explanation of how you derived the calorie estimate\n\
         \n\
         {}\n\
         \n\
         Please respond in the following JSON format:\n\
         {{\n  \"name\": \"Food name\",\n  \"calories\": number,\n  \"analysis\": \"Brief explanation of calorie estimation\"\n}}",
        context
    )
}

/// Maps an upstream failure message onto the error taxonomy. All substring
/// rules live here.
pub fn classify_upstream_error(message: &str) -> AnalysisError {
    if message.contains("429") {
        AnalysisError::RateLimited
    } else if message.contains("400")
        || message.contains("unsupported image")
        || message.contains("image_parse_error")
    {
        AnalysisError::InvalidFormat {
            rejected_upstream: true,
        }
    } else if message.contains("401") {
        AnalysisError::InvalidCredential
    } else if message.contains("quota") || message.contains("exceeded") {
        AnalysisError::RateLimited
    } else {
        AnalysisError::Unknown(message.to_string())
    }
}

/// Reads the model reply into a normalized result. The first `{` to the last
/// `}` is tried as JSON; otherwise the raw text is used.
pub fn parse_model_output(content: &str) -> AnalysisResult {
    match extract_json_object(content) {
        Some(object) => AnalysisResult {
            name: text_field(&object, "name").unwrap_or_else(|| DEFAULT_FOOD_NAME.to_string()),
            calories: object
                .get("calories")
                .and_then(calories_from_value)
                .unwrap_or(DEFAULT_CALORIES),
            analysis: text_field(&object, "analysis")
                .unwrap_or_else(|| DEFAULT_ANALYSIS.to_string()),
        },
        None => {
            log::warn!("Could not find JSON in model response, using raw text");
            let name = content
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or(DEFAULT_FOOD_NAME);
            let analysis = if content.trim().is_empty() {
                DEFAULT_ANALYSIS
            } else {
                content
            };

            AnalysisResult {
                name: name.to_string(),
                calories: DEFAULT_CALORIES,
                analysis: analysis.to_string(),
            }
        }
    }
}

fn extract_json_object(content: &str) -> Option<Map<String, Value>> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }

    match serde_json::from_str(&content[start..=end]) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Zero, negative and non-numeric values count as missing.
fn calories_from_value(value: &Value) -> Option<u32> {
    let calories = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text
            .trim()
            .trim_end_matches("kcal")
            .trim()
            .parse::<f64>()
            .ok()?,
        _ => return None,
    };

    if calories.is_finite() && calories >= 0.5 {
        Some(calories.round().min(u32::MAX as f64) as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockVision {
        reply: Result<String, String>,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<String>>,
    }

    impl MockVision {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait::async_trait]
    impl VisionService for MockVision {
        async fn complete(&self, prompt: &str, _image_data_uri: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(anyhow::anyhow!(message.clone())),
            }
        }
    }

    fn request(image: &str, description: &str) -> AnalyzeFoodRequest {
        AnalyzeFoodRequest {
            image: Some(image.to_string()),
            description: Some(description.to_string()),
        }
    }

    #[tokio::test]
    async fn test_analyze_parses_json_reply() {
        let vision = MockVision::replying(
            r#"Sure! {"name":"Apple","calories":95,"analysis":"Medium apple"}"#,
        );
        let analyzer = FoodAnalyzer::new(Some(vision.clone()));

        let result = analyzer
            .analyze(&request("data:image/png;base64,AAAA", ""))
            .await
            .unwrap();

        assert_eq!(
            result,
            AnalysisResult {
                name: "Apple".to_string(),
                calories: 95,
                analysis: "Medium apple".to_string(),
            }
        );
        assert_eq!(vision.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_analyze_falls_back_to_raw_text() {
        let text = "Looks like a banana, about 105 calories.";
        let analyzer = FoodAnalyzer::new(Some(MockVision::replying(text)));

        let result = analyzer
            .analyze(&request("data:image/jpeg;base64,AAAA", ""))
            .await
            .unwrap();

        assert_eq!(result.name, text);
        assert_eq!(result.calories, 300);
        assert_eq!(result.analysis, text);
    }

    #[tokio::test]
    async fn test_missing_image_makes_no_upstream_call() {
        let vision = MockVision::replying("{}");
        let analyzer = FoodAnalyzer::new(Some(vision.clone()));

        let err = analyzer
            .analyze(&AnalyzeFoodRequest::default())
            .await
            .unwrap_err();

        assert_eq!(err, AnalysisError::MissingImage);
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("No image provided"));
        assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_images_make_no_upstream_call() {
        let vision = MockVision::replying("{}");
        let analyzer = FoodAnalyzer::new(Some(vision.clone()));
        let oversized = format!(
            "data:image/jpeg;base64,{}",
            "A".repeat(MAX_IMAGE_DATA_URI_LEN)
        );

        let cases = [
            (
                "http://example.com/a.png".to_string(),
                AnalysisError::InvalidFormat {
                    rejected_upstream: false,
                },
            ),
            (
                "data:image/svg+xml;base64,AAAA".to_string(),
                AnalysisError::UnsupportedFormat,
            ),
            (oversized, AnalysisError::TooLarge),
        ];
        for (image, expected) in cases {
            let err = analyzer.analyze(&request(&image, "")).await.unwrap_err();
            assert_eq!(err, expected);
            assert_eq!(err.status_code(), 400);
        }

        assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_whitespace_reply_gets_defaults() {
        let analyzer = FoodAnalyzer::new(Some(MockVision::replying("  \n ")));

        let result = analyzer
            .analyze(&request("data:image/jpeg;base64,AAAA", ""))
            .await
            .unwrap();

        assert_eq!(result.name, DEFAULT_FOOD_NAME);
        assert_eq!(result.calories, DEFAULT_CALORIES);
        assert_eq!(result.analysis, DEFAULT_ANALYSIS);
    }

    #[tokio::test]
    async fn test_missing_credential_checked_before_format() {
        let analyzer = FoodAnalyzer::new(None);

        let err = analyzer
            .analyze(&request("not a data uri", ""))
            .await
            .unwrap_err();

        assert_eq!(err, AnalysisError::ServiceUnavailable);
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_description_reaches_prompt() {
        let vision = MockVision::replying("{}");
        let analyzer = FoodAnalyzer::new(Some(vision.clone()));

        analyzer
            .analyze(&request("data:image/png;base64,AAAA", "half portion, no sauce"))
            .await
            .unwrap();

        let prompt = vision.last_prompt.lock().unwrap().clone().unwrap();
        let context_at = prompt.find("Additional context: half portion, no sauce").unwrap();
        let format_at = prompt.find("Please respond in the following JSON format").unwrap();
        assert!(context_at < format_at);
    }

    #[tokio::test]
    async fn test_rate_limit_error_maps_to_429() {
        let analyzer = FoodAnalyzer::new(Some(MockVision::failing(
            "OpenAI API error (429 Too Many Requests): 400 image_parse_error",
        )));

        let err = analyzer
            .analyze(&request("data:image/png;base64,AAAA", ""))
            .await
            .unwrap_err();

        assert_eq!(err, AnalysisError::RateLimited);
        assert_eq!(err.status_code(), 429);
    }

    #[test]
    fn test_validate_image_rules() {
        assert_eq!(
            validate_image("http://example.com/a.png"),
            Err(AnalysisError::InvalidFormat {
                rejected_upstream: false
            })
        );
        assert_eq!(
            validate_image("data:image/svg+xml;base64,AAAA"),
            Err(AnalysisError::UnsupportedFormat)
        );
        assert_eq!(validate_image("data:image/HEIC;base64,AAAA"), Ok(()));

        let oversized = format!(
            "data:image/jpeg;base64,{}",
            "A".repeat(MAX_IMAGE_DATA_URI_LEN)
        );
        assert_eq!(validate_image(&oversized), Err(AnalysisError::TooLarge));
    }

    #[test]
    fn test_classify_upstream_error() {
        assert_eq!(
            classify_upstream_error("OpenAI API error (400 Bad Request): invalid image"),
            AnalysisError::InvalidFormat {
                rejected_upstream: true
            }
        );
        assert_eq!(
            classify_upstream_error("You uploaded an unsupported image."),
            AnalysisError::InvalidFormat {
                rejected_upstream: true
            }
        );
        assert_eq!(
            classify_upstream_error("OpenAI API error (401 Unauthorized): bad key"),
            AnalysisError::InvalidCredential
        );
        assert_eq!(
            classify_upstream_error("You exceeded your current quota"),
            AnalysisError::RateLimited
        );

        let err = classify_upstream_error("connection reset by peer");
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.details().as_deref(), Some("connection reset by peer"));
    }

    #[test]
    fn test_parse_defaults_missing_fields() {
        let result = parse_model_output(r#"{"name":"","calories":0}"#);

        assert_eq!(result.name, DEFAULT_FOOD_NAME);
        assert_eq!(result.calories, DEFAULT_CALORIES);
        assert_eq!(result.analysis, DEFAULT_ANALYSIS);
    }

    #[test]
    fn test_parse_rounds_fractional_and_string_calories() {
        let result = parse_model_output(r#"{"name":"Toast","calories":"120.6 kcal","analysis":"One slice"}"#);
        assert_eq!(result.calories, 121);

        let result = parse_model_output(r#"{"name":"Toast","calories":79.4,"analysis":"Thin slice"}"#);
        assert_eq!(result.calories, 79);
    }

    #[test]
    fn test_parse_uses_first_non_empty_line_on_broken_json() {
        let content = "\n  Grilled salmon  \n{ not json }\nAbout 400 calories";
        let result = parse_model_output(content);

        assert_eq!(result.name, "Grilled salmon");
        assert_eq!(result.calories, 300);
        assert_eq!(result.analysis, content);
    }

    #[test]
    fn test_parse_spans_first_to_last_brace() {
        // Two objects make the span invalid JSON, so the raw text is used.
        let content = "A {\"name\":\"x\"} and {\"y\":1}";
        let result = parse_model_output(content);

        assert_eq!(result.name, content);
        assert_eq!(result.calories, DEFAULT_CALORIES);
        assert_eq!(result.analysis, content);
    }

    #[test]
    fn test_prompt_without_description_has_no_context_line() {
        let prompt = build_prompt(Some("   "));
        assert!(!prompt.contains("Additional context"));
        assert!(prompt.contains("\"calories\": number"));
    }
}
