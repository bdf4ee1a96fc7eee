pub mod ai_service;
pub mod food_analyzer;
pub mod food_log; // Local JSON key-value store
pub mod image_normalizer;
pub mod openai; // OpenAI chat-completions client
pub mod report;
pub mod tracker_client;

pub use ai_service::VisionService;
pub use food_analyzer::{AnalysisError, FoodAnalyzer};
pub use food_log::FoodLogStore;
pub use image_normalizer::{ImageNormalizer, UploadedImage};
pub use openai::OpenAIService;
pub use tracker_client::TrackerClient;
