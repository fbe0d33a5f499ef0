//! The AI flows of the prayer journal, each routed through the flow cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use prayer_ai_cache::{FlowCache, FlowOptions};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{FlowsError, FlowsResult};
use crate::model::{GenerationRequest, GenerativeModel, MediaPart};
use crate::parse::parse_model_json;
use crate::types::{CategorySuggestion, DailyVerse, PrayerPoint, Transcription};

/// Operation names, which also namespace the cache and the rate windows
pub mod operations {
    pub const DAILY_VERSE: &str = "dailyVerse";
    pub const EXTRACT_PRAYER_POINTS: &str = "extractPrayerPoints";
    pub const EXTRACT_FROM_IMAGE: &str = "extractPrayerPointsFromImage";
    pub const TRANSCRIBE_AUDIO: &str = "transcribeAudio";
    pub const SUGGEST_CATEGORY: &str = "suggestCategory";
}

use operations::*;

const DAILY_VERSE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const PRAYER_POINTS_FORMAT: &str = r#"Answer with a JSON array only. Each element has the fields "title" (a few words), "description" (one or two sentences) and optionally "category"."#;

/// Cached AI flows over a generative model
pub struct PrayerFlows<M> {
    model: Arc<M>,
    cache: FlowCache,
}

impl<M> Clone for PrayerFlows<M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<M: GenerativeModel> PrayerFlows<M> {
    pub fn new(model: Arc<M>, cache: FlowCache) -> Self {
        Self { model, cache }
    }

    pub fn cache(&self) -> &FlowCache {
        &self.cache
    }

    /// A verse for the given day, cached for a full day
    pub async fn daily_verse(&self, date: NaiveDate) -> FlowsResult<DailyVerse> {
        let date = date.format("%Y-%m-%d").to_string();
        let prompt = format!(
            "Suggest an encouraging Bible verse for {date}. \
             Answer with a JSON object with the fields \"verse\" (the text) and \"reference\" (book chapter:verse)."
        );

        self.cache
            .execute_flow(
                DAILY_VERSE,
                move || async move { self.generate_json(DAILY_VERSE, GenerationRequest::text(prompt)).await },
                &json!({ "date": date }),
                FlowOptions::default().with_ttl(DAILY_VERSE_TTL),
            )
            .await
            .map_err(FlowsError::lift)
    }

    /// The verse for the current local date
    pub async fn todays_verse(&self) -> FlowsResult<DailyVerse> {
        self.daily_verse(Local::now().date_naive()).await
    }

    /// Prayer requests found in a journal entry
    pub async fn extract_prayer_points(&self, text: &str) -> FlowsResult<Vec<PrayerPoint>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(FlowsError::EmptyInput("some journal text".to_string()));
        }

        let prompt = format!(
            "Extract the prayer requests from this journal entry.\n{PRAYER_POINTS_FORMAT}\n\nEntry:\n{text}"
        );

        self.cache
            .execute_flow(
                EXTRACT_PRAYER_POINTS,
                move || async move { self.generate_json(EXTRACT_PRAYER_POINTS, GenerationRequest::text(prompt)).await },
                &json!({ "text": text }),
                FlowOptions::default(),
            )
            .await
            .map_err(FlowsError::lift)
    }

    /// Prayer requests found in a photo of a handwritten or printed list
    ///
    /// The image is keyed by its digest so the cache never holds the bytes.
    pub async fn extract_from_image(&self, mime_type: &str, image: &[u8]) -> FlowsResult<Vec<PrayerPoint>> {
        if image.is_empty() {
            return Err(FlowsError::EmptyInput("an image".to_string()));
        }

        let params = json!({ "mimeType": mime_type, "sha256": sha256_hex(image) });
        let request = GenerationRequest::text(format!(
            "Read the prayer requests written in this image.\n{PRAYER_POINTS_FORMAT}"
        ))
        .with_media(MediaPart::inline(mime_type, image));

        self.cache
            .execute_flow(
                EXTRACT_FROM_IMAGE,
                move || async move { self.generate_json(EXTRACT_FROM_IMAGE, request).await },
                &params,
                FlowOptions::default(),
            )
            .await
            .map_err(FlowsError::lift)
    }

    /// Text of a recorded prayer or journal entry
    pub async fn transcribe_audio(&self, mime_type: &str, audio: &[u8]) -> FlowsResult<Transcription> {
        if audio.is_empty() {
            return Err(FlowsError::EmptyInput("a recording".to_string()));
        }

        let params = json!({ "mimeType": mime_type, "sha256": sha256_hex(audio) });
        let request = GenerationRequest::text(
            "Transcribe this recording. Answer with a JSON object with the single field \"text\".",
        )
        .with_media(MediaPart::inline(mime_type, audio));

        self.cache
            .execute_flow(
                TRANSCRIBE_AUDIO,
                move || async move { self.generate_json(TRANSCRIBE_AUDIO, request).await },
                &params,
                FlowOptions::default(),
            )
            .await
            .map_err(FlowsError::lift)
    }

    /// The best fitting of the given categories for a prayer point
    ///
    /// An answer outside `categories` falls back to the first one.
    pub async fn suggest_category(&self, text: &str, categories: &[String]) -> FlowsResult<CategorySuggestion> {
        let text = text.trim();
        if text.is_empty() {
            return Err(FlowsError::EmptyInput("a prayer point".to_string()));
        }
        if categories.is_empty() {
            return Err(FlowsError::EmptyInput("at least one category".to_string()));
        }

        let prompt = format!(
            "Pick the category that fits this prayer point best, from: {}.\n\
             Answer with a JSON object with the fields \"category\" and \"confidence\" (0 to 1).\n\nPrayer point:\n{text}",
            categories.join(", ")
        );

        self.cache
            .execute_flow(
                SUGGEST_CATEGORY,
                move || async move {
                    let suggestion: CategorySuggestion =
                        self.generate_json(SUGGEST_CATEGORY, GenerationRequest::text(prompt)).await?;
                    Ok::<_, anyhow::Error>(constrain_category(suggestion, categories))
                },
                &json!({ "text": text, "categories": categories }),
                FlowOptions::default(),
            )
            .await
            .map_err(FlowsError::lift)
    }

    async fn generate_json<T>(&self, operation: &str, request: GenerationRequest) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        debug!(operation, media_parts = request.media.len(), "Calling generative model");
        let raw = self.model.generate(request).await?;
        Ok(parse_model_json(operation, &raw)?)
    }
}

fn constrain_category(suggestion: CategorySuggestion, categories: &[String]) -> CategorySuggestion {
    let confidence = suggestion.confidence.clamp(0.0, 1.0);

    if let Some(known) = categories
        .iter()
        .find(|c| c.eq_ignore_ascii_case(suggestion.category.trim()))
    {
        return CategorySuggestion {
            category: known.clone(),
            confidence,
        };
    }

    warn!(
        "Model suggested unknown category {:?}, using {:?}",
        suggestion.category, categories[0]
    );
    CategorySuggestion {
        category: categories[0].clone(),
        confidence: 0.0,
    }
}

fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn categories() -> Vec<String> {
        vec!["Family".to_string(), "Health".to_string(), "Work".to_string()]
    }

    #[test]
    fn test_known_category_is_normalized() {
        let suggestion = constrain_category(
            CategorySuggestion {
                category: " health ".to_string(),
                confidence: 1.4,
            },
            &categories(),
        );
        assert_eq!(suggestion.category, "Health");
        assert_eq!(suggestion.confidence, 1.0);
    }

    #[test]
    fn test_unknown_category_falls_back_to_first() {
        let suggestion = constrain_category(
            CategorySuggestion {
                category: "Travel".to_string(),
                confidence: 0.9,
            },
            &categories(),
        );
        assert_eq!(suggestion.category, "Family");
        assert_eq!(suggestion.confidence, 0.0);
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
