//! Generic generation parameters.
//!
//! Callers submit an opaque key/value map; each provider adapter maps it
//! into its native request shape. The map is never mutated after submission
//! so a fallback attempt can re-map the original values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque generation parameters keyed by well-known field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationInput(Map<String, Value>);

impl GenerationInput {
    /// Create an empty input
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw access to the underlying map
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Look up an arbitrary field
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a field, replacing any existing value
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// The text prompt
    #[must_use]
    pub fn prompt(&self) -> Option<&str> {
        self.str_field("prompt")
    }

    /// The negative prompt, if any
    #[must_use]
    pub fn negative_prompt(&self) -> Option<&str> {
        self.str_field("negative_prompt")
    }

    /// Output width in pixels
    #[must_use]
    pub fn width(&self) -> Option<u32> {
        self.u32_field("width")
    }

    /// Output height in pixels
    #[must_use]
    pub fn height(&self) -> Option<u32> {
        self.u32_field("height")
    }

    /// Number of outputs requested (defaults to 1)
    #[must_use]
    pub fn num_outputs(&self) -> u32 {
        self.u32_field("num_outputs").unwrap_or(1)
    }

    /// Sampler seed
    #[must_use]
    pub fn seed(&self) -> Option<i64> {
        self.0.get("seed").and_then(Value::as_i64)
    }

    /// Source image for image-to-image / image-to-video jobs
    #[must_use]
    pub fn image_url(&self) -> Option<&str> {
        self.str_field("image_url")
    }

    /// Requested clip length in seconds, for video models
    #[must_use]
    pub fn duration_secs(&self) -> Option<u32> {
        self.u32_field("duration_secs")
    }

    /// Per-segment prompts for long-form chained outputs
    #[must_use]
    pub fn segment_prompts(&self) -> Option<Vec<&str>> {
        let values = self.0.get("segment_prompts")?.as_array()?;
        let prompts: Vec<&str> = values.iter().filter_map(Value::as_str).collect();
        if prompts.is_empty() {
            None
        } else {
            Some(prompts)
        }
    }

    /// Which segment of a chained job this is (defaults to 0)
    #[must_use]
    pub fn segment_index(&self) -> u32 {
        self.u32_field("segment_index").unwrap_or(0)
    }

    /// Keyframe carried over from the previous segment
    #[must_use]
    pub fn keyframe_url(&self) -> Option<&str> {
        self.str_field("keyframe_url")
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn u32_field(&self, key: &str) -> Option<u32> {
        self.0.get(key).and_then(Value::as_u64).map(|v| v as u32)
    }
}

impl From<Map<String, Value>> for GenerationInput {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(value: Value) -> GenerationInput {
        serde_json::from_value(value).expect("valid input map")
    }

    #[test]
    fn test_typed_accessors() {
        let input = input(json!({
            "prompt": "a lighthouse at dusk",
            "negative_prompt": "blurry",
            "width": 1024,
            "height": 768,
            "num_outputs": 2,
            "seed": 42,
        }));

        assert_eq!(input.prompt(), Some("a lighthouse at dusk"));
        assert_eq!(input.negative_prompt(), Some("blurry"));
        assert_eq!(input.width(), Some(1024));
        assert_eq!(input.height(), Some(768));
        assert_eq!(input.num_outputs(), 2);
        assert_eq!(input.seed(), Some(42));
        assert_eq!(input.image_url(), None);
    }

    #[test]
    fn test_defaults() {
        let input = input(json!({ "prompt": "x" }));
        assert_eq!(input.num_outputs(), 1);
        assert_eq!(input.segment_index(), 0);
        assert!(input.segment_prompts().is_none());
    }

    #[test]
    fn test_segment_fields() {
        let input = input(json!({
            "segment_prompts": ["wide shot", "close up"],
            "segment_index": 1,
            "keyframe_url": "https://cdn.example.com/frame.png",
        }));

        assert_eq!(
            input.segment_prompts(),
            Some(vec!["wide shot", "close up"])
        );
        assert_eq!(input.segment_index(), 1);
        assert_eq!(
            input.keyframe_url(),
            Some("https://cdn.example.com/frame.png")
        );
    }

    #[test]
    fn test_wrong_types_are_none() {
        let input = input(json!({ "width": "1024", "seed": "abc" }));
        assert_eq!(input.width(), None);
        assert_eq!(input.seed(), None);
    }

    #[test]
    fn test_serde_transparent() {
        let input = input(json!({ "prompt": "x", "width": 512 }));
        let round = serde_json::to_value(&input).expect("serialize");
        assert_eq!(round, json!({ "prompt": "x", "width": 512 }));
    }
}
