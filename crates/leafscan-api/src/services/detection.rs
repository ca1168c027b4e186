//! Disease detection.
//!
//! The detector is a pluggable capability so a real inference backend can be
//! swapped in without touching the metering logic. The current implementation
//! is a stand-in that picks from a fixed condition table.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use leafscan_models::DetectionResult;

/// Classifies a plant image.
#[async_trait]
pub trait DiseaseDetector: Send + Sync {
    async fn classify(&self, image: &[u8]) -> DetectionResult;
}

/// Fixed condition table for the mock detector.
const CONDITIONS: &[(&str, f64, &[&str])] = &[
    (
        "Healthy",
        0.97,
        &["No action needed. Keep up regular watering and light."],
    ),
    (
        "Early Blight",
        0.91,
        &[
            "Remove and destroy affected leaves",
            "Apply a copper-based fungicide",
            "Water at the base to keep foliage dry",
        ],
    ),
    (
        "Late Blight",
        0.88,
        &[
            "Remove infected plants immediately",
            "Avoid overhead watering",
            "Apply fungicide to nearby healthy plants",
        ],
    ),
    (
        "Powdery Mildew",
        0.93,
        &[
            "Improve air circulation around the plant",
            "Spray with a potassium bicarbonate solution",
            "Prune crowded growth",
        ],
    ),
    (
        "Leaf Rust",
        0.86,
        &[
            "Remove affected leaves",
            "Avoid wetting foliage when watering",
            "Apply sulfur dust early in the season",
        ],
    ),
    (
        "Bacterial Spot",
        0.84,
        &[
            "Prune infected tissue with sterilized shears",
            "Apply a copper spray",
            "Rotate crops next season",
        ],
    ),
];

/// Mock detector: random pick from the fixed table after a simulated
/// inference delay.
pub struct MockDetector {
    delay: Duration,
}

impl MockDetector {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(1200),
        }
    }

    /// Detector with a custom delay. Tests use zero.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MockDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiseaseDetector for MockDetector {
    async fn classify(&self, image: &[u8]) -> DetectionResult {
        tokio::time::sleep(self.delay).await;

        // Cheap pseudo-random pick, seeded by time and payload length
        let seed = Utc::now().timestamp_subsec_nanos() as usize + image.len();
        let (name, confidence, remedies) = CONDITIONS[seed % CONDITIONS.len()];

        DetectionResult {
            disease_name: name.to_string(),
            confidence,
            remedies: remedies.iter().map(|r| r.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_classify_returns_entry_from_table() {
        let detector = MockDetector::with_delay(Duration::ZERO);
        let result = detector.classify(b"fake image bytes").await;

        assert!(CONDITIONS.iter().any(|(name, _, _)| *name == result.disease_name));
        assert!(result.confidence > 0.0 && result.confidence <= 1.0);
        assert!(!result.remedies.is_empty());
    }
}
