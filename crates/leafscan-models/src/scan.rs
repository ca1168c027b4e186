//! Scan records and detection results.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Completion status of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "failed" => Self::Failed,
            _ => Self::Completed,
        }
    }
}

/// Output of the disease classifier for one image.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetectionResult {
    /// Detected condition name.
    pub disease_name: String,
    /// Classifier confidence in [0.0, 1.0].
    pub confidence: f64,
    /// Suggested remedies.
    pub remedies: Vec<String>,
}

/// One completed scan, append-only.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScanRecord {
    /// Unique identifier (UUID).
    pub id: String,
    pub user_id: String,
    /// Reference to the uploaded image.
    pub image_path: String,
    pub disease_name: String,
    /// Confidence in [0.0, 1.0].
    pub confidence: f64,
    pub remedies: Vec<String>,
    pub status: ScanStatus,
    pub created_at: DateTime<Utc>,
}

impl ScanRecord {
    /// Build a completed scan record from a detection result.
    pub fn completed(
        user_id: impl Into<String>,
        image_path: impl Into<String>,
        detection: DetectionResult,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            image_path: image_path.into(),
            disease_name: detection.disease_name,
            confidence: detection.confidence,
            remedies: detection.remedies,
            status: ScanStatus::Completed,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_record_carries_detection() {
        let detection = DetectionResult {
            disease_name: "Early Blight".to_string(),
            confidence: 0.93,
            remedies: vec!["Remove affected leaves".to_string()],
        };
        let record = ScanRecord::completed("u1", "scans/u1/abc.jpg", detection);
        assert_eq!(record.status, ScanStatus::Completed);
        assert_eq!(record.disease_name, "Early Blight");
        assert!(record.confidence > 0.0 && record.confidence <= 1.0);
        assert!(!record.id.is_empty());
    }
}
