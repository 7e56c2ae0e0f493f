use serde::{Deserialize, Serialize};

use crate::region::BoundingBox;

/// Detection record exactly as the external model hands it over.
///
/// Every field is optional so that a record with missing columns can be
/// deserialized and rejected individually instead of failing the whole batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(default, alias = "label")]
    pub name: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub xmin: Option<f32>,
    #[serde(default)]
    pub ymin: Option<f32>,
    #[serde(default)]
    pub xmax: Option<f32>,
    #[serde(default)]
    pub ymax: Option<f32>,
    /// Numeric class id, when the model reports one.
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
}

impl RawDetection {
    pub fn new(label: &str, confidence: f32, bbox: (f32, f32, f32, f32)) -> Self {
        Self {
            name: Some(label.to_string()),
            confidence: Some(confidence),
            xmin: Some(bbox.0),
            ymin: Some(bbox.1),
            xmax: Some(bbox.2),
            ymax: Some(bbox.3),
            class_id: None,
        }
    }
}

/// Validated detection. Lives for a single pipeline call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "name")]
    pub label: String,
    pub confidence: f32,
    #[serde(flatten)]
    pub bbox: BoundingBox,
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
}

/// Why a raw record was dropped at the pipeline boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum RejectReason {
    MissingField(&'static str),
    ConfidenceOutOfRange(f32),
    InvalidBox(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::MissingField(field) => write!(f, "missing field '{}'", field),
            RejectReason::ConfidenceOutOfRange(c) => {
                write!(f, "confidence {} outside [0, 1]", c)
            }
            RejectReason::InvalidBox(msg) => write!(f, "invalid bounding box: {}", msg),
        }
    }
}

impl std::error::Error for RejectReason {}

impl TryFrom<RawDetection> for Detection {
    type Error = RejectReason;

    fn try_from(raw: RawDetection) -> Result<Self, Self::Error> {
        let label = raw.name.ok_or(RejectReason::MissingField("name"))?;
        let confidence = raw
            .confidence
            .ok_or(RejectReason::MissingField("confidence"))?;
        let xmin = raw.xmin.ok_or(RejectReason::MissingField("xmin"))?;
        let ymin = raw.ymin.ok_or(RejectReason::MissingField("ymin"))?;
        let xmax = raw.xmax.ok_or(RejectReason::MissingField("xmax"))?;
        let ymax = raw.ymax.ok_or(RejectReason::MissingField("ymax"))?;

        // NaN fails the range check too.
        if !(0.0..=1.0).contains(&confidence) {
            return Err(RejectReason::ConfidenceOutOfRange(confidence));
        }
        let bbox = BoundingBox::new(xmin, ymin, xmax, ymax)
            .map_err(|e| RejectReason::InvalidBox(e.to_string()))?;

        Ok(Detection {
            label,
            confidence,
            bbox,
            class_id: raw.class_id,
        })
    }
}
