use serde::{Deserialize, Serialize};

/// The resolvable presentation keys for `(scopeId, uniqueId)` (§4.9). Color
/// is an RGB triple in `[0,255]`; scale must fall in `[0.1, 10]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
}

impl PresentationOverride {
    pub const SCALE_RANGE: std::ops::RangeInclusive<f32> = 0.1..=10.0;

    /// Merge `self` (lower precedence) with `other` (higher precedence),
    /// per key, as required by the three-layer resolution in §4.9.
    pub fn merged_under(&self, other: &PresentationOverride) -> PresentationOverride {
        PresentationOverride {
            display_name: other.display_name.clone().or_else(|| self.display_name.clone()),
            model_ref: other.model_ref.clone().or_else(|| self.model_ref.clone()),
            color: other.color.or(self.color),
            scale: other.scale.or(self.scale),
        }
    }

    pub fn is_valid_scale(scale: f32) -> bool {
        Self::SCALE_RANGE.contains(&scale)
    }
}
