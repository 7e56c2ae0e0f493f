//! Regions of interest and the overlap test used to classify detections.
//!
//! - `BoundingBox`: axis-aligned box in image pixels (origin top-left, y grows down).
//! - `Region`: a named, validated box with its outline colour.
//! - `RegionRegistry`: the fixed, ordered set of regions. Order is priority:
//!   classification picks the first overlapping region, and dominance ties
//!   resolve to the earlier region.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::{validate_region_name, ELSEWHERE};

/// Axis-aligned rectangle in image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoundingBox {
    /// Build a box, rejecting inverted or non-finite coordinates.
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Result<Self> {
        let bbox = Self {
            xmin,
            ymin,
            xmax,
            ymax,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn validate(&self) -> Result<()> {
        if ![self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(anyhow!("box coordinates must be finite"));
        }
        if self.xmin > self.xmax {
            return Err(anyhow!(
                "xmin {} is greater than xmax {}",
                self.xmin,
                self.xmax
            ));
        }
        if self.ymin > self.ymax {
            return Err(anyhow!(
                "ymin {} is greater than ymax {}",
                self.ymin,
                self.ymax
            ));
        }
        Ok(())
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    /// Inclusive overlap test; see [`overlaps`].
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        overlaps(self, other)
    }
}

/// Returns true when the two boxes share at least one point.
///
/// Boxes that merely touch along an edge or corner count as overlapping:
/// region boxes are hand-calibrated approximations of furniture, so the
/// boundary itself belongs to the region.
pub fn overlaps(detection: &BoundingBox, region: &BoundingBox) -> bool {
    !(detection.xmax < region.xmin
        || detection.xmin > region.xmax
        || detection.ymax < region.ymin
        || detection.ymin > region.ymax)
}

/// A named region of interest. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    name: String,
    bbox: BoundingBox,
    outline: [u8; 3],
}

impl Region {
    pub fn new(name: &str, bbox: BoundingBox, outline: [u8; 3]) -> Result<Self> {
        validate_region_name(name)?;
        bbox.validate()
            .map_err(|e| anyhow!("invalid region config: region '{}': {}", name, e))?;
        Ok(Self {
            name: name.to_lowercase(),
            bbox,
            outline,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// RGB outline colour used when the region is drawn.
    pub fn outline(&self) -> [u8; 3] {
        self.outline
    }
}

/// Fixed, ordered collection of regions.
#[derive(Clone, Debug, Default)]
pub struct RegionRegistry {
    regions: Vec<Region>,
}

impl RegionRegistry {
    /// Build the registry. Names must be unique; order is preserved.
    pub fn new(regions: Vec<Region>) -> Result<Self> {
        for (i, region) in regions.iter().enumerate() {
            if regions[..i].iter().any(|r| r.name == region.name) {
                return Err(anyhow!(
                    "invalid region config: duplicate region name '{}'",
                    region.name
                ));
            }
        }
        Ok(Self { regions })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> + '_ {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Position of a bucket in priority order. `elsewhere` ranks after every region.
    pub(crate) fn rank(&self, bucket: &str) -> usize {
        self.regions
            .iter()
            .position(|r| r.name == bucket)
            .unwrap_or(self.regions.len())
    }

    /// Name of the first region overlapping `bbox`, or `elsewhere`.
    pub fn classify(&self, bbox: &BoundingBox) -> &str {
        self.regions
            .iter()
            .find(|r| overlaps(bbox, &r.bbox))
            .map(|r| r.name.as_str())
            .unwrap_or(ELSEWHERE)
    }
}
