use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::annotate::{
    AnnotationStyle, DEFAULT_DETECTION_OUTLINE, DEFAULT_FONT_SIZE, DEFAULT_LINE_WIDTH,
};
use crate::occupancy::AccrualPolicy;
use crate::pipeline::{PipelineSettings, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_SUBJECT_CLASS};
use crate::region::{BoundingBox, Region, RegionRegistry};

/// Outline colours handed out to regions that do not name one, by position.
const REGION_PALETTE: [[u8; 3]; 6] = [
    [0, 0, 255],
    [0, 255, 0],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 128, 0],
];

#[derive(Debug, Deserialize, Default)]
struct CatstayConfigFile {
    subject_class: Option<String>,
    confidence_threshold: Option<f32>,
    accrual_policy: Option<AccrualPolicy>,
    regions: Option<Vec<RegionConfigFile>>,
    annotation: Option<AnnotationConfigFile>,
}

#[derive(Debug, Deserialize, Clone)]
struct RegionConfigFile {
    name: String,
    xmin: f32,
    ymin: f32,
    xmax: f32,
    ymax: f32,
    outline: Option<[u8; 3]>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotationConfigFile {
    font_size: Option<f32>,
    font_path: Option<PathBuf>,
    line_width: Option<u32>,
    detection_outline: Option<[u8; 3]>,
}

/// One configured region before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSpec {
    pub name: String,
    pub bbox: BoundingBox,
    pub outline: [u8; 3],
}

#[derive(Debug, Clone)]
pub struct CatstayConfig {
    pub subject_class: String,
    pub confidence_threshold: f32,
    pub accrual_policy: AccrualPolicy,
    pub regions: Vec<RegionSpec>,
    pub font_size: f32,
    pub font_path: Option<PathBuf>,
    pub line_width: u32,
    pub detection_outline: [u8; 3],
}

impl CatstayConfig {
    /// Load from the file named by `CATSTAY_CONFIG` (if set), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CATSTAY_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Same as [`CatstayConfig::load`] with an explicit file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CatstayConfigFile) -> Self {
        let subject_class = file
            .subject_class
            .unwrap_or_else(|| DEFAULT_SUBJECT_CLASS.to_string());
        let confidence_threshold = file
            .confidence_threshold
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
        let accrual_policy = file.accrual_policy.unwrap_or_default();
        let regions = file
            .regions
            .unwrap_or_else(default_regions)
            .into_iter()
            .enumerate()
            .map(|(i, region)| RegionSpec {
                name: region.name,
                bbox: BoundingBox {
                    xmin: region.xmin,
                    ymin: region.ymin,
                    xmax: region.xmax,
                    ymax: region.ymax,
                },
                outline: region
                    .outline
                    .unwrap_or(REGION_PALETTE[i % REGION_PALETTE.len()]),
            })
            .collect();
        let annotation = file.annotation.unwrap_or_default();
        Self {
            subject_class,
            confidence_threshold,
            accrual_policy,
            regions,
            font_size: annotation.font_size.unwrap_or(DEFAULT_FONT_SIZE),
            font_path: annotation.font_path,
            line_width: annotation.line_width.unwrap_or(DEFAULT_LINE_WIDTH),
            detection_outline: annotation
                .detection_outline
                .unwrap_or(DEFAULT_DETECTION_OUTLINE),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(class) = std::env::var("CATSTAY_SUBJECT_CLASS") {
            if !class.trim().is_empty() {
                self.subject_class = class.trim().to_string();
            }
        }
        if let Ok(threshold) = std::env::var("CATSTAY_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = threshold.trim().parse().map_err(|_| {
                anyhow!("CATSTAY_CONFIDENCE_THRESHOLD must be a number between 0 and 1")
            })?;
        }
        if let Ok(policy) = std::env::var("CATSTAY_ACCRUAL_POLICY") {
            if !policy.trim().is_empty() {
                self.accrual_policy = policy.parse()?;
            }
        }
        if let Ok(size) = std::env::var("CATSTAY_FONT_SIZE") {
            self.font_size = size
                .trim()
                .parse()
                .map_err(|_| anyhow!("CATSTAY_FONT_SIZE must be a number of pixels"))?;
        }
        if let Ok(path) = std::env::var("CATSTAY_FONT_PATH") {
            if !path.trim().is_empty() {
                self.font_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.subject_class.trim().is_empty() {
            return Err(anyhow!("subject_class must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if !(self.font_size.is_finite() && self.font_size > 0.0) {
            return Err(anyhow!("font_size must be greater than zero"));
        }
        if self.line_width == 0 {
            return Err(anyhow!("line_width must be greater than zero"));
        }
        // Fail on bad boxes or names now rather than at first use.
        self.region_registry()?;
        Ok(())
    }

    pub fn region_registry(&self) -> Result<RegionRegistry> {
        let regions = self
            .regions
            .iter()
            .map(|spec| Region::new(&spec.name, spec.bbox, spec.outline))
            .collect::<Result<Vec<_>>>()?;
        RegionRegistry::new(regions)
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        Ok(PipelineSettings {
            subject_class: self.subject_class.clone(),
            confidence_threshold: self.confidence_threshold,
            accrual_policy: self.accrual_policy,
            regions: self.region_registry()?,
            style: AnnotationStyle {
                font_size: self.font_size,
                line_width: self.line_width,
                detection_outline: self.detection_outline,
                ..AnnotationStyle::default()
            },
            font_path: self.font_path.clone(),
        })
    }
}

fn default_regions() -> Vec<RegionConfigFile> {
    vec![
        RegionConfigFile {
            name: "sofa".to_string(),
            xmin: 0.0,
            ymin: 0.0,
            xmax: 900.0,
            ymax: 900.0,
            outline: Some([0, 0, 255]),
        },
        RegionConfigFile {
            name: "table".to_string(),
            xmin: 400.0,
            ymin: 150.0,
            xmax: 600.0,
            ymax: 300.0,
            outline: Some([0, 255, 0]),
        },
    ]
}

fn read_config_file(path: &Path) -> Result<CatstayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
