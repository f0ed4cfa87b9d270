use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::geometry::Label;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_DETECTION_INPUT: (u32, u32) = (640, 640);
const DEFAULT_REGRESSION_INPUT: (u32, u32) = (224, 224);
const DEFAULT_MAX_CANDIDATES: usize = 4;
const DEFAULT_LABELS: [&str; 2] = ["L", "R"];
const DEFAULT_INTERVAL_SECS: f64 = 0.5;
const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 30;

// ----------------------------------------------------------------------------
// PipelineConfig
// ----------------------------------------------------------------------------

/// Fixed parameters of the detection-to-measurement pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Detector input (width, height).
    pub detection_input: (u32, u32),
    /// Regressor input (width, height).
    pub regression_input: (u32, u32),
    /// Raw outputs implying more candidates than this are treated as a
    /// detector malfunction.
    pub max_candidates: usize,
    /// Label for a low / high first confidence slot.
    pub label_order: [Label; 2],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            detection_input: DEFAULT_DETECTION_INPUT,
            regression_input: DEFAULT_REGRESSION_INPUT,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            label_order: [
                Label::parse(DEFAULT_LABELS[0]),
                Label::parse(DEFAULT_LABELS[1]),
            ],
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("iou_threshold", self.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within 0..=1, got {}", name, value));
            }
        }
        for (name, (w, h)) in [
            ("detection_input", self.detection_input),
            ("regression_input", self.regression_input),
        ] {
            if w == 0 || h == 0 {
                return Err(anyhow!("{} must be non-empty, got {}x{}", name, w, h));
            }
        }
        if self.label_order[0] == self.label_order[1] {
            return Err(anyhow!(
                "label_order must name two distinct labels, got {:?}",
                self.label_order
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Application config (file + env)
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    pipeline: Option<PipelineConfigFile>,
    detector: Option<ModelConfigFile>,
    regressor: Option<ModelConfigFile>,
    sampler: Option<SamplerConfigFile>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    detection_input: Option<[u32; 2]>,
    regression_input: Option<[u32; 2]>,
    max_candidates: Option<usize>,
    labels: Option<[String; 2]>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplerConfigFile {
    interval_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    square_crop: Option<bool>,
}

/// Which implementation backs a model capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Stub,
    Tract,
}

impl BackendKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "tract" | "onnx" => Ok(Self::Tract),
            other => Err(anyhow!("unknown model backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSettings {
    pub backend: BackendKind,
    pub model_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    /// `stub://...` for a synthetic stream, otherwise an image file or a
    /// directory of images replayed in name order.
    pub url: String,
    pub target_fps: u32,
    /// Center-crop incoming frames to a square.
    pub square_crop: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub detector: ModelSettings,
    pub regressor: ModelSettings,
    pub sample_interval: Duration,
    pub source: SourceSettings,
}

impl AppConfig {
    /// Defaults, overlaid with the file named by `EXO_CONFIG`, then env.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("EXO_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let defaults = PipelineConfig::default();
        let pipeline_file = file.pipeline.unwrap_or_default();
        let label_order = match pipeline_file.labels {
            Some([low, high]) => [Label::parse(&low), Label::parse(&high)],
            None => defaults.label_order.clone(),
        };
        let pipeline = PipelineConfig {
            confidence_threshold: pipeline_file
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            iou_threshold: pipeline_file
                .iou_threshold
                .unwrap_or(defaults.iou_threshold),
            detection_input: pipeline_file
                .detection_input
                .map(|[w, h]| (w, h))
                .unwrap_or(defaults.detection_input),
            regression_input: pipeline_file
                .regression_input
                .map(|[w, h]| (w, h))
                .unwrap_or(defaults.regression_input),
            max_candidates: pipeline_file
                .max_candidates
                .unwrap_or(defaults.max_candidates),
            label_order,
        };

        let detector = model_settings(file.detector)?;
        let regressor = model_settings(file.regressor)?;

        let interval_secs = file
            .sampler
            .and_then(|sampler| sampler.interval_secs)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        let sample_interval = interval_from_secs(interval_secs)?;

        let source = SourceSettings {
            url: file
                .source
                .as_ref()
                .and_then(|source| source.url.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_SOURCE_FPS),
            square_crop: file
                .source
                .and_then(|source| source.square_crop)
                .unwrap_or(true),
        };

        Ok(Self {
            pipeline,
            detector,
            regressor,
            sample_interval,
            source,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("EXO_DETECTOR_MODEL") {
            if !path.trim().is_empty() {
                self.detector = ModelSettings {
                    backend: BackendKind::Tract,
                    model_path: Some(PathBuf::from(path)),
                };
            }
        }
        if let Ok(path) = std::env::var("EXO_REGRESSOR_MODEL") {
            if !path.trim().is_empty() {
                self.regressor = ModelSettings {
                    backend: BackendKind::Tract,
                    model_path: Some(PathBuf::from(path)),
                };
            }
        }
        if let Ok(url) = std::env::var("EXO_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(interval) = std::env::var("EXO_SAMPLE_INTERVAL_SECS") {
            let secs: f64 = interval
                .parse()
                .map_err(|_| anyhow!("EXO_SAMPLE_INTERVAL_SECS must be a number of seconds"))?;
            self.sample_interval = interval_from_secs(secs)?;
        }
        if let Ok(threshold) = std::env::var("EXO_CONFIDENCE_THRESHOLD") {
            self.pipeline.confidence_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("EXO_CONFIDENCE_THRESHOLD must be a number"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        for (name, model) in [("detector", &self.detector), ("regressor", &self.regressor)] {
            if model.backend == BackendKind::Tract && model.model_path.is_none() {
                return Err(anyhow!("{} backend 'tract' requires model_path", name));
            }
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be >= 1"));
        }
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        Ok(())
    }
}

fn model_settings(file: Option<ModelConfigFile>) -> Result<ModelSettings> {
    let file = file.unwrap_or_default();
    let backend = match file.backend.as_deref() {
        Some(raw) => BackendKind::parse(raw)?,
        None if file.model_path.is_some() => BackendKind::Tract,
        None => BackendKind::Stub,
    };
    Ok(ModelSettings {
        backend,
        model_path: file.model_path,
    })
}

fn interval_from_secs(secs: f64) -> Result<Duration> {
    if !(secs.is_finite() && secs > 0.0) {
        return Err(anyhow!("sample interval must be > 0 seconds, got {}", secs));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("sample interval of {} seconds is out of range", secs))
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: AppConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_defaults_match_models() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.confidence_threshold, 0.3);
        assert_eq!(cfg.iou_threshold, 0.45);
        assert_eq!(cfg.detection_input, (640, 640));
        assert_eq!(cfg.regression_input, (224, 224));
        assert_eq!(cfg.max_candidates, 4);
        assert_eq!(cfg.label_order, [Label::Left, Label::Right]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn pipeline_validation_rejects_bad_values() {
        let mut cfg = PipelineConfig {
            confidence_threshold: 1.5,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());

        cfg.confidence_threshold = 0.3;
        cfg.regression_input = (0, 224);
        assert!(cfg.validate().is_err());

        cfg.regression_input = (224, 224);
        cfg.label_order = [Label::Left, Label::Left];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backend_kind_parses_aliases() {
        assert_eq!(BackendKind::parse("Stub").unwrap(), BackendKind::Stub);
        assert_eq!(BackendKind::parse("onnx").unwrap(), BackendKind::Tract);
        assert!(BackendKind::parse("coreml").is_err());
    }

    #[test]
    fn model_path_implies_tract() {
        let settings = model_settings(Some(ModelConfigFile {
            backend: None,
            model_path: Some(PathBuf::from("yolo.onnx")),
        }))
        .unwrap();
        assert_eq!(settings.backend, BackendKind::Tract);
    }

    #[test]
    fn interval_must_be_positive() {
        assert!(interval_from_secs(0.0).is_err());
        assert!(interval_from_secs(f64::NAN).is_err());
        assert!(interval_from_secs(1e30).is_err());
        assert_eq!(interval_from_secs(0.5).unwrap(), Duration::from_millis(500));
    }
}
