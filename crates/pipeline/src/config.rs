use crate::PipelineError;
use serde::{Deserialize, Serialize};

/// Default application name stamped into every output record
pub const DEFAULT_APP_NAME: &str = "video-faces";

/// Per-run settings for [`crate::FacePipeline`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Squared-L2 distance at or above which a face is reported as unknown
    pub threshold: f32,
    /// Seconds of footage between sampled frames
    pub sampling_interval_secs: u64,
    /// Stop after this many seconds of footage (0 = whole video)
    pub max_duration_secs: u64,
    /// Maximum faces kept per sampled frame
    pub face_limit: usize,
    /// Seek here before reading the first frame (best-effort)
    pub start_offset_secs: f64,
    /// Report progress at INFO instead of DEBUG
    pub verbose: bool,
    /// Pixels subtracted from x1/y1 and added to x2/y2 of every output box;
    /// only growing is allowed
    pub box_adjustment: i32,
    pub app_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: 1.54,
            sampling_interval_secs: 1,
            max_duration_secs: 0,
            face_limit: 10,
            start_offset_secs: 0.0,
            verbose: false,
            box_adjustment: 1,
            app_name: DEFAULT_APP_NAME.to_string(),
        }
    }
}

impl PipelineConfig {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for values the sampling loop cannot use.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.sampling_interval_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "sampling_interval_secs must be at least 1".into(),
            ));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        if !self.start_offset_secs.is_finite() || self.start_offset_secs < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "start_offset_secs must be non-negative, got {}",
                self.start_offset_secs
            )));
        }
        if self.box_adjustment < 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "box_adjustment must be non-negative, got {}",
                self.box_adjustment
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.threshold, 1.54);
        assert_eq!(config.sampling_interval_secs, 1);
        assert_eq!(config.max_duration_secs, 0);
        assert_eq!(config.box_adjustment, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = PipelineConfig {
            sampling_interval_secs: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_negative_offset_rejected() {
        let config = PipelineConfig {
            start_offset_secs: -1.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_box_adjustment_rejected() {
        let config = PipelineConfig {
            box_adjustment: -3,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));

        let unchanged = PipelineConfig {
            box_adjustment: 0,
            ..PipelineConfig::default()
        };
        assert!(unchanged.validate().is_ok());
    }
}
