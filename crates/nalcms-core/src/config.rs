//! Run configuration: processing mode, urban options, cell extent, taxonomy.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::taxonomy::ClassTaxonomy;
use crate::urban::UrbanThresholds;

/// Which output fields a run populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// LANDUSEF, LU_INDEX and FRC_URB2D for every class.
    #[default]
    All,
    /// FRC_URB2D, urban LU_INDEX overrides, and the urban LANDUSEF plane.
    Urban,
}

impl FromStr for ProcessingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "urban" => Ok(Self::Urban),
            _ => Err(Error::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Urban => f.write_str("urban"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    pub mode: ProcessingMode,
    /// Split urban-dominant cells into low / high / commercial categories.
    pub urban_multi: bool,
    pub thresholds: UrbanThresholds,
    /// Target cells spanned by one sampling footprint.
    pub extent: usize,
    pub taxonomy: ClassTaxonomy,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::All,
            urban_multi: false,
            thresholds: UrbanThresholds::default(),
            extent: 1,
            taxonomy: ClassTaxonomy::nalcms_modis(),
        }
    }
}

impl ResampleConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks that do not depend on the target dataset.
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if self.extent == 0 {
            return Err(Error::invalid("extent", 0, "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_known_selectors() {
        assert_eq!("all".parse::<ProcessingMode>().unwrap(), ProcessingMode::All);
        assert_eq!("Urban".parse::<ProcessingMode>().unwrap(), ProcessingMode::Urban);
        assert!(matches!("everything".parse::<ProcessingMode>(), Err(Error::UnknownMode(_))));
    }

    #[test]
    fn mode_display_roundtrips() {
        for m in [ProcessingMode::All, ProcessingMode::Urban] {
            assert_eq!(m.to_string().parse::<ProcessingMode>().unwrap(), m);
        }
    }

    #[test]
    fn json_overrides_only_given_keys() {
        let cfg: ResampleConfig =
            serde_json::from_str(r#"{"mode": "urban", "urban_multi": true, "thresholds": {"low": 0.5}}"#).unwrap();
        assert_eq!(cfg.mode, ProcessingMode::Urban);
        assert!(cfg.urban_multi);
        assert_eq!(cfg.thresholds.low, 0.5);
        assert_eq!(cfg.thresholds.commercial, 0.95);
        assert_eq!(cfg.extent, 1);
        assert_eq!(cfg.taxonomy, ClassTaxonomy::default());
    }

    #[test]
    fn unknown_mode_in_json_is_rejected() {
        assert!(serde_json::from_str::<ResampleConfig>(r#"{"mode": "forest"}"#).is_err());
    }

    #[test]
    fn validate_catches_zero_extent() {
        let cfg = ResampleConfig { extent: 0, ..ResampleConfig::default() };
        assert!(cfg.validate().is_err());
    }
}
