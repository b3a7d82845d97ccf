//! NALCMS land-cover classes and their mapping onto WRF land-use categories.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of NALCMS source codes, including code 0 (no data).
pub const NUM_SOURCE_CLASSES: usize = 20;
/// Source code for "No data". Never mapped, never dominant.
pub const NO_DATA: u8 = 0;
/// Source code for "Urban and Built-up".
pub const URBAN_CODE: u8 = 17;

/// One row of the taxonomy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub code: u8,
    pub name: String,
    /// 1-based WRF land-use category; `None` only for code 0.
    pub target: Option<u8>,
}

/// Source code → (name, target category) lookup, indexed by source code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ClassEntry>", into = "Vec<ClassEntry>")]
pub struct ClassTaxonomy {
    entries: Vec<ClassEntry>,
}

// (code, name, MODIS/IGBP target)
const NALCMS_MODIS: [(u8, &str, Option<u8>); NUM_SOURCE_CLASSES] = [
    (0, "No data", None),
    (1, "Temperate or sub-polar needleleaf forest", Some(18)),
    (2, "Sub-polar taiga needleleaf forest", Some(1)),
    (3, "Tropical or sub-tropical broadleaf evergreen forest", Some(2)),
    (4, "Tropical or sub-tropical broadleaf deciduous forest", Some(4)),
    (5, "Temperate or sub-polar broadleaf deciduous forest", Some(4)),
    (6, "Mixed Forest", Some(5)),
    (7, "Tropical or sub-tropical shrubland", Some(6)),
    (8, "Temperate or sub-polar shrubland", Some(7)),
    (9, "Tropical or sub-tropical grassland", Some(10)),
    (10, "Temperate or sub-polar grassland", Some(10)),
    (11, "Sub-polar or polar shrubland-lichen-moss", Some(19)),
    (12, "Sub-polar or polar grassland-lichen-moss", Some(19)),
    (13, "Sub-polar or polar barren-lichen-moss", Some(20)),
    (14, "Wetland", Some(11)),
    (15, "Cropland", Some(12)),
    (16, "Barren Lands", Some(16)),
    (17, "Urban and Built-up", Some(13)),
    (18, "Water", Some(17)),
    (19, "Snow and Ice", Some(15)),
];

impl ClassTaxonomy {
    /// The default NALCMS → MODIS mapping.
    pub fn nalcms_modis() -> Self {
        let entries = NALCMS_MODIS
            .iter()
            .map(|&(code, name, target)| ClassEntry { code, name: name.to_string(), target })
            .collect();
        Self { entries }
    }

    /// Build a taxonomy from an arbitrary table.
    ///
    /// Entries may come in any order but must cover codes 0..=19 exactly once;
    /// code 0 must be unmapped and every other code mapped to a category ≥ 1.
    pub fn from_entries(mut entries: Vec<ClassEntry>) -> Result<Self> {
        if entries.len() != NUM_SOURCE_CLASSES {
            return Err(Error::invalid(
                "taxonomy",
                entries.len(),
                format!("expected {NUM_SOURCE_CLASSES} entries"),
            ));
        }
        entries.sort_by_key(|e| e.code);
        for (expected, entry) in entries.iter().enumerate() {
            if usize::from(entry.code) != expected {
                return Err(Error::invalid(
                    "taxonomy.code",
                    entry.code,
                    format!("codes must be unique and cover 0..={}", NUM_SOURCE_CLASSES - 1),
                ));
            }
            match (entry.code, entry.target) {
                (NO_DATA, None) => {}
                (NO_DATA, Some(t)) => {
                    return Err(Error::invalid("taxonomy.target", t, "code 0 (no data) cannot be mapped"));
                }
                (code, None) => {
                    return Err(Error::invalid("taxonomy.target", code, "missing target category"));
                }
                (_, Some(0)) => {
                    return Err(Error::invalid("taxonomy.target", 0, "target categories are 1-based"));
                }
                _ => {}
            }
        }
        Ok(Self { entries })
    }

    pub fn name(&self, code: u8) -> Option<&str> {
        self.entries.get(usize::from(code)).map(|e| e.name.as_str())
    }

    /// Target category for a source code; `None` for no-data or unknown codes.
    #[inline]
    pub fn target(&self, code: u8) -> Option<u8> {
        self.entries.get(usize::from(code)).and_then(|e| e.target)
    }

    /// Target category of "Urban and Built-up".
    pub fn urban_target(&self) -> u8 {
        // from_entries guarantees every non-zero code is mapped
        self.target(URBAN_CODE).unwrap_or(0)
    }

    /// Largest target category referenced by the table.
    pub fn max_target(&self) -> u8 {
        self.entries.iter().filter_map(|e| e.target).max().unwrap_or(0)
    }

    pub fn entries(&self) -> &[ClassEntry] {
        &self.entries
    }
}

impl Default for ClassTaxonomy {
    fn default() -> Self {
        Self::nalcms_modis()
    }
}

impl TryFrom<Vec<ClassEntry>> for ClassTaxonomy {
    type Error = Error;

    fn try_from(entries: Vec<ClassEntry>) -> Result<Self> {
        Self::from_entries(entries)
    }
}

impl From<ClassTaxonomy> for Vec<ClassEntry> {
    fn from(t: ClassTaxonomy) -> Self {
        t.entries
    }
}
