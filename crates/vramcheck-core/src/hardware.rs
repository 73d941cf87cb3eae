use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{CalcError, Result};

/// Architecture family of an accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    Pascal,
    Volta,
    Ampere,
    AdaLovelace,
    Hopper,
    AppleSilicon,
    Rdna2,
    Rdna3,
}

impl Generation {
    /// Oldest architecture the estimates still cover.
    pub const OLDEST: Generation = Generation::Pascal;

    pub fn label(self) -> &'static str {
        match self {
            Generation::Pascal => "Pascal",
            Generation::Volta => "Volta",
            Generation::Ampere => "Ampere",
            Generation::AdaLovelace => "Ada Lovelace",
            Generation::Hopper => "Hopper",
            Generation::AppleSilicon => "Apple Silicon",
            Generation::Rdna2 => "RDNA 2",
            Generation::Rdna3 => "RDNA 3",
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Accelerator specification from accelerators.toml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorSpec {
    pub name: String,
    pub vram_gb: f64,
    pub generation: Generation,
    pub tflops: f64,
    pub tdp_w: u32,
}

impl AcceleratorSpec {
    /// First word of the display name: "RTX", "A100", "Apple".
    pub fn name_prefix(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }

    fn check(&self, key: &str) -> Result<()> {
        let invalid = |reason: &str| CalcError::InvalidCatalog {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if !(self.vram_gb.is_finite() && self.vram_gb > 0.0) {
            return Err(invalid("vram_gb must be positive"));
        }
        if !(self.tflops.is_finite() && self.tflops > 0.0) {
            return Err(invalid("tflops must be positive"));
        }
        if self.tdp_w == 0 {
            return Err(invalid("tdp_w must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    accelerator: BTreeMap<String, AcceleratorSpec>,
}

/// Immutable, ordered accelerator table.
///
/// Entries are sorted by name prefix, then by memory capacity. Ties fall back
/// to the key so the order never depends on how the table was written.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<(String, AcceleratorSpec)>,
}

impl Catalog {
    /// Build a catalog, rejecting blank or duplicate keys and entries with
    /// non-positive memory, throughput or power.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, AcceleratorSpec)>,
    {
        let mut entries: Vec<(String, AcceleratorSpec)> = entries.into_iter().collect();
        if entries.is_empty() {
            return Err(CalcError::InvalidCatalog {
                key: "accelerator".into(),
                reason: "no accelerators defined".into(),
            });
        }
        {
            let mut seen = BTreeSet::new();
            for (key, spec) in &entries {
                if !seen.insert(key.as_str()) {
                    return Err(CalcError::InvalidCatalog {
                        key: key.clone(),
                        reason: "duplicate key".into(),
                    });
                }
                if key.trim().is_empty() {
                    return Err(CalcError::InvalidCatalog {
                        key: key.clone(),
                        reason: "key is empty".into(),
                    });
                }
                spec.check(key)?;
            }
        }
        entries.sort_by(|(ka, a), (kb, b)| {
            prefix_order(a.name_prefix(), b.name_prefix())
                .then(a.vram_gb.total_cmp(&b.vram_gb))
                .then_with(|| ka.cmp(kb))
        });
        Ok(Catalog { entries })
    }

    /// Look up an accelerator by its exact key.
    pub fn lookup(&self, key: &str) -> Result<&AcceleratorSpec> {
        self.get(key)
            .ok_or_else(|| CalcError::UnknownAccelerator(key.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&AcceleratorSpec> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, spec)| spec)
    }

    pub fn list_ordered(&self) -> &[(String, AcceleratorSpec)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve loose user input ("4090", "RTX 4090", "a100 80gb") to a key.
    /// Exact keys win, then normalized keys, then normalized display names,
    /// then a unique key suffix.
    pub fn find(&self, input: &str) -> Option<(&str, &AcceleratorSpec)> {
        if let Some((k, spec)) = self.entries.iter().find(|(k, _)| k == input) {
            return Some((k.as_str(), spec));
        }
        let needle = normalize(input);
        if needle.is_empty() {
            return None;
        }
        let hit = self
            .entries
            .iter()
            .find(|(k, _)| normalize(k) == needle)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(_, spec)| normalize(&spec.name) == needle)
            });
        if let Some((k, spec)) = hit {
            return Some((k.as_str(), spec));
        }
        let mut suffixed = self
            .entries
            .iter()
            .filter(|(k, _)| normalize(k).ends_with(&needle));
        match (suffixed.next(), suffixed.next()) {
            (Some((k, spec)), None) => Some((k.as_str(), spec)),
            _ => None,
        }
    }
}

/// Case-insensitive, so "Radeon" lists before "RTX"; raw bytes break ties.
fn prefix_order(a: &str, b: &str) -> Ordering {
    a.to_ascii_lowercase()
        .cmp(&b.to_ascii_lowercase())
        .then_with(|| a.cmp(b))
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Parse a catalog from a TOML string.
pub fn parse_catalog(toml_str: &str) -> Result<Catalog> {
    let file: CatalogFile = toml::from_str(toml_str)
        .map_err(|e| CalcError::Io(format!("bad accelerators.toml: {e}")))?;
    Catalog::from_entries(file.accelerator)
}

/// Load a catalog from an accelerators.toml file.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CalcError::Io(format!("{}: {e}", path.display())))?;
    parse_catalog(&content)
}

const BUNDLED_CATALOG: &str = include_str!("../../../data/accelerators.toml");

/// The catalog compiled into the binary, parsed on first use.
///
/// Panics if the bundled table is malformed; that is a build defect, not a
/// runtime condition.
pub fn bundled() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(|| match parse_catalog(BUNDLED_CATALOG) {
        Ok(catalog) => catalog,
        Err(e) => panic!("bundled accelerators.toml is invalid: {e}"),
    })
}
