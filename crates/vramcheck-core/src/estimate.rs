use serde::{Deserialize, Serialize};

use crate::error::{CalcError, Result};
use crate::hardware::Catalog;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Share of the weight size reserved for framework buffers and activations.
const GPU_OVERHEAD: f64 = 0.1;

/// Applied to pooled VRAM when the model is split across devices.
const MULTI_GPU_EFFICIENCY: f64 = 0.9;

/// Fraction of theoretical peak reachable during decode.
const ACHIEVABLE_PEAK: f64 = 0.05;

/// Each extra unit in a selection adds this share of a single unit's rate.
const EXTRA_UNIT_SCALING: f64 = 0.9;

/// Throughput ceiling; the linear formula ignores memory and host bottlenecks.
pub const MAX_TOKENS_PER_SECOND: u32 = 200;

/// Extra board power per additional unit in a selection, as a share of one unit.
const MULTI_GPU_POWER_OVERHEAD: f64 = 0.1;

/// Host power added for every unit beyond the first in a selection.
const EXTRA_UNIT_SYSTEM_W: f64 = 25.0;

/// Fixed disk allowance on top of the weight files.
const STORAGE_BASE_GB: f64 = 10.0;

/// Numeric precision for weights and KV cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quant {
    Q4,
    Q8,
    FP16,
    FP32,
}

impl Quant {
    pub const ALL: [Quant; 4] = [Quant::FP32, Quant::FP16, Quant::Q8, Quant::Q4];

    pub fn from_bits(bits: u32) -> Option<Quant> {
        match bits {
            4 => Some(Quant::Q4),
            8 => Some(Quant::Q8),
            16 => Some(Quant::FP16),
            32 => Some(Quant::FP32),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Quant::Q4 => 4,
            Quant::Q8 => 8,
            Quant::FP16 => 16,
            Quant::FP32 => 32,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Quant::Q4 => "4-bit (INT4)",
            Quant::Q8 => "8-bit (INT8)",
            Quant::FP16 => "16-bit (FP16)",
            Quant::FP32 => "32-bit (FP32)",
        }
    }

    /// System RAM needed per GB of VRAM footprint.
    pub fn host_ram_multiplier(self) -> f64 {
        match self {
            Quant::FP32 => 2.0,
            Quant::FP16 => 1.5,
            Quant::Q8 => 1.2,
            Quant::Q4 => 1.1,
        }
    }

    /// Decode speed relative to FP16.
    pub fn throughput_multiplier(self) -> f64 {
        match self {
            Quant::FP32 => 0.5,
            Quant::FP16 => 1.0,
            Quant::Q8 => 1.8,
            Quant::Q4 => 2.2,
        }
    }

    /// Average share of TDP drawn while serving.
    pub fn power_utilization(self) -> f64 {
        match self {
            Quant::FP32 => 0.85,
            Quant::FP16 => 0.75,
            Quant::Q8 => 0.65,
            Quant::Q4 => 0.60,
        }
    }

    pub fn is_low_precision(self) -> bool {
        matches!(self, Quant::Q4 | Quant::Q8)
    }
}

/// One row of the GPU list: a catalog key or a custom per-unit VRAM size,
/// and a unit count. Rows with neither are placeholders and take no part in
/// any estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorSelection {
    pub accelerator: Option<String>,
    pub count: u32,
    /// VRAM per unit for a card not in the catalog. Takes precedence over
    /// `accelerator`; such rows count toward memory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_vram_gb: Option<f64>,
}

impl AcceleratorSelection {
    pub fn new() -> Self {
        AcceleratorSelection {
            accelerator: None,
            count: 1,
            custom_vram_gb: None,
        }
    }

    pub fn of(key: &str, count: u32) -> Self {
        AcceleratorSelection {
            accelerator: Some(key.to_string()),
            count,
            custom_vram_gb: None,
        }
    }

    pub fn custom(vram_gb: f64, count: u32) -> Self {
        AcceleratorSelection {
            accelerator: None,
            count,
            custom_vram_gb: Some(vram_gb),
        }
    }

    /// Catalog key, if this row names a catalog entry.
    pub fn key(&self) -> Option<&str> {
        if self.custom_vram_gb.is_some() {
            return None;
        }
        self.accelerator.as_deref().filter(|k| !k.is_empty())
    }

    /// VRAM of one unit, or `None` for a placeholder row.
    fn unit_vram_gb(&self, catalog: &Catalog) -> Result<Option<f64>> {
        if let Some(gb) = self.custom_vram_gb {
            return Ok(Some(gb));
        }
        match self.key() {
            Some(key) => Ok(Some(catalog.lookup(key)?.vram_gb)),
            None => Ok(None),
        }
    }
}

impl Default for AcceleratorSelection {
    fn default() -> Self {
        Self::new()
    }
}

/// Catalog-backed selections, in list order.
pub(crate) fn keyed(selections: &[AcceleratorSelection]) -> impl Iterator<Item = (&str, u32)> {
    selections.iter().filter_map(|s| s.key().map(|k| (k, s.count)))
}

/// Memory side of an estimate. All sizes in GB (GiB).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryEstimate {
    pub base_model_gb: f64,
    pub kv_cache_gb: f64,
    pub gpu_overhead_gb: f64,
    pub total_required_gb: f64,
    pub host_ram_gb: f64,
    pub total_available_gb: f64,
    pub efficiency_factor: f64,
    pub effective_available_gb: f64,
    /// Against the un-penalized pool; negative means the model does not fit.
    pub margin_gb: f64,
    pub min_host_ram_gb: u32,
    pub storage_gb: f64,
    pub recommended_cores: u32,
    pub host_ram_met: bool,
}

/// Recommended minimum system RAM for a model size.
pub fn host_ram_tier_gb(params_b: f64) -> u32 {
    if params_b <= 3.0 {
        8
    } else if params_b <= 7.0 {
        16
    } else if params_b <= 13.0 {
        32
    } else {
        64
    }
}

/// Estimate VRAM, system RAM and disk for a model on a set of selections.
pub fn estimate_memory(
    catalog: &Catalog,
    params_b: f64,
    quant: Quant,
    context_len: u32,
    selections: &[AcceleratorSelection],
) -> Result<MemoryEstimate> {
    let bits = quant.bits() as f64;
    let base_model_gb = params_b * bits * 1e9 / (8.0 * GIB);

    // Hidden width from the usual params ~ 6 * d^2 relation.
    let hidden = (params_b * 1e9 / 6.0).sqrt();
    let kv_cache_gb = (2.0 * hidden * context_len as f64 * 2.0 * bits / 8.0) / GIB;

    let gpu_overhead_gb = base_model_gb * GPU_OVERHEAD;
    let total_required_gb = base_model_gb + kv_cache_gb + gpu_overhead_gb;
    let host_ram_gb = total_required_gb * quant.host_ram_multiplier();

    let mut total_available_gb = 0.0;
    let mut first_gb = None;
    for sel in selections {
        let Some(unit_gb) = sel.unit_vram_gb(catalog)? else {
            continue;
        };
        let gb = unit_gb * sel.count as f64;
        first_gb.get_or_insert(gb);
        total_available_gb += gb;
    }

    // Penalty triggers on the first row only: a later, larger row still counts
    // as a split even when the first row alone would not.
    let efficiency_factor = match first_gb {
        Some(first) if total_available_gb > first => MULTI_GPU_EFFICIENCY,
        _ => 1.0,
    };
    let effective_available_gb = total_available_gb * efficiency_factor;
    let margin_gb = total_available_gb - total_required_gb;

    let min_host_ram_gb = host_ram_tier_gb(params_b);
    let recommended_cores = if params_b > 13.0 { 8 } else { 4 };

    let est = MemoryEstimate {
        base_model_gb,
        kv_cache_gb,
        gpu_overhead_gb,
        total_required_gb,
        host_ram_gb,
        total_available_gb,
        efficiency_factor,
        effective_available_gb,
        margin_gb,
        min_host_ram_gb,
        storage_gb: STORAGE_BASE_GB + base_model_gb,
        recommended_cores,
        host_ram_met: host_ram_gb >= min_host_ram_gb as f64,
    };
    finite("base model size", est.base_model_gb)?;
    finite("KV cache size", est.kv_cache_gb)?;
    finite("required VRAM", est.total_required_gb)?;
    finite("system RAM", est.host_ram_gb)?;
    finite("available VRAM", est.total_available_gb)?;
    finite("VRAM margin", est.margin_gb)?;
    Ok(est)
}

/// Aggregate decode tokens/s across all selections, capped and rounded.
/// Custom-VRAM rows have no TFLOPS figure and add nothing.
pub fn estimate_throughput(
    catalog: &Catalog,
    params_b: f64,
    selections: &[AcceleratorSelection],
    quant: Quant,
) -> Result<u32> {
    let m = quant.throughput_multiplier();
    let mut total = 0.0;
    for (key, count) in keyed(selections) {
        if count == 0 {
            continue;
        }
        let gpu = catalog.lookup(key)?;
        let base_tps = gpu.tflops * 1e12 / (6.0 * params_b * 1e9) * ACHIEVABLE_PEAK;
        total += base_tps * m;
        total += base_tps * EXTRA_UNIT_SCALING * m * (count - 1) as f64;
    }
    if total.is_nan() {
        return Err(CalcError::NonFinite {
            quantity: "throughput",
        });
    }
    Ok(total.min(MAX_TOKENS_PER_SECOND as f64).round() as u32)
}

/// Power draw of one selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionPower {
    pub key: String,
    pub name: String,
    pub count: u32,
    pub per_unit_w: u32,
    pub multi_gpu_overhead_w: f64,
    pub total_w: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerEstimate {
    pub total_w: u64,
    pub selections: Vec<SelectionPower>,
    pub system_overhead_w: u64,
    pub utilization: f64,
}

/// Host power (CPU, board, drives) by model size.
pub fn base_system_power_w(params_b: f64) -> u32 {
    if params_b <= 3.0 {
        75
    } else if params_b <= 7.0 {
        100
    } else if params_b <= 13.0 {
        150
    } else {
        200
    }
}

/// Estimate wall power for serving the model. Custom-VRAM rows have no TDP
/// and are left out.
pub fn estimate_power(
    catalog: &Catalog,
    selections: &[AcceleratorSelection],
    params_b: f64,
    quant: Quant,
) -> Result<PowerEstimate> {
    let utilization = quant.power_utilization();
    let mut system_overhead_w = base_system_power_w(params_b) as f64;
    let mut gpu_w = 0.0;
    let mut breakdown = Vec::new();

    for (key, count) in keyed(selections) {
        let gpu = catalog.lookup(key)?;
        let extra = count.saturating_sub(1) as f64;
        let per_unit_w = (gpu.tdp_w as f64 * utilization).round();
        let multi_gpu_overhead_w = per_unit_w * MULTI_GPU_POWER_OVERHEAD * extra;
        let total_w = (per_unit_w * count as f64 + multi_gpu_overhead_w).round();

        system_overhead_w += EXTRA_UNIT_SYSTEM_W * extra;
        gpu_w += total_w;
        breakdown.push(SelectionPower {
            key: key.to_string(),
            name: gpu.name.clone(),
            count,
            // utilization < 1, so this never exceeds the u32 TDP
            per_unit_w: per_unit_w as u32,
            multi_gpu_overhead_w,
            total_w: whole_watts("selection power", total_w)?,
        });
    }

    Ok(PowerEstimate {
        total_w: whole_watts("total power", gpu_w + system_overhead_w)?,
        selections: breakdown,
        system_overhead_w: whole_watts("system power", system_overhead_w)?,
        utilization,
    })
}

/// Watts summed as floats, reported as whole numbers.
fn whole_watts(quantity: &'static str, w: f64) -> Result<u64> {
    finite(quantity, w)?;
    if w < 0.0 || w >= u64::MAX as f64 {
        return Err(CalcError::Overflow { quantity });
    }
    Ok(w.round() as u64)
}

fn finite(quantity: &'static str, v: f64) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(CalcError::NonFinite { quantity })
    }
}
