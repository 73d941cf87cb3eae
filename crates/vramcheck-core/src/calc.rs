use serde::Serialize;

use crate::error::Result;
use crate::estimate::{
    estimate_memory, estimate_power, estimate_throughput, keyed, MemoryEstimate, PowerEstimate,
};
use crate::hardware::Catalog;
use crate::validate::{validate, CalculationInput, Field, RawInput, ValidationErrors};
use crate::warnings::{warnings, Warning};

/// Margins under this many GB are flagged as borderline.
const BORDERLINE_MARGIN_GB: f64 = 2.0;

/// Overall answer shown above the figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Compatible,
    Borderline,
    Insufficient,
}

impl Verdict {
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Compatible => "Compatible Configuration",
            Verdict::Borderline => "Borderline Configuration",
            Verdict::Insufficient => "Insufficient VRAM",
        }
    }

    /// Suggestions listed under an insufficient verdict.
    pub fn remedies(self) -> &'static [&'static str] {
        match self {
            Verdict::Insufficient => &[
                "Using more GPUs",
                "Using lower precision quantization (e.g., 8-bit)",
                "Reducing context length",
                "Using a GPU with more VRAM",
            ],
            _ => &[],
        }
    }
}

/// Everything derived from one validated input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationResult {
    pub memory: MemoryEstimate,
    /// `None` when no row is a catalog card (custom VRAM only).
    pub tokens_per_second: Option<u32>,
    pub power: PowerEstimate,
    /// Effective (penalized) VRAM covers the requirement.
    pub is_compatible: bool,
    pub is_borderline: bool,
    pub verdict: Verdict,
    /// e.g. "2x RTX 4090 (48GB total)".
    pub config_summary: String,
}

/// Run every estimate for a validated input.
pub fn compute(catalog: &Catalog, input: &CalculationInput) -> Result<CalculationResult> {
    let memory = estimate_memory(
        catalog,
        input.params_b,
        input.quant,
        input.context_len,
        &input.selections,
    )?;
    let tokens_per_second = if keyed(&input.selections).next().is_some() {
        Some(estimate_throughput(
            catalog,
            input.params_b,
            &input.selections,
            input.quant,
        )?)
    } else {
        None
    };
    let power = estimate_power(catalog, &input.selections, input.params_b, input.quant)?;

    let is_compatible = memory.effective_available_gb >= memory.total_required_gb;
    let is_borderline = memory.margin_gb > 0.0 && memory.margin_gb < BORDERLINE_MARGIN_GB;
    let verdict = if is_compatible && !is_borderline {
        Verdict::Compatible
    } else if is_borderline {
        Verdict::Borderline
    } else {
        Verdict::Insufficient
    };

    let mut parts = Vec::new();
    for sel in &input.selections {
        let count = sel.count;
        if let Some(gb) = sel.custom_vram_gb {
            parts.push(format!("{count}x Custom GPU ({}GB total)", gb * count as f64));
        } else if let Some(key) = sel.key() {
            let gpu = catalog.lookup(key)?;
            parts.push(format!(
                "{count}x {} ({}GB total)",
                gpu.name,
                gpu.vram_gb * count as f64
            ));
        }
    }

    Ok(CalculationResult {
        memory,
        tokens_per_second,
        power,
        is_compatible,
        is_borderline,
        verdict,
        config_summary: parts.join(" + "),
    })
}

/// What the presentation layer renders after each change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Outcome {
    pub result: Option<CalculationResult>,
    pub errors: ValidationErrors,
    pub warnings: Vec<Warning>,
}

impl Outcome {
    /// Nothing entered yet: no result and nothing to complain about.
    pub fn is_quiescent(&self) -> bool {
        self.result.is_none() && self.errors.is_empty()
    }
}

/// Validate, estimate and collect warnings for one form state.
///
/// Never panics on bad input; failures inside the estimates are logged and
/// reported under the `calculation` field.
pub fn evaluate(catalog: &Catalog, raw: &RawInput) -> Outcome {
    let input = match validate(raw) {
        Ok(Some(input)) => input,
        Ok(None) => return Outcome::default(),
        Err(errors) => {
            tracing::debug!(?errors, "input rejected");
            return Outcome {
                errors,
                ..Outcome::default()
            };
        }
    };

    match compute(catalog, &input) {
        Ok(result) => {
            let warnings = warnings(catalog, &input, &result);
            tracing::debug!(
                params_b = input.params_b,
                bits = input.quant.bits(),
                context = input.context_len,
                verdict = ?result.verdict,
                warnings = warnings.len(),
                "evaluated"
            );
            Outcome {
                result: Some(result),
                errors: ValidationErrors::new(),
                warnings,
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "calculation failed");
            Outcome {
                errors: ValidationErrors::single(Field::Calculation),
                ..Outcome::default()
            }
        }
    }
}
