use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::estimate::{AcceleratorSelection, Quant};

/// Context length the form starts with.
pub const DEFAULT_CONTEXT_LENGTH: u32 = 4096;

/// Context lengths offered by the form. Any positive value is accepted.
pub const CONTEXT_PRESETS: &[u32] = &[4096, 8192, 16384, 32768, 65536, 131072];

/// GPU counts offered by the form. Any positive value is accepted.
pub const COUNT_PRESETS: &[u32] = &[1, 2, 3, 4, 8];

/// One GPU row as typed into the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSelection {
    pub accelerator: Option<String>,
    pub count: String,
    /// Per-unit VRAM in GB for a card not in the catalog. When present the
    /// row is a custom row and `accelerator` is ignored.
    #[serde(default)]
    pub custom_vram_gb: Option<String>,
}

impl RawSelection {
    pub fn of(key: &str, count: u32) -> Self {
        RawSelection {
            accelerator: Some(key.to_string()),
            count: count.to_string(),
            custom_vram_gb: None,
        }
    }

    pub fn custom(vram_gb: &str, count: u32) -> Self {
        RawSelection {
            accelerator: None,
            count: count.to_string(),
            custom_vram_gb: Some(vram_gb.to_string()),
        }
    }

    fn key(&self) -> Option<&str> {
        self.accelerator
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    fn custom_text(&self) -> Option<&str> {
        self.custom_vram_gb.as_deref().map(str::trim)
    }

    fn is_filled(&self) -> bool {
        self.custom_text().is_some_and(|t| !t.is_empty()) || self.key().is_some()
    }
}

impl Default for RawSelection {
    fn default() -> Self {
        RawSelection {
            accelerator: None,
            count: "1".to_string(),
            custom_vram_gb: None,
        }
    }
}

/// Form state before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInput {
    /// Parameter count in billions, as typed.
    pub parameters: String,
    /// Precision in bits.
    pub quantization: u32,
    pub context_length: NonZeroU32,
    pub selections: Vec<RawSelection>,
}

impl Default for RawInput {
    fn default() -> Self {
        RawInput {
            parameters: String::new(),
            quantization: 16,
            context_length: NonZeroU32::new(DEFAULT_CONTEXT_LENGTH).unwrap_or(NonZeroU32::MIN),
            selections: vec![RawSelection::default()],
        }
    }
}

/// Validated input for the estimation functions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationInput {
    pub params_b: f64,
    pub quant: Quant,
    pub context_len: u32,
    pub selections: Vec<AcceleratorSelection>,
}

/// Form field an error is reported against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "parameters")]
    Parameters,
    #[serde(rename = "gpu")]
    Gpu,
    #[serde(rename = "gpuCount")]
    GpuCount,
    #[serde(rename = "calculation")]
    Calculation,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Parameters => "parameters",
            Field::Gpu => "gpu",
            Field::GpuCount => "gpuCount",
            Field::Calculation => "calculation",
        }
    }

    /// Message shown next to the field.
    pub fn reason(self) -> &'static str {
        match self {
            Field::Parameters => "Please enter a valid number of parameters",
            Field::Gpu => "Please select at least one GPU",
            Field::GpuCount => "Please select a valid number of GPUs",
            Field::Calculation => "Error calculating requirements. Please check your inputs.",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-level errors, at most one per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<Field, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors holding a single field with its standard reason.
    pub fn single(field: Field) -> Self {
        let mut errors = Self::new();
        errors.insert(field, field.reason());
        errors
    }

    /// Record a reason; an existing reason for the field is kept.
    pub fn insert(&mut self, field: Field, reason: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| reason.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(f, r)| (*f, r.as_str()))
    }
}

/// Check the form.
///
/// `Ok(None)` means nothing has been entered yet: no result and no error.
/// The first failing rule wins, in order: parameters, gpu, gpuCount. A custom
/// row whose VRAM is blank or not a positive number fails the gpu rule.
pub fn validate(raw: &RawInput) -> Result<Option<CalculationInput>, ValidationErrors> {
    let text = raw.parameters.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let params_b = match text.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v,
        _ => return Err(ValidationErrors::single(Field::Parameters)),
    };

    if !raw.selections.iter().any(RawSelection::is_filled) {
        return Err(ValidationErrors::single(Field::Gpu));
    }

    let mut custom = Vec::with_capacity(raw.selections.len());
    for sel in &raw.selections {
        custom.push(match sel.custom_text() {
            None => None,
            Some(text) => match text.parse::<f64>() {
                Ok(gb) if gb.is_finite() && gb > 0.0 => Some(gb),
                _ => return Err(ValidationErrors::single(Field::Gpu)),
            },
        });
    }

    let mut selections = Vec::with_capacity(raw.selections.len());
    for (sel, custom_gb) in raw.selections.iter().zip(custom) {
        if !sel.is_filled() {
            selections.push(AcceleratorSelection::new());
            continue;
        }
        let count = match sel.count.trim().parse::<u32>() {
            Ok(count) if count >= 1 => count,
            _ => return Err(ValidationErrors::single(Field::GpuCount)),
        };
        selections.push(match (custom_gb, sel.key()) {
            (Some(gb), _) => AcceleratorSelection::custom(gb, count),
            (None, Some(key)) => AcceleratorSelection::of(key, count),
            (None, None) => AcceleratorSelection::new(),
        });
    }

    let quant = Quant::from_bits(raw.quantization).unwrap_or_else(|| {
        tracing::warn!(bits = raw.quantization, "unrecognized precision, using 16-bit");
        Quant::FP16
    });

    Ok(Some(CalculationInput {
        params_b,
        quant,
        context_len: raw.context_length.get(),
        selections,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(parameters: &str, selections: Vec<RawSelection>) -> RawInput {
        RawInput {
            parameters: parameters.to_string(),
            selections,
            ..RawInput::default()
        }
    }

    #[test]
    fn empty_parameters_is_quiescent() {
        assert_eq!(validate(&raw("", Vec::new())), Ok(None));
        assert_eq!(validate(&raw("   ", vec![RawSelection::of("rtx4090", 1)])), Ok(None));
    }

    #[test]
    fn bad_parameters_rejected() {
        for bad in ["abc", "0", "-7", "inf", "NaN", "7b"] {
            let errors = validate(&raw(bad, vec![RawSelection::of("rtx4090", 1)])).unwrap_err();
            assert_eq!(errors.len(), 1, "{bad}");
            assert_eq!(errors.get(Field::Parameters), Some(Field::Parameters.reason()), "{bad}");
        }
    }

    #[test]
    fn parameters_checked_before_gpu() {
        let errors = validate(&raw("abc", Vec::new())).unwrap_err();
        assert!(errors.contains(Field::Parameters));
        assert!(!errors.contains(Field::Gpu));
    }

    #[test]
    fn missing_gpu_rejected() {
        let errors = validate(&raw("7", vec![RawSelection::default()])).unwrap_err();
        assert!(errors.contains(Field::Gpu));

        let blank = RawSelection {
            accelerator: Some("  ".to_string()),
            ..RawSelection::default()
        };
        assert!(validate(&raw("7", vec![blank])).unwrap_err().contains(Field::Gpu));
    }

    #[test]
    fn bad_count_rejected() {
        for bad in ["0", "", "two", "-1", "1.5"] {
            let sel = RawSelection {
                count: bad.to_string(),
                ..RawSelection::of("rtx4090", 1)
            };
            let errors = validate(&raw("7", vec![sel])).unwrap_err();
            assert!(errors.contains(Field::GpuCount), "{bad:?}");
        }
    }

    // An empty row's count is never looked at.
    #[test]
    fn empty_row_count_ignored() {
        let rows = vec![
            RawSelection::of("rtx4090", 2),
            RawSelection {
                count: "junk".to_string(),
                ..RawSelection::default()
            },
        ];
        let input = validate(&raw("7", rows)).unwrap().unwrap();
        assert_eq!(input.selections.len(), 2);
        assert_eq!(input.selections[0], AcceleratorSelection::of("rtx4090", 2));
        assert_eq!(input.selections[1].key(), None);
    }

    #[test]
    fn valid_input_accepted() {
        let mut r = raw(" 6.7 ", vec![RawSelection::of("rtx3090", 8)]);
        r.quantization = 4;
        r.context_length = NonZeroU32::new(131072).unwrap();
        let input = validate(&r).unwrap().unwrap();
        assert_eq!(input.params_b, 6.7);
        assert_eq!(input.quant, Quant::Q4);
        assert_eq!(input.context_len, 131072);
        assert_eq!(input.selections[0].count, 8);
    }

    #[test]
    fn custom_vram_row_accepted() {
        let rows = vec![RawSelection::custom(" 20 ", 2), RawSelection::of("rtx4090", 1)];
        let input = validate(&raw("7", rows)).unwrap().unwrap();
        assert_eq!(input.selections[0], AcceleratorSelection::custom(20.0, 2));
        assert_eq!(input.selections[1], AcceleratorSelection::of("rtx4090", 1));

        let only = validate(&raw("7", vec![RawSelection::custom("11.5", 1)])).unwrap().unwrap();
        assert_eq!(only.selections[0].custom_vram_gb, Some(11.5));
        assert_eq!(only.selections[0].key(), None);
    }

    #[test]
    fn bad_custom_vram_is_a_gpu_error() {
        for bad in ["", "  ", "0", "-8", "lots", "inf"] {
            let rows = vec![RawSelection::of("rtx4090", 1), RawSelection::custom(bad, 1)];
            let errors = validate(&raw("7", rows)).unwrap_err();
            assert_eq!(errors.get(Field::Gpu), Some(Field::Gpu.reason()), "{bad:?}");
        }
    }

    // gpu outranks gpuCount even when the bad count sits on an earlier row.
    #[test]
    fn custom_vram_checked_before_counts() {
        let rows = vec![
            RawSelection {
                count: "0".to_string(),
                ..RawSelection::of("rtx4090", 1)
            },
            RawSelection::custom("abc", 1),
        ];
        let errors = validate(&raw("7", rows)).unwrap_err();
        assert!(errors.contains(Field::Gpu));
        assert!(!errors.contains(Field::GpuCount));

        let errors = validate(&raw("7", vec![RawSelection::custom("24", 0)])).unwrap_err();
        assert!(errors.contains(Field::GpuCount));
    }

    #[test]
    fn custom_field_is_optional_in_json() {
        let row: RawSelection =
            serde_json::from_str(r#"{"accelerator":"h100","count":"1"}"#).unwrap();
        assert_eq!(row, RawSelection::of("h100", 1));
    }

    #[test]
    fn unknown_precision_falls_back_to_fp16() {
        let mut r = raw("7", vec![RawSelection::of("rtx4090", 1)]);
        r.quantization = 6;
        assert_eq!(validate(&r).unwrap().unwrap().quant, Quant::FP16);
    }

    #[test]
    fn errors_keep_first_reason() {
        let mut errors = ValidationErrors::new();
        errors.insert(Field::Gpu, "first");
        errors.insert(Field::Gpu, "second");
        assert_eq!(errors.get(Field::Gpu), Some("first"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn errors_serialize_with_field_tags() {
        let json = serde_json::to_string(&ValidationErrors::single(Field::GpuCount)).unwrap();
        assert_eq!(json, r#"{"gpuCount":"Please select a valid number of GPUs"}"#);
    }
}
