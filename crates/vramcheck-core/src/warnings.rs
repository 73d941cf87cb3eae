use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::calc::CalculationResult;
use crate::estimate::{keyed, Quant};
use crate::hardware::{Catalog, Generation};
use crate::validate::CalculationInput;

/// Context lengths above this get a memory/performance advisory.
pub const LONG_CONTEXT_TOKENS: u32 = 32768;

/// Models above this size (billions) should be split across devices.
const LARGE_MODEL_B: f64 = 13.0;

/// Advisory shown next to a result. Never blocks the estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    HostRam { min_gb: u32 },
    VendorSupport,
    LowPrecision { quant: Quant },
    LongContext,
    LongContextVram,
    ScalingEfficiency { groups: usize },
    LegacyGeneration { name: String },
    LargeModel,
    MixedGenerations,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::HostRam { min_gb: 8 } => {
                f.write_str("For models up to 3B parameters, at least 8GB of system RAM is recommended")
            }
            Warning::HostRam { min_gb: 16 } => {
                f.write_str("For models up to 7B parameters, at least 16GB of system RAM is recommended")
            }
            Warning::HostRam { min_gb: 32 } => {
                f.write_str("For models up to 13B parameters, at least 32GB of system RAM is recommended")
            }
            Warning::HostRam { min_gb } => write!(
                f,
                "For models larger than 13B parameters, {min_gb}GB or more of system RAM is recommended"
            ),
            Warning::VendorSupport => f.write_str(
                "AMD Radeon GPUs require ROCm; check driver and platform support for your setup",
            ),
            Warning::LowPrecision { quant } => write!(
                f,
                "{} quantization runs faster and uses less memory at some cost in accuracy",
                quant.label()
            ),
            Warning::LongContext => f.write_str(
                "Context lengths above 32k tokens significantly increase memory use and can slow generation",
            ),
            Warning::LongContextVram => f.write_str(
                "16-bit precision with a long context needs a large amount of VRAM for the KV cache",
            ),
            Warning::ScalingEfficiency { groups } => write!(
                f,
                "Scaling efficiency drops with {groups} GPU groups; expect less than linear gains"
            ),
            Warning::LegacyGeneration { name } => write!(
                f,
                "{name} is a Pascal-generation GPU with limited support for newer inference optimizations"
            ),
            Warning::LargeModel => {
                f.write_str("Models larger than 13B parameters usually need multiple GPUs")
            }
            Warning::MixedGenerations => f.write_str(
                "Mixing GPU generations can hold performance to the level of the slowest card",
            ),
        }
    }
}

impl Serialize for Warning {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Competing vendor's consumer cards are keyed `rx...` in the catalog.
fn is_radeon_consumer(key: &str) -> bool {
    key.starts_with("rx")
}

/// Advisories for a computed configuration, in display order.
pub fn warnings(
    catalog: &Catalog,
    input: &CalculationInput,
    result: &CalculationResult,
) -> Vec<Warning> {
    let mut out = vec![Warning::HostRam {
        min_gb: result.memory.min_host_ram_gb,
    }];

    let gpus: Vec<(&str, Option<Generation>, Option<&str>)> = keyed(&input.selections)
        .map(|(key, _)| {
            let spec = catalog.get(key);
            (
                key,
                spec.map(|s| s.generation),
                spec.map(|s| s.name.as_str()),
            )
        })
        .collect();

    if gpus.iter().any(|(key, _, _)| is_radeon_consumer(key)) {
        out.push(Warning::VendorSupport);
    }

    if input.quant.is_low_precision() {
        out.push(Warning::LowPrecision { quant: input.quant });
    }

    if input.context_len > LONG_CONTEXT_TOKENS {
        out.push(Warning::LongContext);
        if input.quant == Quant::FP16 {
            out.push(Warning::LongContextVram);
        }
    }

    if gpus.len() > 2 {
        out.push(Warning::ScalingEfficiency { groups: gpus.len() });
    }

    for (key, generation, name) in &gpus {
        if *generation == Some(Generation::OLDEST) {
            out.push(Warning::LegacyGeneration {
                name: name.unwrap_or(key).to_string(),
            });
        }
    }

    if input.params_b > LARGE_MODEL_B {
        out.push(Warning::LargeModel);
    }

    let generations: BTreeSet<Generation> = gpus.iter().filter_map(|(_, g, _)| *g).collect();
    if generations.len() > 1 {
        out.push(Warning::MixedGenerations);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::compute;
    use crate::estimate::AcceleratorSelection;
    use crate::hardware::bundled;

    fn run(params_b: f64, quant: Quant, context_len: u32, sel: &[(&str, u32)]) -> Vec<Warning> {
        let input = CalculationInput {
            params_b,
            quant,
            context_len,
            selections: sel
                .iter()
                .map(|(k, n)| AcceleratorSelection::of(k, *n))
                .collect(),
        };
        let result = compute(bundled(), &input).unwrap();
        warnings(bundled(), &input, &result)
    }

    #[test]
    fn plain_config_only_gets_host_ram_note() {
        let w = run(7.0, Quant::FP16, 4096, &[("rtx4090", 1)]);
        assert_eq!(w, vec![Warning::HostRam { min_gb: 16 }]);
    }

    #[test]
    fn host_ram_message_follows_tier() {
        assert_eq!(run(3.0, Quant::FP16, 4096, &[("h100", 1)])[0], Warning::HostRam { min_gb: 8 });
        assert_eq!(run(13.0, Quant::FP16, 4096, &[("h100", 1)])[0], Warning::HostRam { min_gb: 32 });
        let big = run(70.0, Quant::Q4, 4096, &[("h100", 1)]);
        assert_eq!(big[0], Warning::HostRam { min_gb: 64 });
        assert!(big[0].to_string().contains("64GB"));
    }

    #[test]
    fn radeon_gets_vendor_note_once() {
        let w = run(7.0, Quant::FP16, 4096, &[("rx7900xtx", 1), ("rx7900xt", 1)]);
        assert_eq!(w.iter().filter(|w| **w == Warning::VendorSupport).count(), 1);
        assert_eq!(w[1], Warning::VendorSupport);
    }

    #[test]
    fn low_precision_noted() {
        let w = run(7.0, Quant::Q8, 4096, &[("rtx4090", 1)]);
        assert_eq!(w[1], Warning::LowPrecision { quant: Quant::Q8 });
        assert!(!run(7.0, Quant::FP32, 4096, &[("h100", 1)])
            .iter()
            .any(|w| matches!(w, Warning::LowPrecision { .. })));
    }

    #[test]
    fn long_context_adds_vram_note_at_fp16() {
        let w = run(7.0, Quant::FP16, 65536, &[("h100", 1)]);
        assert_eq!(
            w,
            vec![
                Warning::HostRam { min_gb: 16 },
                Warning::LongContext,
                Warning::LongContextVram,
            ]
        );

        let q8 = run(7.0, Quant::Q8, 65536, &[("h100", 1)]);
        assert!(q8.contains(&Warning::LongContext));
        assert!(!q8.contains(&Warning::LongContextVram));

        // 32768 itself is not "long"
        assert!(!run(7.0, Quant::FP16, 32768, &[("h100", 1)]).contains(&Warning::LongContext));
    }

    #[test]
    fn three_groups_note_scaling() {
        let w = run(7.0, Quant::FP16, 4096, &[("rtx4090", 1), ("rtx4090", 1), ("rtx4090", 2)]);
        assert!(w.contains(&Warning::ScalingEfficiency { groups: 3 }));
        let two = run(7.0, Quant::FP16, 4096, &[("rtx4090", 4), ("rtx4090", 4)]);
        assert!(!two.iter().any(|w| matches!(w, Warning::ScalingEfficiency { .. })));
    }

    #[test]
    fn every_pascal_row_is_noted() {
        let w = run(7.0, Quant::FP16, 4096, &[("gtx1080ti", 2), ("teslap40", 1), ("gtx1080ti", 1)]);
        let legacy: Vec<String> = w
            .iter()
            .filter_map(|w| match w {
                Warning::LegacyGeneration { name } => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(legacy, ["GTX 1080 Ti", "Tesla P40", "GTX 1080 Ti"]);
        assert!(!w.contains(&Warning::MixedGenerations));
    }

    #[test]
    fn full_emission_order() {
        let w = run(
            30.0,
            Quant::FP16,
            131072,
            &[("rx7900xtx", 1), ("gtx1080ti", 1), ("rtx4090", 1)],
        );
        assert_eq!(
            w,
            vec![
                Warning::HostRam { min_gb: 64 },
                Warning::VendorSupport,
                Warning::LongContext,
                Warning::LongContextVram,
                Warning::ScalingEfficiency { groups: 3 },
                Warning::LegacyGeneration {
                    name: "GTX 1080 Ti".to_string()
                },
                Warning::LargeModel,
                Warning::MixedGenerations,
            ]
        );
    }

    #[test]
    fn serializes_as_message() {
        let json = serde_json::to_string(&Warning::LargeModel).unwrap();
        assert_eq!(json, format!("\"{}\"", Warning::LargeModel));
    }
}
