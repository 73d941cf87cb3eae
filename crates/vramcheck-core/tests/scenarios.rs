use vramcheck_core::calc::evaluate;
use vramcheck_core::estimate::{estimate_memory, estimate_power, estimate_throughput};
use vramcheck_core::hardware::bundled;
use vramcheck_core::{AcceleratorSelection, Field, Quant, RawInput, RawSelection, Verdict};

fn form(parameters: &str, selections: Vec<RawSelection>) -> RawInput {
    RawInput {
        parameters: parameters.to_string(),
        selections,
        ..RawInput::default()
    }
}

#[test]
fn seven_b_fp16_on_rtx4090() {
    let outcome = evaluate(bundled(), &form("7", vec![RawSelection::of("rtx4090", 1)]));
    assert!(outcome.errors.is_empty());
    let r = outcome.result.expect("should compute");

    assert!((r.memory.base_model_gb - 13.04).abs() < 0.01);
    assert_eq!(r.memory.margin_gb, 24.0 - r.memory.total_required_gb);
    assert_eq!(r.is_compatible, r.memory.margin_gb >= 0.0);
    assert!(r.is_compatible);
    assert_eq!(r.verdict, Verdict::Compatible);
}

#[test]
fn empty_form_is_quiescent() {
    let outcome = evaluate(bundled(), &form("", Vec::new()));
    assert!(outcome.result.is_none());
    assert!(outcome.errors.is_empty());
    assert!(outcome.warnings.is_empty());
}

#[test]
fn non_numeric_parameters_rejected() {
    let outcome = evaluate(bundled(), &form("abc", vec![RawSelection::of("rtx4090", 1)]));
    assert!(outcome.result.is_none());
    assert!(outcome.errors.contains(Field::Parameters));
}

#[test]
fn mixed_rows_use_penalized_pool_but_raw_margin() {
    let outcome = evaluate(
        bundled(),
        &form(
            "7",
            vec![RawSelection::of("rtx3090", 1), RawSelection::of("rtx4090", 1)],
        ),
    );
    let r = outcome.result.expect("should compute");
    assert_eq!(r.memory.efficiency_factor, 0.9);
    assert_eq!(r.memory.total_available_gb, 48.0);
    assert!((r.memory.effective_available_gb - 43.2).abs() < 1e-9);
    assert_eq!(r.memory.margin_gb, 48.0 - r.memory.total_required_gb);
}

#[test]
fn unknown_key_bypassing_validator_is_an_error() {
    let sel = vec![AcceleratorSelection::of("not-a-gpu", 1)];
    assert!(estimate_memory(bundled(), 7.0, Quant::FP16, 4096, &sel).is_err());
    assert!(estimate_throughput(bundled(), 7.0, &sel, Quant::FP16).is_err());
    assert!(estimate_power(bundled(), &sel, 7.0, Quant::FP16).is_err());

    let outcome = evaluate(bundled(), &form("7", vec![RawSelection::of("not-a-gpu", 1)]));
    assert!(outcome.result.is_none());
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors.contains(Field::Calculation));
}

#[test]
fn host_ram_tier_boundary() {
    let sel = vec![AcceleratorSelection::of("h100", 1)];
    let at = estimate_memory(bundled(), 3.0, Quant::FP16, 4096, &sel).unwrap();
    let above = estimate_memory(bundled(), 3.0001, Quant::FP16, 4096, &sel).unwrap();
    assert_eq!(at.min_host_ram_gb, 8);
    assert_eq!(above.min_host_ram_gb, 16);
}

#[test]
fn engine_accepts_counts_outside_presets() {
    let outcome = evaluate(bundled(), &form("70", vec![RawSelection::of("a100-80gb", 6)]));
    let r = outcome.result.expect("should compute");
    assert_eq!(r.memory.total_available_gb, 480.0);
    assert_eq!(r.config_summary, "6x A100 80GB (480GB total)");
}

#[test]
fn custom_card_by_vram() {
    let outcome = evaluate(bundled(), &form("13", vec![RawSelection::custom("16", 2)]));
    assert!(outcome.errors.is_empty());
    let r = outcome.result.expect("should compute");
    assert_eq!(r.memory.total_available_gb, 32.0);
    assert_eq!(r.config_summary, "2x Custom GPU (32GB total)");
    assert_eq!(r.tokens_per_second, None);
    assert!(r.is_compatible);

    let outcome = evaluate(bundled(), &form("13", vec![RawSelection::custom("", 2)]));
    assert!(outcome.result.is_none());
    assert!(outcome.errors.contains(Field::Gpu));
}

#[test]
fn power_past_u32_watts() {
    let outcome = evaluate(
        bundled(),
        &form("7", vec![RawSelection::of("rtx4090", 12_000_000)]),
    );
    assert!(outcome.errors.is_empty());
    let r = outcome.result.expect("should compute");
    assert!(r.power.total_w > u64::from(u32::MAX));
}
