use wasm_bindgen::prelude::*;

use vramcheck_core::calc;
use vramcheck_core::hardware;
use vramcheck_core::ports::{self, Event, EventSink, MemoryTheme, ThemeStore};
use vramcheck_core::validate::{RawInput, CONTEXT_PRESETS, COUNT_PRESETS};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// All GPUs in display order, as [key, spec] pairs.
#[wasm_bindgen]
pub fn list_gpus() -> JsValue {
    serde_wasm_bindgen::to_value(hardware::bundled().list_ordered()).unwrap_or(JsValue::NULL)
}

/// Find a GPU by loose input ("4090", "RTX 4090").
/// Returns [key, spec] or null.
#[wasm_bindgen]
pub fn find_gpu(input: &str) -> JsValue {
    match hardware::bundled().find(input) {
        Some(hit) => serde_wasm_bindgen::to_value(&hit).unwrap_or(JsValue::NULL),
        None => JsValue::NULL,
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate one form state. Called on every change.
///
/// `raw` is `{ parameters, quantization, context_length, selections:
/// [{ accelerator, count }] }`. Returns `{ result, errors, warnings }`, or
/// null when `raw` does not have that shape.
#[wasm_bindgen]
pub fn evaluate(raw: JsValue) -> JsValue {
    let raw: RawInput = match serde_wasm_bindgen::from_value(raw) {
        Ok(r) => r,
        Err(_) => return JsValue::NULL,
    };
    let outcome = calc::evaluate(hardware::bundled(), &raw);
    serde_wasm_bindgen::to_value(&outcome).unwrap_or(JsValue::NULL)
}

/// Initial form state: empty parameters, 16-bit, 4k context, one empty row.
#[wasm_bindgen]
pub fn default_input() -> JsValue {
    serde_wasm_bindgen::to_value(&RawInput::default()).unwrap_or(JsValue::NULL)
}

// ---------------------------------------------------------------------------
// Form options
// ---------------------------------------------------------------------------

#[wasm_bindgen]
pub fn context_presets() -> Vec<u32> {
    CONTEXT_PRESETS.to_vec()
}

#[wasm_bindgen]
pub fn count_presets() -> Vec<u32> {
    COUNT_PRESETS.to_vec()
}

/// Dark mode from the saved preference, else the system setting.
#[wasm_bindgen]
pub fn resolve_theme(stored: Option<bool>, system_dark: bool) -> bool {
    MemoryTheme {
        stored,
        system_dark,
    }
    .is_dark()
}

/// Forwards analytics events to a page callback as `{ category, action, label }`.
struct CallbackSink(Option<js_sys::Function>);

impl EventSink for CallbackSink {
    fn emit(&self, event: Event) {
        let Some(track) = &self.0 else { return };
        if let Ok(value) = serde_wasm_bindgen::to_value(&event) {
            // Analytics failures never reach the UI.
            let _ = track.call1(&JsValue::NULL, &value);
        }
    }
}

/// Flip dark mode. Returns the new preference, which the page persists;
/// `track` receives the "Toggle Dark Mode" event.
#[wasm_bindgen]
pub fn toggle_theme(
    stored: Option<bool>,
    system_dark: bool,
    track: Option<js_sys::Function>,
) -> bool {
    flip_theme(stored, system_dark, &CallbackSink(track))
}

fn flip_theme(stored: Option<bool>, system_dark: bool, sink: &dyn EventSink) -> bool {
    let mut theme = MemoryTheme {
        stored,
        system_dark,
    };
    ports::toggle_theme(&mut theme, sink)
}

/// "4096" -> "4k tokens".
#[wasm_bindgen]
pub fn fmt_context(tokens: u32) -> String {
    if tokens >= 1024 && tokens % 1024 == 0 {
        format!("{}k tokens", tokens / 1024)
    } else {
        format!("{tokens} tokens")
    }
}
