use std::num::NonZeroU32;

use crate::calc::{evaluate, Outcome};
use crate::hardware::Catalog;
use crate::ports::{Event, EventSink};
use crate::validate::{RawInput, RawSelection};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no GPU row at index {0}")]
    NoSuchRow(usize),
}

/// Live form state. Every edit re-runs the whole evaluation and swaps in the
/// new outcome; callers never see a half-updated result.
pub struct Session<'a> {
    catalog: &'a Catalog,
    sink: &'a dyn EventSink,
    raw: RawInput,
    outcome: Outcome,
}

impl<'a> Session<'a> {
    pub fn new(catalog: &'a Catalog, sink: &'a dyn EventSink) -> Self {
        let raw = RawInput::default();
        let outcome = evaluate(catalog, &raw);
        Session {
            catalog,
            sink,
            raw,
            outcome,
        }
    }

    pub fn raw(&self) -> &RawInput {
        &self.raw
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn selections(&self) -> &[RawSelection] {
        &self.raw.selections
    }

    pub fn set_parameters(&mut self, text: &str) -> &Outcome {
        self.raw.parameters = text.to_string();
        self.recompute()
    }

    pub fn set_quantization(&mut self, bits: u32) -> &Outcome {
        self.raw.quantization = bits;
        self.recompute()
    }

    pub fn set_context_length(&mut self, tokens: NonZeroU32) -> &Outcome {
        self.raw.context_length = tokens;
        self.recompute()
    }

    /// Append an empty row and return its index.
    pub fn add_selection(&mut self) -> usize {
        self.raw.selections.push(RawSelection::default());
        self.sink.emit(Event::new("Calculator", "Add GPU"));
        self.recompute();
        self.raw.selections.len() - 1
    }

    /// Remove a row. The last remaining row is kept; returns whether a row
    /// was removed.
    pub fn remove_selection(&mut self, index: usize) -> Result<bool, SessionError> {
        self.row(index)?;
        if self.raw.selections.len() <= 1 {
            return Ok(false);
        }
        self.raw.selections.remove(index);
        self.sink.emit(Event::new("Calculator", "Remove GPU"));
        self.recompute();
        Ok(true)
    }

    pub fn set_accelerator(&mut self, index: usize, key: Option<&str>) -> Result<&Outcome, SessionError> {
        self.row_mut(index)?.accelerator = key.map(str::to_string);
        if let Some(key) = key {
            self.sink
                .emit(Event::new("Calculator", "Select GPU").with_label(key));
        }
        Ok(self.recompute())
    }

    /// Switch a row to a custom VRAM size, or back to catalog selection
    /// with `None`.
    pub fn set_custom_vram(
        &mut self,
        index: usize,
        vram_gb: Option<&str>,
    ) -> Result<&Outcome, SessionError> {
        self.row_mut(index)?.custom_vram_gb = vram_gb.map(str::to_string);
        Ok(self.recompute())
    }

    pub fn set_count(&mut self, index: usize, count: &str) -> Result<&Outcome, SessionError> {
        self.row_mut(index)?.count = count.to_string();
        Ok(self.recompute())
    }

    fn row(&self, index: usize) -> Result<&RawSelection, SessionError> {
        self.raw
            .selections
            .get(index)
            .ok_or(SessionError::NoSuchRow(index))
    }

    fn row_mut(&mut self, index: usize) -> Result<&mut RawSelection, SessionError> {
        self.raw
            .selections
            .get_mut(index)
            .ok_or(SessionError::NoSuchRow(index))
    }

    fn recompute(&mut self) -> &Outcome {
        self.outcome = evaluate(self.catalog, &self.raw);
        if let Some(result) = &self.outcome.result {
            self.sink.emit(
                Event::new("Calculator", "Calculate").with_label(result.config_summary.clone()),
            );
        }
        &self.outcome
    }
}
