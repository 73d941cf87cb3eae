pub mod calc;
pub mod error;
pub mod estimate;
pub mod hardware;
pub mod ports;
pub mod session;
pub mod validate;
pub mod warnings;

pub use calc::{evaluate, CalculationResult, Outcome, Verdict};
pub use error::CalcError;
pub use estimate::{AcceleratorSelection, Quant};
pub use hardware::{AcceleratorSpec, Catalog, Generation};
pub use session::{Session, SessionError};
pub use validate::{CalculationInput, Field, RawInput, RawSelection, ValidationErrors};
pub use warnings::Warning;
