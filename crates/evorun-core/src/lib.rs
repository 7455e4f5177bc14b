#![deny(missing_docs)]
#![doc = "Core value, attribute and randomness types for the evorun engine."]

pub mod attributes;
pub mod errors;
pub mod rng;
pub mod value;

pub use attributes::{Attributes, SetOfAttributes};
pub use errors::{ErrorInfo, EvoError};
pub use rng::Prg;
pub use value::{Value, ValueKind, Values};

/// Maximum number of simulated steps an experiment may be configured with.
pub const MAX_STEPS: u64 = 100_000_000;

/// Maximum number of trials an experiment may be repeated for.
pub const MAX_TRIALS: u16 = 1000;
