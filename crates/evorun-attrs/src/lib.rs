#![doc = "Attribute range validation and population command parsing for evorun."]

pub mod generator;
pub mod range;

pub use generator::{AttrsGenerator, GenFunction};
pub use range::{scope_from_specs, AttributeRange, AttrsScope, RangeDef};
