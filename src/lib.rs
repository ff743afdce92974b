//! Medication signature engine.
//!
//! Turns a medication profile plus dosing inputs into patient-facing
//! instructions with structured dose, timing and route data. Requests go
//! through [`strategies::Dispatcher`], which picks the most specific base
//! strategy and folds modifiers over its output; builders can also be
//! driven directly through [`engine::Engine`].

pub mod audit;
pub mod builders;
pub mod config;
pub mod dosing;
pub mod engine;
pub mod error;
pub mod instruction;
pub mod medication;
pub mod output;
pub mod strategies;
pub mod template;
pub mod units;
pub mod validation;

pub use engine::Engine;
pub use error::{SigError, SigResult};
