//! Custom Resource Definitions for the console operator
//!
//! This module contains the CRD the operator owns: the `Console` desired state.

mod console;
mod types;

pub use console::{Console, ConsoleSpec, ConsoleStatus};
pub use types::{Condition, ConditionStatus, CustomizationSpec};
