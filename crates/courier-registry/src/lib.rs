//! Courier method registry - the static operation table.
//!
//! Every operation the bridge can perform is described by a
//! [`MethodDescriptor`]: name, parameter schema, risk classification,
//! required approval, and backend binding. The set is fixed at process start;
//! there is no runtime registration. Lookups and validation are pure and safe
//! for unsynchronized concurrent reads.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod descriptor;
mod table;
mod validate;

pub use descriptor::{AuthOp, Binding, MethodDescriptor, ParamKind, ParamSpec};
pub use table::MethodRegistry;
pub use validate::validate_arguments;
