//! RPN evaluation: the value-stack machine that consumes the shunting-yard
//! output, plus the operator semantics and the builtin function registry it
//! dispatches to.

pub mod executor;
pub mod functions;
pub mod operators;

pub use executor::{execute, FunctionHandler, ParameterHandler};
pub use functions::{call_builtin, FunctionOutcome};
