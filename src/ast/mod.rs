//! Query AST: types, runtime values and expression nodes.
//!
//! ```text
//! Root(EmployeeDto).Where(d => (d.Age > 18)).Count()
//! ──────┬────────── ─────────┬────────────── ───┬───
//!       │                    │                  └── reducer (collapses the sequence)
//!       │                    └── filter with a predicate lambda
//!       └── query root over a destination type
//! ```

pub mod builders;
pub mod expr;
pub mod types;
pub mod values;

pub use expr::*;
pub use types::*;
pub use values::*;
