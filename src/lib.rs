//! # qmap: Query Against One Shape, Execute Against Another
//!
//! qmap lets callers build lazy queries over a *destination* type (a DTO, a view
//! model) while the data lives behind a provider that only understands the
//! *source* type. A type-mapping configuration describes how the two
//! correspond; qmap rewrites each query into source terms, runs it on the source
//! provider, and shapes the result back.
//!
//! ## Quick Example
//!
//! ```rust
//! use qmap::prelude::*;
//! use std::sync::Arc;
//!
//! let config = Arc::new(
//!     MapperConfig::new()
//!         .entity("Employee", [("Id", Type::int()), ("FullName", Type::string()), ("Age", Type::int())])
//!         .entity("EmployeeDto", [("Id", Type::int()), ("Name", Type::string()), ("Age", Type::int())])
//!         .map(TypeMap::new("Employee", "EmployeeDto").map_member("Name", MemberSource::member("FullName"))),
//! );
//! let data = InMemoryProvider::new().collection(
//!     "Employee",
//!     vec![Value::record("Employee", [("Id", Value::Int(1)), ("FullName", "Ann".into()), ("Age", Value::Int(30))])],
//! );
//! let source = Queryable::root(Type::entity("Employee"), Arc::new(data));
//! let provider = MappingProvider::builder(config, source, Type::entity("EmployeeDto")).build_shared();
//!
//! let dto = Type::entity("EmployeeDto");
//! let adults = provider
//!     .query()
//!     .then(|q| q.filter(Lambda::with("d", dto.clone(), |d| d.member("Age", Type::int()).gt(Expr::constant(18)))));
//! let rows = adults.to_list().unwrap();
//! assert_eq!(rows[0].field("Name"), Some(&Value::from("Ann")));
//! ```
//!
//! ## Pipeline
//!
//! | Stage        | Module                       | Does                                   |
//! |--------------|------------------------------|----------------------------------------|
//! | Translate    | [`translate`]                | hooks, member rewrite, captures, nulls |
//! | Reducers     | [`reducer`]                  | find and neutralize `Count`, `First`.. |
//! | Project      | [`projection`]               | compose `Select` steps                 |
//! | Materialize  | [`materialize`]              | lazy projection, passthrough, reducer  |
//! | Facade       | [`provider`]                 | failure boundary and inspector hooks   |

pub mod ast;
pub mod config;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod materialize;
pub mod operators;
pub mod projection;
pub mod provider;
pub mod reducer;
pub mod translate;
pub mod visit;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::config::{MapperConfig, MemberPath, MemberSource, TypeMap};
    pub use crate::engine::{Execution, InMemoryProvider, QueryProvider, Queryable};
    pub use crate::error::*;
    pub use crate::mapper::{ConfigMapper, ObjectMapper};
    pub use crate::operators::SeqOp;
    pub use crate::projection::{ConfigProjectionBuilder, ProjectionBuilder, ProjectionDescriptor};
    pub use crate::provider::{Inspector, MappingProvider};
    pub use crate::translate::Parameters;
    pub use crate::visit::ExprTransform;
}
