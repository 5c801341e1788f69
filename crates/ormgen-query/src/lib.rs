//! Row mapping and statement generation for ormgen.
//!
//! `ormgen-query` is the **runtime half** of generated entity modules:
//!
//! - `EntityMapper` projects rows onto entities and entities onto column
//!   assignments, applying converters both ways.
//! - `EagerLoader` compiles include paths into a joined SELECT plus a
//!   `FetchPlan`, and `group_rows` coalesces the duplicated rows back into
//!   nested entities in one pass.
//! - `InsertBuilder` / `UpdateBuilder` render dialect-specific statements and
//!   execute them through the `Connection` trait from `ormgen-core`.

pub mod builder;
pub mod eager;
pub mod group;
pub mod mapping;

pub use builder::{InsertBuilder, Predicate, UpdateBuilder};
pub use eager::{EagerLoader, EagerQuery, FetchNode, FetchPlan};
pub use group::{Entities, group_rows};
pub use mapping::EntityMapper;
