//! Core abstractions shared by the engine and the drivers.
//!
//! - [`value`]: column values, raw source values and large-binary handles
//! - [`row`]: the source-row seam and the transformed target row
//! - [`traits`]: [`SourceReader`] / [`TargetWriter`] driver traits
//! - [`identifier`]: name normalisation, validation and quoting

pub mod identifier;
pub mod row;
pub mod traits;
pub mod value;

pub use row::{SourceRow, TargetRow};
pub use traits::{SourceReader, TargetWriter};
pub use value::{LargeBinary, RawValue, SqlValue};
