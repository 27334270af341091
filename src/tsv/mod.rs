//! Tab separated dump parsing: a lazy row reader and the header mapping applied
//! to every data row.

pub mod header;
pub mod reader;

pub use header::{Header, NamedRecord};
pub use reader::{ReaderOptions, Row, TabularReader};
