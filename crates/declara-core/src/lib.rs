pub mod config;
pub mod convert;
pub mod error;
pub mod layout;
pub mod reader;
pub mod schema;
pub mod task;
pub mod transform;
pub mod types;
pub mod validation;
pub mod writer;

pub use config::StoragePaths;
pub use convert::{ConversionOutcome, ConversionRequest, ConversionTaskManager};
pub use error::ConversionError;
pub use layout::FieldKey;
pub use schema::SchemaMap;
pub use task::{ConversionStatus, ConversionTask, ConversionTotals, TaskStore};
pub use types::{
    CanonicalRecord, DecimalSeparator, HeaderData, RawRecord, RowReport, RunParameters,
    TransformedRecord, ValidationOutcome,
};
