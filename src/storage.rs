/// Worksheet directory management.
pub mod worksheet;
pub use worksheet::{config_path, Worksheet, WorksheetError};

mod record;

/// Record file-name parsing.
pub mod path_parser;
pub use path_parser::ParseError;
