//! Bundled formatters

pub mod json;
pub mod logfmt;
pub mod template;

pub use json::JsonFormatter;
pub use logfmt::LogfmtFormatter;
pub use template::{TemplateFormatter, DEFAULT_TEMPLATE};
