//! OpenAPI 3.x and Swagger 2.0 handling

pub mod document;
pub mod operation;
pub mod resolve;
pub mod response;
pub mod security;
pub mod validate;

pub use document::{load_document, SpecVersion};
pub use operation::{list_operations, select_operation, OperationInfo};
pub use validate::{validate, ValidationIssue, ValidationReport};
