// Form widgets: field primitives and document upload handling.

pub mod fields;
pub mod upload;
