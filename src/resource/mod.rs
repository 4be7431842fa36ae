pub mod attribute_filter;
pub mod projector;

pub use attribute_filter::{AttributeFilter, AttributesToGet};
pub use projector::ObjectProjector;
