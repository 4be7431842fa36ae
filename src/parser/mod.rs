pub mod filter_operator;
pub mod filter_parser;
pub mod formula;
pub mod object_class;

pub use filter_operator::Filter;
pub use object_class::ObjectClass;
