pub mod backend;
pub mod config;
pub mod connector;
pub mod error;
pub mod logging;
pub mod membership;
pub mod models;
pub mod naming;
pub mod parser;
pub mod query;
pub mod resource;
pub mod schema;
pub mod secret;
pub mod utils;

// Re-export commonly used types for easier access
pub use config::ConnectorConfig;
pub use connector::DominoConnector;
pub use error::{ConnectorError, ConnectorResult};
pub use models::{AttributeSet, AttributeValue, ConnectorObject, UpdateKind};
pub use parser::{Filter, ObjectClass};
pub use resource::attribute_filter::{AttributeFilter, AttributesToGet};
