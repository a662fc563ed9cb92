// Module layout for the nginx access-log shipper.

// Building blocks
pub mod conf;
pub mod error;
pub mod metrics;
pub mod parser;
pub mod sink;
pub mod source;

// Core
pub mod pipeline;

// Process lifecycle
pub mod runtime;

pub use error::{ShipperError, ShipperResult};
