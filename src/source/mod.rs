//! Source adapters
//!
//! One [`SourceAdapter`] implementation per external protocol. Each adapter
//! keeps its connection parameters in its own configuration struct.
//!
//! - `amqp` - event-hub compatible endpoint of an Azure IoT Hub
//! - `osipi` - PI Web API points and AF elements
//! - `http` - a JSON endpoint, one request per cycle
//! - `csv` - a local CSV file

pub mod amqp;
pub mod csv;
pub mod http;
pub mod osipi;
mod types;

pub use csv::{CsvSource, CsvSourceConfig};
pub use http::{HttpSource, HttpSourceConfig};
pub use types::{CheckResult, Fetch, RawRecord, RecordLayout, SourceAdapter};
