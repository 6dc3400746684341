//! OSI-Pi (PI Web API) sources
//!
//! Two ways of reading a PI server:
//!
//! - `PiPointsSource` - points matching a name filter; a point map assigns
//!   each point to a device attribute
//! - `PiElementsSource` - child elements of an Asset Framework element, one
//!   device per child, one column per attribute
//!
//! Both use Basic auth, resume from a timestamp cursor and fall back to a
//! lookback window (`-30d`) on the first cycle.

mod client;
mod elements;
mod points;
mod types;

pub use client::PiClient;
pub use elements::PiElementsSource;
pub use points::PiPointsSource;
pub use types::{
    ElementInfo, PiAttribute, PiConnection, PiElementsConfig, PiPointsConfig, PointInfo,
    DEFAULT_LOOKBACK, TIMESTAMP_FIELD, VALUE_FIELD,
};
