//! Twin and relationship construction
//!
//! Both builders write into a [`RunOutput`], the graph and issue log owned
//! by one sync run.

pub mod bacnet;
pub mod relationship;
pub mod twin;

use crate::error::ErrorLog;
use crate::graph::TwinGraph;

pub use bacnet::{BacnetAddress, BacnetDecodeError};
pub use relationship::{RelationshipBuilder, RelationshipRequest};
pub use twin::{TwinBuilder, TwinRequest};

/// Graph and issues accumulated by one sync run
#[derive(Debug, Default)]
pub struct RunOutput {
    pub graph: TwinGraph,
    pub errors: ErrorLog,
}
