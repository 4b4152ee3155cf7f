//! Source graph side of ingestion
//!
//! - [`SourceElement`]: untyped response tree with typed accessors
//! - [`IdentityResolver`]: canonical twin ids from identity records
//! - [`SourceGraphProvider`]: the query interface the walker drives
//! - [`RecordedSource`]: in-memory provider over recorded responses

pub mod element;
pub mod identity;
pub mod provider;
pub mod recorded;

pub use element::SourceElement;
pub use identity::{IdentityRecord, IdentityResolver, TwinMapping};
pub use provider::{SourceError, SourceGraphProvider, SourceQuery, SourceResult};
pub use recorded::RecordedSource;
