//! Streaming CDXJ filters: blocklist, excessive-URL cardinality
//! capping, and addfield annotation.

pub mod addfield;
pub mod blocklist;
pub mod excessive;
