//! Topic handling
//!
//! Topic name/filter validation, MQTT wildcard matching used by the
//! permission resolver, and the reserved-topic rewriter.

mod rewrite;
pub mod validation;

pub use rewrite::TopicRewriter;
pub use validation::{
    filter_covers, topic_matches_filter, validate_topic_filter, validate_topic_name,
};
