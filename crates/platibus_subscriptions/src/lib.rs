//! platibus_subscriptions
//!
//! Durable registry of which subscriber endpoints want publications on which
//! topics. Rows are `(topic, subscriber URI, expiry)`; re-adding a pair
//! refreshes its expiry, and expired rows are filtered out on read rather
//! than eagerly deleted. Every publish consults this registry for its
//! fan-out set.

pub mod registry;

pub use registry::{Subscription, SubscriptionError, SubscriptionTrackingService};

#[cfg(test)]
mod tests;
