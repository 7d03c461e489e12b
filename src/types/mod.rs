//! Core domain types shared by the publisher and consumer sides.

pub mod ids;
pub mod subscription;

pub use ids::{EventNumber, SubscriptionId, TaskKey, TopicId};
pub use subscription::{
    EventRecord, Subscription, SubscriptionData, SubscriptionStatus, Topic, TopicDescriptor,
    TriggerOperation,
};
