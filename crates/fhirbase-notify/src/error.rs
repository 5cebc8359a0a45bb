use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid SubscriptionTopic: {0}")]
    InvalidTopic(String),

    #[error("invalid Subscription: {0}")]
    InvalidSubscription(String),

    #[error("subscription references unknown topic: {0}")]
    UnknownTopic(String),

    #[error("unsupported channel type: {0}")]
    UnsupportedChannel(String),

    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}
