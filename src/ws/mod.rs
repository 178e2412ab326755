pub mod subscriptions;

pub use subscriptions::{subscription_router, SubscriptionFilter};
