pub mod store;
pub mod subscription;

pub use store::{FjallQueue, QueueError, is_valid_channel_name};
pub use subscription::{Delivery, Subscription, TaskSource};
