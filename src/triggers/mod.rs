//! Dispatcher entry points: the queue trigger and the direct-call handlers

mod http;
mod redis;

pub use http::{
    notification_history, send_notification_to_all, send_notification_to_users, HistoryQuery,
};
pub use self::redis::{parse_record_id, QueueCreatedMessage, QueueTriggerSubscriber, DEFAULT_QUEUE_CHANNEL};
