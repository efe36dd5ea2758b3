//! Notification model and the dispatcher shared by every entry point

mod dispatcher;
mod message;
mod types;

pub use dispatcher::{
    DispatcherStats, DispatcherStatsSnapshot, NotificationDispatcher, QueueOutcome,
    MAX_HISTORY_LIMIT,
};
pub use message::{
    AndroidConfig, AndroidNotification, AndroidNotificationPriority, AndroidPriority, ApnsConfig,
    ApnsPayload, Aps, MessageError, MessageNotification, MessageOptions, MulticastMessage,
    TokenMessage,
};
pub use types::{
    collect_tokens, BatchResponse, CallableResponse, NotificationData, NotificationHistoryRecord,
    QueuedNotification, SendToAllRequest, SendToUsersRequest, StoredHistoryRecord,
    UserTokenRecord,
};
