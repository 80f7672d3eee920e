pub mod events;
pub mod identity;
pub mod message;
pub mod notification;
pub mod timestamp;

pub use events::{
    ConnectionAck, Heartbeat, MessageFrame, NotificationFrame, PushEvent, StreamSuperseded,
};
pub use identity::{Identity, PublicProfile, UpsertProfileRequest, call_room_id};
pub use message::{
    CallAction, CallMode, CallSignal, HistoryQuery, Message, MessageBody, MessageKind,
    NewMessage, RecentMessagesResponse, SeenResponse, SendMessageRequest,
};
pub use notification::{InteractionKind, InteractionRequest, NewNotification, Notification};
pub use timestamp::Timestamp;
