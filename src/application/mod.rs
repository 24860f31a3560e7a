//! 应用层：面向调用方的推送编排

pub mod service;

pub use service::{
    PushApplicationService, PushReport, PushRequest, SkipReason, SkippedSubscription,
    unique_push_notification_id,
};
