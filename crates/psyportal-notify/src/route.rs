//! Notification click routing: the view a clicked notification opens.

use psyportal_core::types::{Category, LocalNotification, PushMessage};

pub const FORMS_VIEW: &str = "/formularios";
pub const CHAT_VIEW: &str = "/chat";
pub const HOME_VIEW: &str = "/";

/// Target view for a declared notification kind (`data.type`).
pub fn target_for_kind(kind: Option<&str>) -> &'static str {
    match kind.and_then(Category::from_kind) {
        Some(category) => target_for(category),
        None => HOME_VIEW,
    }
}

pub fn target_for(category: Category) -> &'static str {
    match category {
        Category::Assignment => FORMS_VIEW,
        Category::Message => CHAT_VIEW,
    }
}

pub fn target_for_push(message: &PushMessage) -> &'static str {
    target_for_kind(message.kind())
}

pub fn target_for_local(notification: &LocalNotification) -> &'static str {
    target_for(notification.category)
}
