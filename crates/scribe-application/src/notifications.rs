//! In-app notification center.

use std::sync::Mutex;

use scribe_core::monitor::ScanResult;
use scribe_core::notification::{AppNotification, NotificationAction, NotificationKind};
use scribe_core::{EventBus, Subscription};

/// Oldest notifications are dropped beyond this many.
pub const MAX_NOTIFICATIONS: usize = 100;

/// Keeps recent notifications newest first and pushes new ones to subscribers.
pub struct NotificationCenter {
    items: Mutex<Vec<AppNotification>>,
    events: EventBus<AppNotification>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            events: EventBus::new(),
        }
    }

    pub fn send(&self, notification: AppNotification) -> AppNotification {
        if let Ok(mut items) = self.items.lock() {
            items.insert(0, notification.clone());
            items.truncate(MAX_NOTIFICATIONS);
        }
        tracing::debug!(id = %notification.id, kind = ?notification.kind, "[Notifications] sent");
        self.events.emit(&notification);
        notification
    }

    pub fn all(&self) -> Vec<AppNotification> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    pub fn unread_count(&self) -> usize {
        self.items
            .lock()
            .map(|items| items.iter().filter(|n| !n.read).count())
            .unwrap_or(0)
    }

    /// Returns `false` for unknown ids.
    pub fn mark_read(&self, id: &str) -> bool {
        let Ok(mut items) = self.items.lock() else {
            return false;
        };
        match items.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&self) {
        if let Ok(mut items) = self.items.lock() {
            items.iter_mut().for_each(|n| n.read = true);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut items) = self.items.lock() {
            items.clear();
        }
    }

    pub fn on_notification<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AppNotification) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }
}

/// Actionable notification announcing the new items of one scan.
pub fn new_items_notification(result: &ScanResult) -> AppNotification {
    let titles: Vec<&str> = result.new_items.iter().map(|i| i.title.as_str()).collect();
    let body = format!("Platform: {}\n{}", result.platform, titles.join("\n"));
    let data = serde_json::json!({ "scanResult": result });

    AppNotification::new(
        NotificationKind::Monitor,
        format!("{} new trending items", result.new_items.len()),
        body,
    )
    .with_actions(vec![
        NotificationAction::new("analyze", "Analyze"),
        NotificationAction::new("to_topic", "Turn into topic"),
        NotificationAction::new("dismiss", "Dismiss"),
    ])
    .with_data(data)
}
