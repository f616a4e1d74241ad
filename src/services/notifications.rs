use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

/// Which message template the dispatcher should render.
#[derive(Debug, Clone, Copy)]
pub enum NotificationKind {
    BookingSummary,
    AutoBookingCreated,
}

impl NotificationKind {
    fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingSummary => "booking_summary",
            NotificationKind::AutoBookingCreated => "auto_booking_created",
        }
    }
}

/// Fire-and-forget push dispatcher. Failures are logged, never propagated
/// into the booking transaction.
pub struct NotificationService {
    pub client: Client,
    pub fcm_api_key: Option<String>,
}

impl NotificationService {
    pub fn new(fcm_api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            fcm_api_key,
        }
    }

    pub async fn notify(&self, student_id: Uuid, kind: NotificationKind, fields: serde_json::Value) {
        let api_key = match &self.fcm_api_key {
            Some(k) => k,
            None => {
                tracing::debug!("FCM not configured, skipping push notification");
                return;
            }
        };

        let payload = json!({
            "to": format!("/topics/student-{student_id}"),
            "data": {
                "template": kind.as_str(),
                "fields": fields,
            }
        });

        let response = self
            .client
            .post("https://fcm.googleapis.com/fcm/send")
            .header("Authorization", format!("key={}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(r) if !r.status().is_success() => {
                let status = r.status();
                let text = r.text().await.unwrap_or_default();
                tracing::warn!("FCM error {}: {}", status, text);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("FCM dispatch failed for {}: {}", student_id, e),
        }
    }
}
