//! Notification entity and the REST payloads that carry it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Someone liked one of the user's projects.
    Like,
    /// Someone commented on one of the user's projects.
    Comment,
    /// Someone replied to one of the user's comments.
    Reply,
    /// Someone started following the user.
    Follow,
    /// The user was mentioned.
    Mention,
    /// A followed project was updated.
    ProjectUpdate,
    /// Platform announcement.
    System,
    /// A category this client does not know about yet.
    #[serde(other)]
    Other,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Like => write!(f, "like"),
            Self::Comment => write!(f, "comment"),
            Self::Reply => write!(f, "reply"),
            Self::Follow => write!(f, "follow"),
            Self::Mention => write!(f, "mention"),
            Self::ProjectUpdate => write!(f, "project_update"),
            Self::System => write!(f, "system"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// The user who caused a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSender {
    /// Sender user id.
    pub id: String,
    /// Display name.
    #[serde(alias = "displayName")]
    pub name: String,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A single notification, unique by [`Notification::id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Unique identifier.
    pub id: String,
    /// Category.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Short title.
    pub title: String,
    /// Optional body text.
    #[serde(default, alias = "message", skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Optional deep link into the application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Read flag.
    #[serde(default, alias = "isRead")]
    pub read: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Optional sender reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<NotificationSender>,
}

impl Notification {
    /// Create an unread notification with only the required fields.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: NotificationKind, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            body: None,
            link: None,
            read: false,
            created_at: Utc::now(),
            sender: None,
        }
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the deep link.
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Set the read flag.
    #[must_use]
    pub const fn with_read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// Set the sender.
    #[must_use]
    pub fn with_sender(mut self, sender: NotificationSender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Set the creation time.
    #[must_use]
    pub const fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Pagination block of `GET /notifications`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Total number of notifications matching the query.
    pub total: u64,
    /// Total number of pages.
    pub total_pages: u32,
}

impl Pagination {
    /// Whether a page after this one exists.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Response of `GET /notifications`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPage {
    /// Notifications on this page, newest first.
    pub notifications: Vec<Notification>,
    /// Pagination metadata.
    pub pagination: Pagination,
}

/// Response of `GET /notifications/unread-count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    /// Server-side unread total.
    pub unread_count: u64,
}

/// Response of the read/read-all mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadAcknowledgement {
    /// Server-side unread total after the mutation, when reported.
    #[serde(default)]
    pub unread_count: Option<u64>,
    /// Number of notifications the mutation changed, when reported.
    #[serde(default)]
    pub updated_count: Option<u64>,
}

/// Response of `POST /auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// The new access credential.
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn notification_from_server_json() {
        let json = r#"{
            "id": "n1",
            "type": "comment",
            "title": "New comment",
            "message": "Nice project!",
            "link": "/projects/42",
            "isRead": false,
            "createdAt": "2026-01-05T10:00:00Z",
            "sender": { "id": "u7", "displayName": "Ada", "avatar": "https://cdn/a.png" }
        }"#;

        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.id, "n1");
        assert_eq!(n.kind, NotificationKind::Comment);
        assert_eq!(n.body.as_deref(), Some("Nice project!"));
        assert_eq!(n.link.as_deref(), Some("/projects/42"));
        assert!(!n.read);
        let sender = n.sender.unwrap();
        assert_eq!(sender.name, "Ada");
        assert_eq!(sender.avatar.as_deref(), Some("https://cdn/a.png"));
    }

    #[test]
    fn notification_optional_fields_default() {
        let json = r#"{"id":"n2","type":"follow","title":"t","createdAt":"2026-01-05T10:00:00Z"}"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert!(n.body.is_none());
        assert!(n.link.is_none());
        assert!(n.sender.is_none());
        assert!(!n.read);
    }

    #[test]
    fn unknown_kind_maps_to_other() {
        let json = r#"{"id":"n3","type":"badge_awarded","title":"t","read":true,"createdAt":"2026-01-05T10:00:00Z"}"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.kind, NotificationKind::Other);
        assert!(n.read);
    }

    #[test]
    fn kind_display() {
        assert_eq!(NotificationKind::ProjectUpdate.to_string(), "project_update");
        assert_eq!(NotificationKind::Like.to_string(), "like");
    }

    #[test]
    fn page_response_and_has_more() {
        let json = r#"{
            "notifications": [],
            "pagination": { "page": 1, "limit": 20, "total": 45, "totalPages": 3 }
        }"#;
        let page: NotificationPage = serde_json::from_str(json).unwrap();
        assert!(page.pagination.has_more());
        assert_eq!(page.pagination.total, 45);

        let last = Pagination {
            page: 3,
            limit: 20,
            total: 45,
            total_pages: 3,
        };
        assert!(!last.has_more());
    }

    #[test]
    fn read_acknowledgement_tolerates_missing_counts() {
        let ack: ReadAcknowledgement = serde_json::from_str("{}").unwrap();
        assert_eq!(ack, ReadAcknowledgement::default());

        let ack: ReadAcknowledgement =
            serde_json::from_str(r#"{"unreadCount":3,"updatedCount":1}"#).unwrap();
        assert_eq!(ack.unread_count, Some(3));
        assert_eq!(ack.updated_count, Some(1));
    }

    #[test]
    fn refresh_response_camel_case() {
        let r: RefreshResponse = serde_json::from_str(r#"{"accessToken":"abc"}"#).unwrap();
        assert_eq!(r.access_token, "abc");
    }
}
