//! Notification REST endpoints.

use hub_core::{NotificationPage, ReadAcknowledgement, UnreadCount};
use hub_session::{ApiRequest, ApiResult, Authenticator};
use url::form_urlencoded::byte_serialize;

/// Typed wrapper over the notification endpoints.
#[derive(Debug, Clone)]
pub struct NotificationApi {
    auth: Authenticator,
}

impl NotificationApi {
    /// Wrap an authenticator.
    #[must_use]
    pub const fn new(auth: Authenticator) -> Self {
        Self { auth }
    }

    /// Session epoch of the underlying credential store.
    #[must_use]
    pub fn session_epoch(&self) -> u64 {
        self.auth.credentials().epoch()
    }

    /// `GET /notifications?page&limit[&unreadOnly]`
    ///
    /// # Errors
    ///
    /// Any [`hub_session::ApiError`] from the request.
    pub async fn fetch_page(
        &self,
        page: u32,
        limit: u32,
        unread_only: bool,
    ) -> ApiResult<NotificationPage> {
        let mut request = ApiRequest::get("/notifications")
            .with_query("page", page)
            .with_query("limit", limit);
        if unread_only {
            request = request.with_query("unreadOnly", true);
        }
        self.auth.execute_json(request).await
    }

    /// `GET /notifications/unread-count`
    ///
    /// # Errors
    ///
    /// Any [`hub_session::ApiError`] from the request.
    pub async fn unread_count(&self) -> ApiResult<u64> {
        let count: UnreadCount = self
            .auth
            .execute_json(ApiRequest::get("/notifications/unread-count"))
            .await?;
        Ok(count.unread_count)
    }

    /// `PATCH /notifications/:id/read`
    ///
    /// # Errors
    ///
    /// Any [`hub_session::ApiError`] from the request.
    pub async fn mark_as_read(&self, id: &str) -> ApiResult<ReadAcknowledgement> {
        let id: String = byte_serialize(id.as_bytes()).collect();
        self.acknowledged(ApiRequest::patch(format!("/notifications/{id}/read")))
            .await
    }

    /// `PATCH /notifications/read-all`
    ///
    /// # Errors
    ///
    /// Any [`hub_session::ApiError`] from the request.
    pub async fn mark_all_read(&self) -> ApiResult<ReadAcknowledgement> {
        self.acknowledged(ApiRequest::patch("/notifications/read-all"))
            .await
    }

    async fn acknowledged(&self, request: ApiRequest) -> ApiResult<ReadAcknowledgement> {
        let response = self.auth.execute(request).await?.into_result()?;
        // 204 and empty bodies carry no counts.
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ReadAcknowledgement::default());
        }
        response.json()
    }
}
