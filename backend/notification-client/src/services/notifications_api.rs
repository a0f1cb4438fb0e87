//! HTTP client for the notification endpoints of the approvals backend
//!
//! All requests carry the session's bearer token. A 401/403 triggers one token
//! refresh and a single retry; if that fails the session is invalidated.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{
    Audience, BroadcastRequest, Notification, NotificationListResponse, RefreshTokenRequest,
    RefreshTokenResponse, SendNotificationRequest, UnreadCountResponse,
};
use crate::services::Session;

/// Backend operations the reconciler and inbox depend on
#[async_trait]
pub trait NotificationsApi: Send + Sync {
    /// Authoritative number of unread notifications for the current user
    async fn unread_count(&self) -> Result<u64>;

    async fn list(&self) -> Result<Vec<Notification>>;

    async fn mark_read(&self, id: &str) -> Result<()>;

    async fn mark_all_read(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct HttpNotificationsApi {
    client: Client,
    base_url: String,
    session: Session,
}

impl HttpNotificationsApi {
    pub fn new(base_url: impl Into<String>, session: Session) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send an authenticated request, refreshing the access token once on 401/403
    async fn send_authorized<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.with_bearer(build(&self.client)).send().await?;

        if !is_auth_failure(response.status()) {
            return check_status(response).await;
        }

        debug!("Backend rejected access token ({}), refreshing", response.status());
        self.refresh_session().await?;

        let retried = self.with_bearer(build(&self.client)).send().await?;
        if is_auth_failure(retried.status()) {
            self.session.invalidate();
            return Err(AppError::SessionExpired);
        }
        check_status(retried).await
    }

    fn with_bearer(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.bearer() {
            Some(bearer) => request.header(reqwest::header::AUTHORIZATION, bearer),
            None => request,
        }
    }

    async fn refresh_session(&self) -> Result<()> {
        let Some(refresh_token) = self.session.refresh_token() else {
            self.session.invalidate();
            return Err(AppError::SessionExpired);
        };

        let outcome = self
            .client
            .post(self.url("/auth/refresh"))
            .json(&RefreshTokenRequest { refresh_token })
            .send()
            .await;

        let response = match outcome {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                warn!("Token refresh rejected with {}", resp.status());
                self.session.invalidate();
                return Err(AppError::SessionExpired);
            }
            Err(e) => {
                warn!("Token refresh request failed: {}", e);
                self.session.invalidate();
                return Err(AppError::SessionExpired);
            }
        };

        let tokens = match response.json::<RefreshTokenResponse>().await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("Token refresh returned an unreadable body: {}", e);
                self.session.invalidate();
                return Err(AppError::SessionExpired);
            }
        };

        self.session
            .update_tokens(tokens.access_token, tokens.refresh_token);
        info!("Access token refreshed");
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self.send_authorized(|c| c.get(&url)).await?;
        Ok(response.json::<T>().await?)
    }

    async fn post_empty(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        self.send_authorized(|c| c.post(&url)).await?;
        Ok(())
    }

    /// Broadcast to every student or every staff member
    pub async fn broadcast(&self, audience: Audience, request: &BroadcastRequest) -> Result<()> {
        request.validate()?;
        let url = self.url(&format!("/notifications/broadcast/{}", audience.as_str()));
        self.send_authorized(|c| c.post(&url).json(request)).await?;
        info!("Broadcast sent to {}", audience.as_str());
        Ok(())
    }

    pub async fn broadcast_to_students(&self, request: &BroadcastRequest) -> Result<()> {
        self.broadcast(Audience::Students, request).await
    }

    pub async fn broadcast_to_staff(&self, request: &BroadcastRequest) -> Result<()> {
        self.broadcast(Audience::Staff, request).await
    }

    /// Send to an explicit list of recipients
    pub async fn send_custom(&self, request: &SendNotificationRequest) -> Result<()> {
        request.validate()?;
        let url = self.url("/notifications/send");
        self.send_authorized(|c| c.post(&url).json(request)).await?;
        info!("Notification sent to {} recipient(s)", request.recipients.len());
        Ok(())
    }
}

#[async_trait]
impl NotificationsApi for HttpNotificationsApi {
    async fn unread_count(&self) -> Result<u64> {
        let body: UnreadCountResponse = self.get_json("/notifications/unread-count").await?;
        Ok(body.unread_notifications)
    }

    async fn list(&self) -> Result<Vec<Notification>> {
        let body: NotificationListResponse = self.get_json("/notifications/all").await?;
        Ok(body.into_notifications())
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        self.post_empty(&format!(
            "/notifications/mark-read/{}",
            urlencoding::encode(id)
        ))
        .await
    }

    async fn mark_all_read(&self) -> Result<()> {
        self.post_empty("/notifications/mark-all-read").await
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(AppError::Status {
        status: status.as_u16(),
        body,
    })
}
