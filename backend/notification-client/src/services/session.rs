/// Authenticated session state shared by the HTTP client and the push connection
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

#[derive(Debug, Default, Clone)]
struct Tokens {
    access: Option<String>,
    refresh: Option<String>,
}

/// Cheap to clone; all clones observe the same tokens.
#[derive(Clone)]
pub struct Session {
    tokens: Arc<RwLock<Tokens>>,
    valid: Arc<watch::Sender<bool>>,
}

impl Session {
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        let (valid, _) = watch::channel(true);
        Self {
            tokens: Arc::new(RwLock::new(Tokens {
                access: access_token,
                refresh: refresh_token,
            })),
            valid: Arc::new(valid),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(None, None)
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens.read().access.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.tokens.read().refresh.clone()
    }

    /// `Authorization` header value, if logged in
    pub fn bearer(&self) -> Option<String> {
        self.access_token().map(|token| format!("Bearer {}", token))
    }

    /// Store a freshly issued access token (and rotated refresh token, if any)
    pub fn update_tokens(&self, access_token: String, refresh_token: Option<String>) {
        let mut tokens = self.tokens.write();
        tokens.access = Some(access_token);
        if refresh_token.is_some() {
            tokens.refresh = refresh_token;
        }
        drop(tokens);
        self.valid.send_replace(true);
    }

    /// Drop all credentials and tell observers the user has to log in again
    pub fn invalidate(&self) {
        {
            let mut tokens = self.tokens.write();
            tokens.access = None;
            tokens.refresh = None;
        }
        if self.valid.send_replace(false) {
            warn!("Session expired, credentials cleared");
        }
    }

    pub fn is_valid(&self) -> bool {
        *self.valid.borrow()
    }

    pub fn subscribe_validity(&self) -> watch::Receiver<bool> {
        self.valid.subscribe()
    }
}
