//! Authentication providers for the serving side.
//!
//! A provider inspects request headers and either names the authenticated
//! principal or rejects the request; rejected requests get the provider's
//! challenge back in a `WWW-Authenticate` header.

use std::sync::Mutex;

use headers::authorization::{Basic, Bearer};
use headers::{Authorization, HeaderMapExt};
use http::HeaderMap;
use log::debug;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The request carried no usable credentials.
    #[error("missing credentials")]
    Missing,
    /// Credentials were present but wrong.
    #[error("invalid credentials")]
    Invalid,
}

/// Checks credentials on incoming requests.
pub trait AuthProvider: Send + Sync {
    /// Authorize a request by its headers, returning the principal name.
    fn authorize(&self, headers: &HeaderMap) -> Result<String, AuthError>;

    /// The `WWW-Authenticate` challenge sent with a 401.
    fn challenge(&self) -> String;
}

impl<P: AuthProvider + ?Sized> AuthProvider for std::sync::Arc<P> {
    fn authorize(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        (**self).authorize(headers)
    }

    fn challenge(&self) -> String {
        (**self).challenge()
    }
}

/// HTTP Basic authentication against one fixed username/password pair.
pub struct BasicAuth {
    username: String,
    password: String,
    realm: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> BasicAuth {
        BasicAuth {
            username: username.into(),
            password: password.into(),
            realm: "webdav".to_string(),
        }
    }

    pub fn realm(mut self, realm: impl Into<String>) -> BasicAuth {
        self.realm = realm.into();
        self
    }
}

impl AuthProvider for BasicAuth {
    fn authorize(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let auth: Authorization<Basic> = headers.typed_get().ok_or(AuthError::Missing)?;
        if auth.0.username() == self.username && auth.0.password() == self.password {
            Ok(self.username.clone())
        } else {
            Err(AuthError::Invalid)
        }
    }

    fn challenge(&self) -> String {
        format!("Basic realm=\"{}\"", self.realm)
    }
}

/// Bearer-token authentication against one fixed token.
pub struct BearerAuth {
    token: String,
    principal: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> BearerAuth {
        BearerAuth {
            token: token.into(),
            principal: "token".to_string(),
        }
    }

    /// Principal name reported for successful token auth.
    pub fn principal(mut self, name: impl Into<String>) -> BearerAuth {
        self.principal = name.into();
        self
    }
}

impl AuthProvider for BearerAuth {
    fn authorize(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let auth: Authorization<Bearer> = headers.typed_get().ok_or(AuthError::Missing)?;
        if auth.0.token() == self.token {
            Ok(self.principal.clone())
        } else {
            Err(AuthError::Invalid)
        }
    }

    fn challenge(&self) -> String {
        "Bearer".to_string()
    }
}

/// Tries a sequence of providers in order; the first success wins.
///
/// On overall failure the reported challenge is the last provider's, and
/// the error is the most specific one seen (`Invalid` beats `Missing`).
pub struct MultiAuth {
    providers: Vec<Box<dyn AuthProvider>>,
}

impl MultiAuth {
    pub fn new(providers: Vec<Box<dyn AuthProvider>>) -> MultiAuth {
        MultiAuth { providers }
    }
}

impl AuthProvider for MultiAuth {
    fn authorize(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let mut last = AuthError::Missing;
        for provider in &self.providers {
            match provider.authorize(headers) {
                Ok(user) => return Ok(user),
                Err(e) => {
                    if e == AuthError::Invalid {
                        last = AuthError::Invalid;
                    }
                }
            }
        }
        Err(last)
    }

    fn challenge(&self) -> String {
        self.providers
            .last()
            .map(|p| p.challenge())
            .unwrap_or_default()
    }
}

/// One observed authorization attempt.
#[derive(Debug, Clone)]
pub struct AuthAttempt {
    /// Principal on success, `None` on failure.
    pub principal: Option<String>,
    pub error: Option<AuthError>,
}

/// Decorator that records every authorization attempt made through it.
pub struct RecordingAuth<P> {
    inner: P,
    attempts: Mutex<Vec<AuthAttempt>>,
}

impl<P: AuthProvider> RecordingAuth<P> {
    pub fn new(inner: P) -> RecordingAuth<P> {
        RecordingAuth {
            inner,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the attempts seen so far.
    pub fn attempts(&self) -> Vec<AuthAttempt> {
        match self.attempts.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl<P: AuthProvider> AuthProvider for RecordingAuth<P> {
    fn authorize(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let result = self.inner.authorize(headers);
        let attempt = match &result {
            Ok(user) => {
                debug!("auth ok for {}", user);
                AuthAttempt {
                    principal: Some(user.clone()),
                    error: None,
                }
            }
            Err(e) => {
                debug!("auth rejected: {}", e);
                AuthAttempt {
                    principal: None,
                    error: Some(e.clone()),
                }
            }
        };
        match self.attempts.lock() {
            Ok(mut g) => g.push(attempt),
            Err(poisoned) => poisoned.into_inner().push(attempt),
        }
        result
    }

    fn challenge(&self) -> String {
        self.inner.challenge()
    }
}
