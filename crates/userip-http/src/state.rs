//! HTTP application state: wraps `ServiceState` with HTTP-specific fields.
//!
//! `AppState` provides transparent access to all `ServiceState` methods
//! via `Deref`, and adds the name of the header that carries the
//! authenticated user.

use std::ops::Deref;
use std::sync::Arc;

use axum::http::HeaderName;
use userip_service::ServiceState;

/// Header set by the trusted upstream authenticator.
pub static DEFAULT_USER_HEADER: HeaderName = HeaderName::from_static("x-token-user-email");

/// Shared HTTP application state, cloneable across handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppInner>,
}

struct AppInner {
    service: ServiceState,
    user_header: HeaderName,
}

impl Deref for AppState {
    type Target = ServiceState;

    fn deref(&self) -> &ServiceState {
        &self.inner.service
    }
}

impl AppState {
    /// Creates a new HTTP application state.
    pub fn new(service: ServiceState, user_header: HeaderName) -> Self {
        Self {
            inner: Arc::new(AppInner {
                service,
                user_header,
            }),
        }
    }

    /// Creates a state that reads the user from [`DEFAULT_USER_HEADER`].
    pub fn with_default_header(service: ServiceState) -> Self {
        Self::new(service, DEFAULT_USER_HEADER.clone())
    }

    /// Returns the header carrying the authenticated user.
    pub fn user_header(&self) -> &HeaderName {
        &self.inner.user_header
    }

    /// Returns a reference to the underlying service state.
    pub fn service(&self) -> &ServiceState {
        &self.inner.service
    }
}
