//! Session middleware: resolves the caller's session from its cookie.
//!
//! The resolved [`CurrentSession`] is stored in the request extensions for
//! handlers to pick up. New sessions are announced with a `Set-Cookie` header.

use std::pin::Pin;

use crate::{
    Response,
    context::Context,
    http::SetCookie,
    middleware::{Middleware, Next},
};

use super::{SESSION_COOKIE, SessionHandle, SessionId, SessionStore};

/// The session a request belongs to.
#[derive(Clone)]
pub struct CurrentSession {
    pub id: SessionId,
    pub handle: SessionHandle,
}

/// Attaches a [`CurrentSession`] to every request except the skipped paths.
pub struct SessionMiddleware {
    store: SessionStore,
    skip_paths: Vec<String>,
}

impl SessionMiddleware {
    /// Resolves sessions against `store`.
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            skip_paths: Vec::new(),
        }
    }

    /// Requests to `path` get no session (and never create one).
    #[must_use]
    pub fn skip(mut self, path: impl Into<String>) -> Self {
        self.skip_paths.push(path.into());
        self
    }
}

impl Middleware for SessionMiddleware {
    fn handle(
        &self,
        mut ctx: Context,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        if self.skip_paths.iter().any(|p| p == ctx.request().path()) {
            return Box::pin(next.run(ctx));
        }

        let presented = ctx
            .request()
            .cookie(SESSION_COOKIE)
            .and_then(|raw| raw.parse::<SessionId>().ok());
        let (id, handle, created) = self.store.get_or_create(presented);
        ctx.extensions_mut().insert(CurrentSession { id, handle });

        Box::pin(async move {
            let mut response = next.run(ctx).await;
            if created {
                let cookie = SetCookie::new(SESSION_COOKIE, id.to_string())
                    .http_only()
                    .same_site_lax();
                response.add_cookie(&cookie);
            }
            response
        })
    }
}
