use std::{
    future::{ready, Ready},
    rc::Rc,
    sync::Arc,
};

use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use tracing::{debug, warn};

use crate::auth::IdentityVerifier;
use crate::gateway::cookie_token;
use crate::models::User;

#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user: User,
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or_else(|| actix_web::error::ErrorUnauthorized("Unauthorized")),
        )
    }
}

/// Same credential sources as the socket handshake, plus a bearer header.
fn request_token(req: &ServiceRequest) -> Option<String> {
    cookie_token(req.request()).or_else(|| {
        req.headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string)
            .filter(|token| !token.is_empty())
    })
}

pub struct Authentication {
    pub verifier: Arc<dyn IdentityVerifier>,
}

// Middleware factory is `Transform` trait
// `S` - type of the next service
// `B` - type of response's body
impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticationMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticationMiddleware {
            service: Rc::new(service),
            verifier: self.verifier.clone(),
        }))
    }
}

pub struct AuthenticationMiddleware<S> {
    service: Rc<S>,
    verifier: Arc<dyn IdentityVerifier>,
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let verifier = self.verifier.clone();

        // Handlers that need a user reject the request through the
        // `AuthenticatedUser` extractor; this only resolves it.
        Box::pin(async move {
            match request_token(&req) {
                Some(token) => match verifier.verify(&token).await {
                    Ok(user) => {
                        debug!("Authenticated user: {}", user.id);
                        req.extensions_mut().insert(AuthenticatedUser { user });
                    }
                    Err(e) => {
                        warn!("Rejected credential on {}: {}", req.path(), e);
                    }
                },
                None => {
                    debug!("No credential on request to {}", req.path());
                }
            }

            service.call(req).await
        })
    }
}
