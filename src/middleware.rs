use std::future::{Ready, ready};
use std::rc::Rc;
use std::sync::Arc;

use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::{Error, HttpResponse};
use futures_util::future::LocalBoxFuture;
use serde_json::json;
use tracing::debug;

use crate::gate::{Admission, Guard};

/// Path prefixes the bot gate never inspects.
pub const DEFAULT_EXCLUDED_PREFIXES: &[&str] = &["/_next/static", "/_next/image", "/favicon.ico"];

pub fn is_excluded(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

/// Response returned to a client the bot gate refuses.
fn blocked_response(admission: &Admission) -> HttpResponse {
    let rate_limited = matches!(admission, Admission::Denied(d) if d.reason.is_rate_limit());
    if rate_limited {
        HttpResponse::TooManyRequests().json(json!({"code": 429, "message": "Too Many Requests"}))
    } else if matches!(admission, Admission::Unavailable(_)) {
        HttpResponse::ServiceUnavailable()
            .json(json!({"code": 503, "message": "Service Unavailable"}))
    } else {
        HttpResponse::Forbidden().json(json!({"code": 403, "message": "Forbidden"}))
    }
}

/// Middleware running a [`Guard`] ahead of every route outside the excluded
/// prefixes.
pub struct BotGateMiddleware {
    guard: Guard,
    excluded: Arc<[String]>,
}

impl BotGateMiddleware {
    pub fn new(guard: Guard, excluded: Vec<String>) -> Self {
        Self {
            guard,
            excluded: excluded.into(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for BotGateMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = BotGateMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BotGateMiddlewareService {
            service: Rc::new(service),
            guard: self.guard.clone(),
            excluded: Arc::clone(&self.excluded),
        }))
    }
}

pub struct BotGateMiddlewareService<S> {
    service: Rc<S>,
    guard: Guard,
    excluded: Arc<[String]>,
}

impl<S, B> Service<ServiceRequest> for BotGateMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if is_excluded(req.path(), &self.excluded) {
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        }

        let service = Rc::clone(&self.service);
        let guard = self.guard.clone();

        Box::pin(async move {
            let details = guard.details(req.request());
            let admission = guard.check(&details).await;
            if admission.is_allowed() {
                return Ok(service.call(req).await?.map_into_left_body());
            }

            debug!(
                guard = guard.name(),
                path = %details.path,
                client = details.client_key(),
                "Request blocked by middleware"
            );
            let response = blocked_response(&admission);
            Ok(req.into_response(response).map_into_right_body())
        })
    }
}
