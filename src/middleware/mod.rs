pub mod builder;

use crate::quota::{CheckInput, Limiter, Outcome};
use crate::store::TtlStore;
use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::HttpResponse;
use builder::RequestQuotaBuilder;
use futures::future::{ok, LocalBoxFuture, Ready};
use std::cell::RefCell;
use std::fmt::Display;
use std::time::Duration;
use std::{future::Future, rc::Rc};

type DeniedResponse = dyn Fn(Duration) -> HttpResponse;

/// Request quota middleware.
///
/// Runs the input function, then the limiter, ahead of the wrapped service:
/// input failures short-circuit with their own error response (401 for a
/// missing required identity), denials short-circuit with the configured 429.
pub struct RequestQuota<S, F> {
    limiter: Limiter<S>,
    input_fn: Rc<F>,
    fail_open: bool,
    denied_response: Rc<DeniedResponse>,
}

impl<S, F, O> Clone for RequestQuota<S, F>
where
    S: TtlStore + 'static,
    F: Fn(&ServiceRequest) -> O + 'static,
    O: Future<Output = Result<CheckInput, actix_web::Error>>,
{
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            input_fn: self.input_fn.clone(),
            fail_open: self.fail_open,
            denied_response: self.denied_response.clone(),
        }
    }
}

impl<S, F, O> RequestQuota<S, F>
where
    S: TtlStore + 'static,
    F: Fn(&ServiceRequest) -> O + 'static,
    O: Future<Output = Result<CheckInput, actix_web::Error>>,
{
    /// # Arguments
    ///
    /// * `store`: The [TtlStore] holding the counters.
    /// * `input_fn`: A future that produces a [CheckInput] based on the
    ///   incoming request, see
    ///   [QuotaInputFunctionBuilder](crate::quota::QuotaInputFunctionBuilder).
    pub fn builder(store: S, input_fn: F) -> RequestQuotaBuilder<S, F> {
        RequestQuotaBuilder::new(Limiter::new(store), input_fn)
    }
}

impl<Svc, B, S, E, F, O> Transform<Svc, ServiceRequest> for RequestQuota<S, F>
where
    Svc: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    Svc::Future: 'static,
    B: 'static,
    S: TtlStore<Error = E> + 'static,
    E: Into<actix_web::Error> + Display + 'static,
    F: Fn(&ServiceRequest) -> O + 'static,
    O: Future<Output = Result<CheckInput, actix_web::Error>>,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Transform = RequestQuotaMiddleware<Svc, S, F>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: Svc) -> Self::Future {
        ok(RequestQuotaMiddleware {
            service: Rc::new(RefCell::new(service)),
            limiter: self.limiter.clone(),
            input_fn: Rc::clone(&self.input_fn),
            fail_open: self.fail_open,
            denied_response: self.denied_response.clone(),
        })
    }
}

pub struct RequestQuotaMiddleware<Svc, S, F> {
    service: Rc<RefCell<Svc>>,
    limiter: Limiter<S>,
    input_fn: Rc<F>,
    fail_open: bool,
    denied_response: Rc<DeniedResponse>,
}

impl<Svc, B, S, E, F, O> Service<ServiceRequest> for RequestQuotaMiddleware<Svc, S, F>
where
    Svc: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    Svc::Future: 'static,
    B: 'static,
    S: TtlStore<Error = E> + 'static,
    E: Into<actix_web::Error> + Display + 'static,
    F: Fn(&ServiceRequest) -> O + 'static,
    O: Future<Output = Result<CheckInput, actix_web::Error>>,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone();
        let input_fn = self.input_fn.clone();
        let fail_open = self.fail_open;
        let denied_response = self.denied_response.clone();

        Box::pin(async move {
            let input = match (input_fn)(&req).await {
                Ok(input) => input,
                Err(e) => {
                    log::warn!("Quota input function rejected the request: {e}");
                    return Ok(req.into_response(e.error_response()).map_into_right_body());
                }
            };

            match limiter.check(input).await {
                Ok(Outcome::Allowed) => {}
                Ok(Outcome::Denied { retry_after }) => {
                    let response: HttpResponse = (denied_response)(retry_after);
                    return Ok(req.into_response(response).map_into_right_body());
                }
                // Unable to query the store
                Err(e) => {
                    if fail_open {
                        log::warn!("Quota store failed: {}, allowing the request anyway", e);
                    } else {
                        log::error!("Quota store failed: {}", e);
                        return Ok(req
                            .into_response(e.into().error_response())
                            .map_into_right_body());
                    }
                }
            }

            let service_response = service.call(req).await?;
            Ok(service_response.map_into_left_body())
        })
    }
}
