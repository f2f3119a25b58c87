use crate::middleware::{DeniedResponse, RequestQuota};
use crate::quota::{CheckInput, Limiter};
use crate::store::TtlStore;
use actix_web::dev::ServiceRequest;
use actix_web::http::header::RETRY_AFTER;
use actix_web::HttpResponse;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

pub struct RequestQuotaBuilder<S, F> {
    limiter: Limiter<S>,
    input_fn: F,
    fail_open: bool,
    denied_response: Rc<DeniedResponse>,
}

impl<S, F, O> RequestQuotaBuilder<S, F>
where
    S: TtlStore + 'static,
    F: Fn(&ServiceRequest) -> O,
    O: Future<Output = Result<CheckInput, actix_web::Error>>,
{
    pub(super) fn new(limiter: Limiter<S>, input_fn: F) -> Self {
        Self {
            limiter,
            input_fn,
            fail_open: false,
            denied_response: Rc::new(default_denied_response),
        }
    }

    /// Choose whether to allow a request if the store returns a failure.
    ///
    /// Default is false.
    pub fn fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    /// In the event that the request is denied, configure the [HttpResponse]
    /// returned, given how long the caller should wait before retrying.
    ///
    /// Defaults to status 429 with a `Retry-After` header and the body
    /// `"Rate limit exceeded. Try again in {N} seconds."`.
    pub fn request_denied_response<R>(mut self, denied_response: R) -> Self
    where
        R: Fn(Duration) -> HttpResponse + 'static,
    {
        self.denied_response = Rc::new(denied_response);
        self
    }

    pub fn build(self) -> RequestQuota<S, F> {
        RequestQuota {
            limiter: self.limiter,
            input_fn: Rc::new(self.input_fn),
            fail_open: self.fail_open,
            denied_response: self.denied_response,
        }
    }
}

fn default_denied_response(retry_after: Duration) -> HttpResponse {
    let seconds = retry_after.as_secs();
    HttpResponse::TooManyRequests()
        .insert_header((RETRY_AFTER, seconds))
        .body(format!(
            "Rate limit exceeded. Try again in {seconds} seconds."
        ))
}
