use crate::identity::{client_ip, Identity, IdentityError};
use crate::quota::{CheckInput, QuotaPolicy};
use actix_web::dev::ServiceRequest;
use std::future::{ready, Ready};

type UserFn = Box<dyn Fn(&ServiceRequest) -> Option<u64>>;

pub type QuotaInputFuture = Ready<Result<CheckInput, actix_web::Error>>;

/// Utility to create an input function that produces a [CheckInput] for a
/// fixed action and policy.
///
/// By default the identity is the client IP, which always resolves to *some*
/// value. Call sites with their own authentication layer supply a user
/// extractor instead, in one of two modes: required (an unauthenticated
/// request fails the check outright) or best-effort (falls back to the IP).
pub struct QuotaInputFunctionBuilder {
    action: String,
    policy: QuotaPolicy,
    user_fn: Option<UserFn>,
    require_user: bool,
}

impl QuotaInputFunctionBuilder {
    pub fn new(action: &str, policy: QuotaPolicy) -> Self {
        Self {
            action: action.to_owned(),
            policy,
            user_fn: None,
            require_user: false,
        }
    }

    /// Bucket by authenticated user, extracted by `f` (typically from request
    /// extensions populated by your auth middleware).
    ///
    /// When `f` returns [None] the input function fails with
    /// [IdentityError::NoAuthenticatedUser], which renders as 401; the store
    /// is never consulted for such a request.
    pub fn authenticated_user<F>(mut self, f: F) -> Self
    where
        F: Fn(&ServiceRequest) -> Option<u64> + 'static,
    {
        self.user_fn = Some(Box::new(f));
        self.require_user = true;
        self
    }

    /// Bucket by authenticated user when `f` resolves one, otherwise fall
    /// back to the client IP.
    pub fn user_or_ip<F>(mut self, f: F) -> Self
    where
        F: Fn(&ServiceRequest) -> Option<u64> + 'static,
    {
        self.user_fn = Some(Box::new(f));
        self.require_user = false;
        self
    }

    pub fn build(self) -> impl Fn(&ServiceRequest) -> QuotaInputFuture + 'static {
        move |req| {
            ready((|| {
                let identity = match &self.user_fn {
                    Some(f) => match f(req) {
                        Some(id) => Identity::User(id),
                        None if self.require_user => {
                            return Err(IdentityError::NoAuthenticatedUser.into())
                        }
                        None => Identity::Ip(client_ip(req)),
                    },
                    None => Identity::Ip(client_ip(req)),
                };
                Ok(CheckInput {
                    action: self.action.clone(),
                    identity,
                    policy: self.policy.clone(),
                })
            })())
        }
    }
}
