// Guards for route protection

use crate::{Error, RequestContext};
use async_trait::async_trait;

/// Guard trait for protecting routes
///
/// `Ok(false)` denies the request with a 403 and never reaches the exception
/// filters. An `Err` is treated like any other failure and is offered to the
/// filters.
#[async_trait]
pub trait Guard: Send + Sync {
    /// Determine if the request can proceed
    async fn can_activate(&self, context: &RequestContext) -> Result<bool, Error>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Result of running a guard list
#[derive(Debug)]
pub enum GuardOutcome {
    /// Every guard returned true
    Allowed,
    /// The guard at this position returned false
    Denied(usize),
    /// A guard failed
    Errored(Error),
}

/// Evaluate `guards` strictly in order, stopping at the first denial or
/// failure.
pub async fn evaluate_guards(
    guards: &[std::sync::Arc<dyn Guard>],
    context: &RequestContext,
) -> GuardOutcome {
    for (index, guard) in guards.iter().enumerate() {
        match guard.can_activate(context).await {
            Ok(true) => continue,
            Ok(false) => return GuardOutcome::Denied(index),
            Err(e) => return GuardOutcome::Errored(e),
        }
    }
    GuardOutcome::Allowed
}

/// Passes requests carrying an `Authorization: Bearer <token>` header
pub struct AuthenticationGuard;

#[async_trait]
impl Guard for AuthenticationGuard {
    async fn can_activate(&self, context: &RequestContext) -> Result<bool, Error> {
        Ok(context
            .header("authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
            .is_some_and(|token| !token.trim().is_empty()))
    }
}

/// Guard backed by a closure
pub struct CustomGuard<F>
where
    F: Fn(&RequestContext) -> Result<bool, Error> + Send + Sync,
{
    predicate: F,
}

impl<F> CustomGuard<F>
where
    F: Fn(&RequestContext) -> Result<bool, Error> + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl<F> Guard for CustomGuard<F>
where
    F: Fn(&RequestContext) -> Result<bool, Error> + Send + Sync,
{
    async fn can_activate(&self, context: &RequestContext) -> Result<bool, Error> {
        (self.predicate)(context)
    }
}

/// Passes requests whose `x-api-key` header is one of the configured keys
pub struct ApiKeyGuard {
    valid_keys: Vec<String>,
}

impl ApiKeyGuard {
    pub fn new(keys: Vec<String>) -> Self {
        Self { valid_keys: keys }
    }
}

#[async_trait]
impl Guard for ApiKeyGuard {
    async fn can_activate(&self, context: &RequestContext) -> Result<bool, Error> {
        Ok(context
            .header("x-api-key")
            .is_some_and(|key| self.valid_keys.contains(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HttpMethod, HttpRequest, RequestContext};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context(request: HttpRequest) -> RequestContext {
        RequestContext::detached(request)
    }

    #[tokio::test]
    async fn test_authentication_guard() {
        let guard = AuthenticationGuard;

        let ok = context(HttpRequest::new(HttpMethod::GET, "/").with_header("Authorization", "Bearer x"));
        assert!(guard.can_activate(&ok).await.unwrap());

        let missing = context(HttpRequest::new(HttpMethod::GET, "/"));
        assert!(!guard.can_activate(&missing).await.unwrap());

        let basic = context(HttpRequest::new(HttpMethod::GET, "/").with_header("authorization", "Basic abc"));
        assert!(!guard.can_activate(&basic).await.unwrap());
    }

    #[tokio::test]
    async fn test_api_key_guard() {
        let guard = ApiKeyGuard::new(vec!["valid-key".to_string()]);

        let ok = context(HttpRequest::new(HttpMethod::GET, "/").with_header("X-Api-Key", "valid-key"));
        assert!(guard.can_activate(&ok).await.unwrap());

        let bad = context(HttpRequest::new(HttpMethod::GET, "/").with_header("x-api-key", "nope"));
        assert!(!guard.can_activate(&bad).await.unwrap());
    }

    #[tokio::test]
    async fn test_evaluation_short_circuits_on_denial() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = |result: bool| {
            let calls = calls.clone();
            Arc::new(CustomGuard::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(result)
            })) as Arc<dyn Guard>
        };

        let guards = vec![counted(true), counted(false), counted(true)];
        let ctx = context(HttpRequest::new(HttpMethod::GET, "/"));
        assert!(matches!(evaluate_guards(&guards, &ctx).await, GuardOutcome::Denied(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_evaluation_stops_on_error() {
        let guards: Vec<Arc<dyn Guard>> = vec![
            Arc::new(CustomGuard::new(|_| Err(Error::Unauthorized("expired".into())))),
            Arc::new(CustomGuard::new(|_| panic!("must not run"))),
        ];
        let ctx = context(HttpRequest::new(HttpMethod::GET, "/"));
        assert!(matches!(
            evaluate_guards(&guards, &ctx).await,
            GuardOutcome::Errored(Error::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_guard_list_allows() {
        let ctx = context(HttpRequest::new(HttpMethod::GET, "/"));
        assert!(matches!(evaluate_guards(&[], &ctx).await, GuardOutcome::Allowed));
    }
}
