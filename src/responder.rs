//! Single-use response slot shared by the cache hand-off and the deferred
//! decision path.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::RenderError;
use crate::lock::mutex_lock;
use crate::render::Response;

const SOURCE: &str = "responder";

/// Caller-supplied completion callback. Receives exactly one result per request.
pub type RenderCallback = Box<dyn FnOnce(Result<Response, RenderError>) + Send + 'static>;

/// Holds the response callback until the first delivery.
///
/// The `delivered` flag is checked before every attempt, so whichever path
/// delivers first wins and every later attempt is discarded.
pub struct Responder {
    delivered: AtomicBool,
    callback: Mutex<Option<RenderCallback>>,
}

impl Responder {
    pub fn new(callback: RenderCallback) -> Self {
        Self {
            delivered: AtomicBool::new(false),
            callback: Mutex::new(Some(callback)),
        }
    }

    /// Deliver `result` unless a response already went out. Returns whether
    /// this call was the one that delivered.
    pub fn deliver(&self, result: Result<Response, RenderError>) -> bool {
        if self.delivered.swap(true, Ordering::AcqRel) {
            debug!(
                outcome = if result.is_ok() { "ok" } else { "error" },
                "discarding duplicate response delivery"
            );
            return false;
        }

        let callback = mutex_lock(&self.callback, SOURCE, "deliver").take();
        match callback {
            Some(callback) => {
                callback(result);
                true
            }
            None => false,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::render::{CachedContext, RenderOutput, ResponseContext};

    fn cached_response(markup: &str) -> Response {
        Response {
            body: Some(RenderOutput::Markup(markup.to_string())),
            context: ResponseContext::Cached(CachedContext::new("{}")),
        }
    }

    #[test]
    fn first_delivery_wins_and_later_ones_are_discarded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let responder = {
            let calls = Arc::clone(&calls);
            let seen = Arc::clone(&seen);
            Responder::new(Box::new(move |result: Result<Response, RenderError>| {
                calls.fetch_add(1, Ordering::SeqCst);
                let markup = result
                    .ok()
                    .and_then(|response| response.body)
                    .and_then(|body| body.into_markup());
                seen.lock().unwrap().push(markup);
            }))
        };

        assert!(!responder.is_delivered());
        assert!(responder.deliver(Ok(cached_response("<p>first</p>"))));
        assert!(responder.is_delivered());
        assert!(!responder.deliver(Ok(cached_response("<p>second</p>"))));
        assert!(!responder.deliver(Err(RenderError::Argument("callback"))));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("<p>first</p>".to_string())]
        );
    }

    #[test]
    fn error_delivery_also_consumes_the_slot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let responder = {
            let calls = Arc::clone(&calls);
            Responder::new(Box::new(move |result: Result<Response, RenderError>| {
                assert!(result.is_err());
                calls.fetch_add(1, Ordering::SeqCst);
            }))
        };

        assert!(responder.deliver(Err(RenderError::Argument("component"))));
        assert!(!responder.deliver(Ok(cached_response("<p>late</p>"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
