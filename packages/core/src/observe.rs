//! Push-delivery seam between the notification dispatcher and subscribers.

use crate::{Error, Response};

/// Receives observe push notifications for one registration.
///
/// The server side holds these as trait objects in a node's observer
/// registry; the client side implements the trait on its shared completion
/// state so a push completes the subscriber's standing request.
///
/// # Object Safety
///
/// This trait is object-safe: registries store `Arc<dyn PushSink>`.
pub trait PushSink: Send + Sync {
    /// Deliver one push notification.
    ///
    /// An `Err` counts as a transport-level delivery failure; after the
    /// dispatcher's retry budget is exhausted the registration is evicted.
    fn push(&self, response: Response) -> Result<(), Error>;
}

impl<F> PushSink for F
where
    F: Fn(Response) -> Result<(), Error> + Send + Sync,
{
    fn push(&self, response: Response) -> Result<(), Error> {
        self(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn closures_are_sinks() {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&count);
        let sink: Arc<dyn PushSink> = Arc::new(move |_rsp: Response| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        sink.push(Response::content("x")).unwrap();
        sink.push(Response::content("y")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
