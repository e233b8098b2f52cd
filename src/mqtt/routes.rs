use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::connection::MessageHandler;
use super::topic::topic_matches;

struct Route {
    filter: String,
    handler: Arc<dyn MessageHandler>,
}

/// Subscription filters and the handlers they feed.
///
/// At most one handler per filter. A topic can match several filters, in
/// which case every matching handler gets the message.
#[derive(Default)]
pub(crate) struct Routes {
    routes: RwLock<Vec<Route>>,
}

impl Routes {
    /// Returns the handler previously registered for `filter`, if any.
    pub(crate) fn insert(
        &self,
        filter: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Option<Arc<dyn MessageHandler>> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let previous = routes
            .iter()
            .position(|r| r.filter == filter)
            .map(|i| routes.remove(i).handler);
        routes.push(Route {
            filter: filter.to_string(),
            handler,
        });
        previous
    }

    pub(crate) fn remove(&self, filter: &str) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let before = routes.len();
        routes.retain(|r| r.filter != filter);
        routes.len() != before
    }

    /// Undo an [`Routes::insert`]: put back `previous`, or drop the filter
    /// when there was none.
    pub(crate) fn restore(&self, filter: &str, previous: Option<Arc<dyn MessageHandler>>) {
        match previous {
            Some(handler) => {
                self.insert(filter, handler);
            }
            None => {
                self.remove(filter);
            }
        }
    }

    pub(crate) fn filters(&self) -> Vec<String> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.filter.clone())
            .collect()
    }

    pub(crate) fn matching(&self, topic: &str) -> Vec<Arc<dyn MessageHandler>> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| topic_matches(&r.filter, topic))
            .map(|r| r.handler.clone())
            .collect()
    }

    /// Hand the message to every matching handler, each on its own task.
    /// Returns the number of tasks started.
    pub(crate) fn dispatch<P>(&self, topic: &str, payload: P) -> usize
    where
        P: AsRef<[u8]> + Clone + Send + 'static,
    {
        let handlers = self.matching(topic);
        if handlers.is_empty() {
            debug!(topic = %topic, "no handler for inbound message");
            return 0;
        }

        let started = handlers.len();
        for handler in handlers {
            let topic = topic.to_string();
            let payload = payload.clone();
            tokio::spawn(async move {
                handler.handle(&topic, payload.as_ref()).await;
            });
        }
        started
    }

    /// Re-issue every filter through `subscribe`. Failures are logged and
    /// the remaining filters are still attempted.
    pub(crate) fn resubscribe<F, E>(&self, mut subscribe: F) -> usize
    where
        F: FnMut(&str) -> Result<(), E>,
        E: std::fmt::Display,
    {
        let mut issued = 0;
        for filter in self.filters() {
            match subscribe(&filter) {
                Ok(()) => {
                    info!(filter = %filter, "subscribed");
                    issued += 1;
                }
                Err(e) => warn!(filter = %filter, error = %e, "failed to re-issue subscription"),
            }
        }
        issued
    }
}
