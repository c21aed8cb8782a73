//! Notification fan-out with per-subscriber subtree filters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use super::subtree::{matches, validate};
use crate::error::FilterError;
use crate::tree::Node;

struct Subscriber {
    id: u64,
    filter: Option<Node>,
    tx: mpsc::UnboundedSender<Node>,
}

/// Delivers notifications to every subscriber whose filter selects
/// something in them.
#[derive(Default)]
pub struct NotificationPublisher {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl NotificationPublisher {
    /// Create a publisher with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscriber. `None` receives every notification.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] if the filter is invalid.
    pub fn subscribe(&self, filter: Option<Node>) -> Result<Subscription, FilterError> {
        if let Some(filter) = &filter {
            validate(filter)?;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(Subscriber { id, filter, tx });
        tracing::debug!("Subscriber {} registered", id);
        Ok(Subscription { id, rx })
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Deliver a notification; returns the number of subscribers reached.
    ///
    /// Subscribers whose [`Subscription`] was dropped are removed.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] from filter evaluation. No subscriber is
    /// notified in that case.
    pub fn publish(&self, notification: &Node) -> Result<usize, FilterError> {
        let mut subscribers = self.lock();
        subscribers.retain(|s| !s.tx.is_closed());

        let mut targets = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers.iter() {
            let selected = match &subscriber.filter {
                None => true,
                Some(filter) => matches(notification, filter)?,
            };
            if selected {
                targets.push(subscriber.id);
            }
        }

        let mut delivered = 0;
        subscribers.retain(|s| {
            if !targets.contains(&s.id) {
                return true;
            }
            match s.tx.send(notification.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });

        tracing::trace!(
            "Notification <{}> delivered to {} subscribers",
            notification.local_name(),
            delivered
        );
        Ok(delivered)
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }
}

impl std::fmt::Debug for NotificationPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationPublisher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Node>,
}

impl Subscription {
    /// Subscriber id, for [`NotificationPublisher::unsubscribe`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next notification. `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<Node> {
        self.rx.recv().await
    }

    /// Take a notification if one is ready.
    pub fn try_recv(&mut self) -> Option<Node> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::XmlCodec;

    fn event(kind: &str, interface: &str) -> Node {
        XmlCodec::from_xml_str(&format!(
            r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0">
                 <eventTime>2024-05-01T10:00:00Z</eventTime>
                 <{kind} xmlns="urn:example:if"><name>{interface}</name></{kind}>
               </notification>"#
        ))
        .unwrap()
    }

    fn filter(xml: &str) -> Node {
        XmlCodec::from_xml_str(xml).unwrap()
    }

    #[tokio::test]
    async fn test_filtered_delivery() {
        let publisher = NotificationPublisher::new();
        let mut all = publisher.subscribe(None).unwrap();
        let mut eth0 = publisher
            .subscribe(Some(filter("<filter><link-down><name>eth0</name></link-down></filter>")))
            .unwrap();

        assert_eq!(publisher.publish(&event("link-down", "eth0")).unwrap(), 2);
        assert_eq!(publisher.publish(&event("link-down", "eth1")).unwrap(), 1);

        assert_eq!(eth0.recv().await.unwrap(), event("link-down", "eth0"));
        assert!(eth0.try_recv().is_none());

        assert!(all.try_recv().is_some());
        assert!(all.try_recv().is_some());
    }

    #[test]
    fn test_dropped_subscription_removed() {
        let publisher = NotificationPublisher::new();
        let kept = publisher.subscribe(None).unwrap();
        drop(publisher.subscribe(None).unwrap());

        assert_eq!(publisher.publish(&event("link-up", "eth0")).unwrap(), 1);
        assert_eq!(publisher.subscriber_count(), 1);
        drop(kept);
    }

    #[test]
    fn test_unsubscribe() {
        let publisher = NotificationPublisher::new();
        let mut sub = publisher.subscribe(None).unwrap();

        assert!(publisher.unsubscribe(sub.id()));
        assert!(!publisher.unsubscribe(sub.id()));
        assert_eq!(publisher.publish(&event("link-up", "eth0")).unwrap(), 0);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let publisher = NotificationPublisher::new();
        let err = publisher.subscribe(Some(filter("<filter>text</filter>"))).unwrap_err();
        assert!(matches!(err, FilterError::TextOnFilterRoot(_)));
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
