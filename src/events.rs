//! Region event publish/subscribe
//!
//! Load/unload completions fan out to any number of subscribers over a
//! broadcast channel. Dropping an [`EventSubscription`] unsubscribes it.
//!
//! A subscriber that falls behind the channel capacity receives a single
//! [`RegionEvent::Lagged`] in place of the events it lost and must resync
//! from the lifecycle manager's state.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::warn;

/// Region lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionEvent {
    /// Region finished loading
    LoadCompleted {
        /// Region name
        region: String,
    },
    /// Region finished unloading
    UnloadCompleted {
        /// Region name
        region: String,
    },
    /// Core region health check failed; the process is terminating
    CoreRegionFailure {
        /// Core region name
        region: String,
        /// Failed check
        reason: String,
    },
    /// Subscriber fell behind and missed events
    Lagged {
        /// Number of events dropped for this subscriber
        skipped: u64,
    },
}

impl RegionEvent {
    /// Get the event type as string
    pub fn event_type(&self) -> &str {
        match self {
            RegionEvent::LoadCompleted { .. } => "LOAD_COMPLETED",
            RegionEvent::UnloadCompleted { .. } => "UNLOAD_COMPLETED",
            RegionEvent::CoreRegionFailure { .. } => "CORE_REGION_FAILURE",
            RegionEvent::Lagged { .. } => "LAGGED",
        }
    }

    /// Region the event refers to; `None` for [`RegionEvent::Lagged`]
    pub fn region(&self) -> Option<&str> {
        match self {
            RegionEvent::LoadCompleted { region }
            | RegionEvent::UnloadCompleted { region }
            | RegionEvent::CoreRegionFailure { region, .. } => Some(region),
            RegionEvent::Lagged { .. } => None,
        }
    }
}

/// Receiving end of the event bus
pub struct EventSubscription {
    rx: broadcast::Receiver<RegionEvent>,
}

impl EventSubscription {
    /// Receive the next event, or `None` once the bus is closed.
    ///
    /// Lost events are reported as one [`RegionEvent::Lagged`].
    pub async fn recv(&mut self) -> Option<RegionEvent> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Region event subscriber lagged");
                Some(RegionEvent::Lagged { skipped })
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<RegionEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Region event subscriber lagged");
                Some(RegionEvent::Lagged { skipped })
            }
            Err(_) => None,
        }
    }
}

/// Broadcast bus for region events
pub struct EventBus {
    tx: broadcast::Sender<RegionEvent>,
    published: AtomicU64,
}

impl EventBus {
    /// Create a new bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            published: AtomicU64::new(0),
        }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Publish an event to every current subscriber
    pub fn publish(&self, event: RegionEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total events published since creation
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_event_accessors() {
        let event = RegionEvent::LoadCompleted {
            region: "Pasture".to_string(),
        };
        assert_eq!(event.event_type(), "LOAD_COMPLETED");
        assert_eq!(event.region(), Some("Pasture"));
    }

    #[test]
    fn test_subscribe_and_drop() {
        let bus = EventBus::new(8);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish(RegionEvent::UnloadCompleted {
            region: "Pasture".to_string(),
        });
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn test_subscription_receives() {
        let bus = Arc::new(EventBus::new(8));
        let mut sub = bus.subscribe();

        let bus_clone = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            bus_clone.publish(RegionEvent::LoadCompleted {
                region: "Pasture".to_string(),
            });
        });

        let event = tokio::time::timeout(Duration::from_millis(500), sub.recv())
            .await
            .unwrap();
        assert_eq!(event.unwrap().region(), Some("Pasture"));
    }

    #[test]
    fn test_lagged_subscriber_is_told_what_it_missed() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for i in 0..5 {
            bus.publish(RegionEvent::LoadCompleted {
                region: format!("R{}", i),
            });
        }
        assert_eq!(bus.published_count(), 5);

        let lagged = sub.try_recv().unwrap();
        assert_eq!(lagged, RegionEvent::Lagged { skipped: 3 });
        assert_eq!(lagged.region(), None);
        assert_eq!(sub.try_recv().unwrap().region(), Some("R3"));
        assert_eq!(sub.try_recv().unwrap().region(), Some("R4"));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_async_recv_reports_lag() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for i in 0..4 {
            bus.publish(RegionEvent::UnloadCompleted {
                region: format!("R{}", i),
            });
        }

        assert_eq!(sub.recv().await, Some(RegionEvent::Lagged { skipped: 2 }));
        assert_eq!(sub.recv().await.unwrap().region(), Some("R2"));
    }
}
