//! Subscription grouping items that share one publish interval

use crate::item::Item;
use opcbridge_core::{DataValue, ProcessReason};
use opcbridge_transport::{
    MonitoredItemRequest, RevisedSubscriptionParameters, StructureResolver,
    SubscriptionParameters, TransportDriver,
};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Group of monitored items sharing one publishing interval
///
/// The subscription owns the locally assigned stable client handles of its
/// items (the position in its item list) and dispatches change
/// notifications by that handle.
pub struct Subscription {
    name: String,
    session_name: String,
    requested: Mutex<SubscriptionParameters>,
    /// Server-side handle; `None` after teardown, recreated on demand
    revised: Mutex<Option<RevisedSubscriptionParameters>>,
    items: Mutex<Vec<Arc<Item>>>,
}

impl Subscription {
    pub fn new(
        name: impl Into<String>,
        session_name: impl Into<String>,
        publishing_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            session_name: session_name.into(),
            requested: Mutex::new(SubscriptionParameters {
                publishing_interval,
                lifetime_count: 1200,
                priority: 0,
            }),
            revised: Mutex::new(None),
            items: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach an item; its client handle is the position in the list,
    /// fixed for the item's lifetime
    pub fn add_item(&self, item: Arc<Item>) {
        self.items.lock().unwrap().push(item);
    }

    pub fn item_count(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Set a runtime-tunable option; unknown options are logged and
    /// ignored
    pub fn set_option(&self, name: &str, value: &str) {
        match name {
            "priority" => match value.parse::<u8>() {
                Ok(priority) => self.requested.lock().unwrap().priority = priority,
                Err(_) => log::error!(
                    "subscription {}: option 'priority' value out of range - ignored",
                    self.name
                ),
            },
            "publishing-interval" => match value.parse::<u64>() {
                Ok(millis) => {
                    self.requested.lock().unwrap().publishing_interval =
                        Duration::from_millis(millis)
                }
                Err(_) => log::error!(
                    "subscription {}: invalid 'publishing-interval' value - ignored",
                    self.name
                ),
            },
            _ => log::error!(
                "subscription {}: unknown option '{}' - ignored",
                self.name,
                name
            ),
        }
    }

    /// Create the server-side subscription
    ///
    /// Idempotent: an existing handle is kept, a torn-down one is simply
    /// recreated.
    pub async fn create(&self, driver: &dyn TransportDriver) {
        if self.revised.lock().unwrap().is_some() {
            return;
        }
        let requested = self.requested.lock().unwrap().clone();
        match driver.create_subscription(requested).await {
            Ok(revised) => {
                log::debug!(
                    "subscription {}@{} created (id {}, publishing interval {:?})",
                    self.name,
                    self.session_name,
                    revised.subscription_id,
                    revised.revised_publishing_interval
                );
                *self.revised.lock().unwrap() = Some(revised);
            }
            Err(e) => {
                log::error!(
                    "subscription {}@{}: create subscription failed ({})",
                    self.name,
                    self.session_name,
                    e
                );
            }
        }
    }

    /// Bulk-create the server-side monitored items
    ///
    /// Records the server-revised sampling interval and queue size per
    /// item (the last revision is authoritative) and raises a
    /// connection-loss event for any item whose creation failed.
    pub async fn add_monitored_items(&self, driver: &dyn TransportDriver) {
        let items = self.items.lock().unwrap().clone();
        if items.is_empty() {
            return;
        }
        let Some(subscription_id) = self
            .revised
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| r.subscription_id)
        else {
            log::error!(
                "subscription {}@{}: cannot add monitored items without a server handle",
                self.name,
                self.session_name
            );
            return;
        };

        let requests: Vec<MonitoredItemRequest> = items
            .iter()
            .enumerate()
            .map(|(handle, item)| MonitoredItemRequest {
                node_id: item.node_id(),
                client_handle: handle as u32,
                sampling_interval: item.config().sampling_interval,
                queue_size: item.config().queue_size,
                discard_oldest: item.config().discard_oldest,
            })
            .collect();

        match driver.create_monitored_items(subscription_id, requests).await {
            Ok(results) => {
                log::debug!(
                    "subscription {}@{}: created {} monitored item(s)",
                    self.name,
                    self.session_name,
                    results.len()
                );
                for (item, result) in items.iter().zip(results) {
                    if result.status.is_good() {
                        item.set_revised_parameters(
                            result.revised_sampling_interval,
                            result.revised_queue_size,
                        );
                    } else {
                        log::error!(
                            "subscription {}@{}: monitored item {} failed with {}",
                            self.name,
                            self.session_name,
                            item.node_id(),
                            result.status
                        );
                        item.set_incoming_event(ProcessReason::ConnectionLoss, result.status);
                    }
                }
            }
            Err(e) => {
                log::error!(
                    "subscription {}@{}: create monitored items failed ({})",
                    self.name,
                    self.session_name,
                    e
                );
            }
        }
    }

    /// Detach the server-side handle (connection loss)
    pub fn clear(&self) {
        *self.revised.lock().unwrap() = None;
    }

    /// Dispatch change notifications to the target items by client handle
    pub fn data_change(
        &self,
        notifications: Vec<(u32, DataValue)>,
        resolver: &dyn StructureResolver,
    ) {
        let items = self.items.lock().unwrap().clone();
        for (client_handle, value) in notifications {
            match items.get(client_handle as usize) {
                Some(item) => {
                    if value.status.is_bad() {
                        item.set_incoming_event(ProcessReason::ReadFailure, value.status);
                    } else {
                        item.set_incoming_data(value, ProcessReason::IncomingData, resolver);
                    }
                }
                None => log::warn!(
                    "subscription {}@{}: data change for unknown client handle {} - ignored",
                    self.name,
                    self.session_name,
                    client_handle
                ),
            }
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let requested = self.requested.lock().unwrap();
        let revised = self.revised.lock().unwrap();
        write!(
            f,
            "subscription={} session={} interval={:?}({:?}) prio={} items={}",
            self.name,
            self.session_name,
            revised.as_ref().map(|r| r.revised_publishing_interval),
            requested.publishing_interval,
            requested.priority,
            self.items.lock().unwrap().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::ValueConsumer;
    use opcbridge_core::{Identifier, ItemConfig, NodeId, StatusCode, Variant};

    struct NullConsumer;

    impl ValueConsumer for NullConsumer {
        fn notify(&self, _reason: ProcessReason) {}
    }

    struct NullResolver;

    impl StructureResolver for NullResolver {
        fn structure_definition(
            &self,
            _type_id: &NodeId,
        ) -> Option<opcbridge_core::StructureDefinition> {
            None
        }
    }

    fn item(id: u32) -> Arc<Item> {
        let item = Item::new(ItemConfig {
            identifier: Identifier::Numeric(id),
            subscription: Some("sub".into()),
            ..ItemConfig::default()
        });
        item.add_leaf(&[], Arc::new(NullConsumer)).unwrap();
        item
    }

    #[test]
    fn test_data_change_dispatch_by_handle() {
        let subscription = Subscription::new("sub", "plc", Duration::from_millis(100));
        let first = item(1);
        let second = item(2);
        subscription.add_item(first.clone());
        subscription.add_item(second.clone());

        subscription.data_change(
            vec![(1, DataValue::new(Variant::Int32(7), 1000))],
            &NullResolver,
        );
        assert_eq!(second.last_reason(), ProcessReason::IncomingData);
        assert_eq!(first.last_reason(), ProcessReason::None);
    }

    #[test]
    fn test_unknown_handle_is_dropped() {
        let subscription = Subscription::new("sub", "plc", Duration::from_millis(100));
        subscription.add_item(item(1));
        // Must not panic.
        subscription.data_change(
            vec![(99, DataValue::new(Variant::Int32(7), 1000))],
            &NullResolver,
        );
    }

    #[test]
    fn test_bad_status_notification_is_failure_event() {
        let subscription = Subscription::new("sub", "plc", Duration::from_millis(100));
        let it = item(1);
        subscription.add_item(it.clone());
        subscription.data_change(
            vec![(0, DataValue::from_status(StatusCode::BAD, 1000))],
            &NullResolver,
        );
        assert_eq!(it.last_reason(), ProcessReason::ReadFailure);
        assert_eq!(it.last_status(), StatusCode::BAD);
    }
}
