//! Observable Values
//!
//! Published device values using `tokio::sync::watch` for multi-subscriber
//! notifications. The pattern throughput is exposed this way: the producer
//! publishes, everyone else reads or waits for changes.
//!
//! # Example
//!
//! ```rust,ignore
//! let rate = Observable::new("throughput", 0.0).with_units("Hz");
//!
//! let mut rx = rate.subscribe();
//! tokio::spawn(async move {
//!     while rx.changed().await.is_ok() {
//!         println!("throughput: {} Hz", *rx.borrow());
//!     }
//! });
//!
//! rate.publish(12.5);
//! ```

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
struct ObservableMetadata {
    name: String,
    /// Physical units (e.g., "Hz").
    units: Option<String>,
}

/// A thread-safe, observable value with change notifications.
///
/// Clones share the same watch channel and metadata.
pub struct Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    sender: watch::Sender<T>,
    metadata: Arc<RwLock<ObservableMetadata>>,
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("metadata", &*self.metadata.read())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new observable with an initial value.
    pub fn new(name: impl Into<String>, initial_value: T) -> Self {
        let (sender, _) = watch::channel(initial_value);
        Self {
            sender,
            metadata: Arc::new(RwLock::new(ObservableMetadata {
                name: name.into(),
                units: None,
            })),
        }
    }

    /// Add units to this observable.
    pub fn with_units(self, units: impl Into<String>) -> Self {
        self.metadata.write().units = Some(units.into());
        self
    }

    /// Get the current value (clone).
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Get the value name.
    pub fn name(&self) -> String {
        self.metadata.read().name.clone()
    }

    /// Get the units, empty when none were set.
    pub fn units(&self) -> String {
        self.metadata.read().units.clone().unwrap_or_default()
    }

    /// Publish a new value, notifying subscribers.
    pub fn publish(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Subscribe to value changes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}
