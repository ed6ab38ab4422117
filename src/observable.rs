use tokio::sync::watch;

/// A single value that interested parties can watch for changes.
///
/// Built on [`tokio::sync::watch`], so it has most-recent-wins semantics: a
/// subscriber that falls behind sees only the latest value, never a backlog.
/// Setting never blocks and never fails, whether or not anyone is watching.
///
/// One producer writes each value; any number of tasks or threads may read
/// or subscribe. Delivery happens wherever the subscriber awaits its
/// receiver, so marshalling onto a UI thread is the subscriber's job.
#[derive(Debug)]
pub struct ObservableValue<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> ObservableValue<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Current value, cloned out.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Publishes a new value unconditionally.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// A receiver that yields on every subsequent publish.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone + PartialEq> ObservableValue<T> {
    /// Publishes only if the value actually changed.
    pub fn set_if_changed(&self, value: T) {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_subscriber_sees_only_latest_value() {
        let value = ObservableValue::new(0);
        let mut rx = value.subscribe();

        value.set(1);
        value.set(2);
        value.set(3);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 3);
        assert_eq!(value.get(), 3);
    }

    #[test]
    fn set_without_subscribers_does_not_fail() {
        let value = ObservableValue::new("a".to_string());
        value.set("b".to_string());
        assert_eq!(value.get(), "b");
    }

    #[tokio::test]
    async fn set_if_changed_skips_equal_values() {
        let value = ObservableValue::new(42u8);
        let mut rx = value.subscribe();
        rx.borrow_and_update();

        value.set_if_changed(42);
        assert!(!rx.has_changed().unwrap());

        value.set_if_changed(87);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 87);
    }
}
