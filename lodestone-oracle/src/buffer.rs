use crate::observation::ProviderEvent;
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};

/// Default capacity of a per-provider observation ring buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Create a bounded single-producer single-consumer observation ring.
///
/// The producer half lives with one provider runtime, the consumer half with
/// the aggregator. When the ring is full the oldest event is overwritten -
/// the aggregator only ever wants the most recent observation per
/// `(provider, ticker)`, so shedding old events under backpressure is the
/// correct policy.
pub fn observation_channel(capacity: usize) -> (ObservationTx, ObservationRx) {
    let shared = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
    (
        ObservationTx {
            shared: Arc::clone(&shared),
            capacity,
        },
        ObservationRx { shared },
    )
}

/// Producer half of an observation ring. Owned by exactly one provider
/// runtime; lock scopes are synchronous and bounded.
#[derive(Debug, Clone)]
pub struct ObservationTx {
    shared: Arc<Mutex<VecDeque<ProviderEvent>>>,
    capacity: usize,
}

impl ObservationTx {
    pub fn push(&self, event: ProviderEvent) {
        let mut ring = self.shared.lock();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(event);
    }
}

/// Consumer half of an observation ring. Owned by the aggregator.
#[derive(Debug)]
pub struct ObservationRx {
    shared: Arc<Mutex<VecDeque<ProviderEvent>>>,
}

impl ObservationRx {
    /// Drain every buffered event, preserving per-provider production order.
    pub fn drain(&self) -> Vec<ProviderEvent> {
        self.shared.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::PriceObservation;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    fn price_event(price: i64) -> ProviderEvent {
        ProviderEvent::Price(PriceObservation {
            provider: "okx_ws".to_string(),
            pair: "BTC/USD".parse().unwrap(),
            price: Decimal::from(price),
            observed_at: DateTime::<Utc>::MIN_UTC,
        })
    }

    #[test]
    fn test_ring_preserves_order() {
        let (tx, rx) = observation_channel(8);
        tx.push(price_event(1));
        tx.push(price_event(2));
        tx.push(price_event(3));

        let drained = rx.drain();
        assert_eq!(
            drained,
            vec![price_event(1), price_event(2), price_event(3)]
        );
    }

    #[test]
    fn test_ring_sheds_oldest_when_full() {
        let (tx, rx) = observation_channel(2);
        tx.push(price_event(1));
        tx.push(price_event(2));
        tx.push(price_event(3));

        let prices = rx
            .drain()
            .into_iter()
            .map(|event| match event {
                ProviderEvent::Price(p) => p.price,
                ProviderEvent::Error(_) => unreachable!(),
            })
            .collect::<Vec<_>>();
        assert_eq!(prices, vec![Decimal::from(2), Decimal::from(3)]);
    }

    #[test]
    fn test_drain_empties_the_ring() {
        let (tx, rx) = observation_channel(4);
        tx.push(price_event(1));
        assert_eq!(rx.drain().len(), 1);
        assert!(rx.drain().is_empty());
    }
}
