//! Bounded supply of events, filled by a background reader thread.
//!
//! The reader pulls events from an `EventSource` in batches, pausing while the
//! queue holds more than the low watermark and otherwise filling it towards
//! the high watermark (1.5 × low). Whenever the consumer finds the queue nearly
//! empty while the reader is still going, the low watermark grows by 25%, up
//! to a cap, so that a slow source gets a deeper buffer.
//!
//! Only the channel and the watermark counter are shared between the two
//! threads.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use tracing::{debug, info, warn};

use crate::utils::group_digits;

/// Pull interface to the upstream event parser
pub trait EventSource<E>: Send {
    /// `None` once the source is exhausted
    fn next_event(&mut self) -> Option<E>;
}

impl<E, I> EventSource<E> for I
where
    I: Iterator<Item = E> + Send,
{
    fn next_event(&mut self) -> Option<E> { self.next() }
}

/// Queue depth at or below which the consumer counts as starving
pub const STARVATION_LEVEL: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueSettings {
    pub low_watermark: usize,
    pub max_low_watermark: usize,
    pub batch_size: usize,
    pub reader_sleep: Duration,
    pub max_backoff: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            low_watermark: 100,
            max_low_watermark: 10_000,
            batch_size: 10,
            reader_sleep: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        }
    }
}

/// Queue-depth thresholds steering the reader
#[derive(Debug)]
pub struct Watermarks {
    low: AtomicUsize,
    max: usize,
}

impl Watermarks {

    pub fn new(initial: usize, max: usize) -> Self {
        let max = max.max(1);
        Self { low: AtomicUsize::new(initial.clamp(1, max)), max }
    }

    pub fn low (&self) -> usize { self.low.load(Ordering::Relaxed) }
    pub fn high(&self) -> usize { self.low() * 3 / 2 }
    pub fn max (&self) -> usize { self.max }

    /// Raise the low watermark by about 25%, but by at least one, without
    /// exceeding the cap. Returns the new value, or `None` if already capped.
    pub fn grow(&self) -> Option<usize> {
        let max = self.max;
        self.low
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |low| {
                let grown = (low + low / 4).max(low + 1).min(max);
                (grown > low).then_some(grown)
            })
            .ok()
            .map(|previous| (previous + previous / 4).max(previous + 1).min(max))
    }
}

pub struct EventSupplyQueue<E> {
    receiver: Receiver<E>,
    watermarks: Arc<Watermarks>,
    more: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<usize>>,
    max_backoff: Duration,
}

impl<E: Send + 'static> EventSupplyQueue<E> {

    /// Launch the reader thread on `source`
    pub fn start<S>(source: S, settings: QueueSettings) -> Self
    where
        S: EventSource<E> + 'static,
    {
        let watermarks = Arc::new(Watermarks::new(settings.low_watermark, settings.max_low_watermark));
        let batch_size = settings.batch_size.max(1);
        // Room for the highest possible fill plus one batch: sends never block
        let capacity = watermarks.max() * 3 / 2 + batch_size;
        let (sender, receiver) = bounded(capacity);
        let more = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(AtomicBool::new(false));

        let reader = Reader {
            sender,
            watermarks: Arc::clone(&watermarks),
            more: Arc::clone(&more),
            stop: Arc::clone(&stop),
            batch_size,
            sleep: settings.reader_sleep,
        };
        let handle = thread::spawn(move || reader.run(source));

        Self { receiver, watermarks, more, stop, reader: Some(handle), max_backoff: settings.max_backoff }
    }

    /// The next event in production order, or `None` at the end of the
    /// stream. Waits, with bounded exponential backoff, while the queue is
    /// empty but the reader has not finished.
    pub fn pop(&self) -> Option<E> {
        let mut backoff = Duration::from_millis(1).min(self.max_backoff);
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    self.observe_depth();
                    return Some(event)
                }
                Err(TryRecvError::Disconnected) => return None,
                Err(TryRecvError::Empty) => {
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(self.max_backoff);
                }
            }
        }
    }

    fn observe_depth(&self) {
        if self.more.load(Ordering::Relaxed) && self.receiver.len() <= STARVATION_LEVEL {
            if let Some(low) = self.watermarks.grow() {
                debug!("event queue starving: low watermark raised to {low}");
            }
        }
    }

    pub fn len(&self) -> usize { self.receiver.len() }
    pub fn is_empty(&self) -> bool { self.receiver.is_empty() }

    /// Whether the reader may still deliver events
    pub fn more_events(&self) -> bool { self.more.load(Ordering::Relaxed) }

    pub fn watermarks(&self) -> &Watermarks { &self.watermarks }

    /// Ask the reader to finish at its next batch boundary and wait for it.
    /// Events already queued can still be popped. Returns the number of
    /// events the reader delivered.
    pub fn stop(&mut self) -> usize {
        self.stop.store(true, Ordering::Relaxed);
        match self.reader.take().map(JoinHandle::join) {
            Some(Ok(n))  => n,
            Some(Err(_)) => { warn!("event reader panicked"); 0 }
            None         => 0,
        }
    }
}

impl<E> Drop for EventSupplyQueue<E> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

struct Reader<E> {
    sender: Sender<E>,
    watermarks: Arc<Watermarks>,
    more: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    batch_size: usize,
    sleep: Duration,
}

impl<E> Reader<E> {

    fn run<S: EventSource<E>>(self, mut source: S) -> usize {
        info!("event reader started");
        let mut delivered = 0;
        let mut exhausted = false;
        'reading: while !self.stop.load(Ordering::Relaxed) {
            if self.sender.len() > self.watermarks.low() {
                thread::sleep(self.sleep);
                continue;
            }
            while self.sender.len() < self.watermarks.high() {
                for _ in 0..self.batch_size {
                    let Some(event) = source.next_event() else {
                        exhausted = true;
                        break 'reading;
                    };
                    // Consumer gone: nobody left to read for
                    if self.sender.send(event).is_err() { break 'reading }
                    delivered += 1;
                }
                if self.stop.load(Ordering::Relaxed) { break 'reading }
            }
        }
        self.more.store(false, Ordering::Relaxed);
        if exhausted {
            info!("event source exhausted after {} events", group_digits(delivered));
        } else {
            info!("event reader stopped after {} events", group_digits(delivered));
        }
        // The sender is dropped on return, which ends the stream for the consumer
        delivered
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn settings(low: usize, max: usize) -> QueueSettings {
        QueueSettings {
            low_watermark: low,
            max_low_watermark: max,
            batch_size: 3,
            reader_sleep: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    #[test]
    fn delivers_exactly_the_source_in_order() {
        let queue = EventSupplyQueue::start(0..1000_usize, settings(20, 200));
        let received: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(received, (0..1000).collect::<Vec<_>>());
        assert_eq!(queue.pop(), None);
        assert!(!queue.more_events());
    }

    #[test]
    fn empty_source_ends_immediately() {
        let queue = EventSupplyQueue::start(std::iter::empty::<u8>(), QueueSettings::default());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn slow_reader_raises_low_watermark_to_cap() {
        let slow = (0..60_usize).map(|i| { thread::sleep(Duration::from_millis(1)); i });
        let queue = EventSupplyQueue::start(slow, settings(4, 40));
        let mut lows = vec![queue.watermarks().low()];
        let mut received = vec![];
        while let Some(event) = queue.pop() {
            received.push(event);
            lows.push(queue.watermarks().low());
        }
        assert_eq!(received, (0..60).collect::<Vec<_>>());
        assert!(lows.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*lows.last().unwrap(), 40);
    }

    #[test]
    fn watermark_growth_is_strict_until_capped() {
        let w = Watermarks::new(1, 10);
        let mut seen = vec![w.low()];
        while let Some(low) = w.grow() { seen.push(low) }
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6, 7, 8, 10]);
        assert_eq!(w.low(), 10);
        assert_eq!(w.high(), 15);
    }

    #[test]
    fn stop_ends_an_endless_source() {
        let mut queue = EventSupplyQueue::start(0.., settings(10, 10));
        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), Some(1));
        let delivered = queue.stop();
        assert!(delivered >= 2);
        // Whatever was queued before stopping is still delivered, in order
        let rest: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(rest, (2..delivered).collect::<Vec<_>>());
    }
}
