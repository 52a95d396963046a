// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared helpers for the integration tests

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::time::{Duration, Instant};
use wisdom_rust::core::event::{AttributeValue, Event, EventData};
use wisdom_rust::core::stream::StreamCallback;
use wisdom_rust::core::{WisdomApp, WisdomConfig};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// App with the given input streams plus `OutputStream`
pub fn app_with_streams(name: &str, streams: &[&str]) -> WisdomApp {
    init_logging();
    let app = WisdomApp::new(WisdomConfig::new(name)).unwrap();
    for stream in streams {
        app.define_stream(stream).unwrap();
    }
    app.define_stream("OutputStream").unwrap();
    app
}

/// Stock tick stamped with `timestamp`
pub fn stock_at(timestamp: i64, symbol: &str, price: f64, volume: i64) -> Event {
    Event::new(timestamp)
        .attribute("symbol", symbol)
        .attribute("price", price)
        .attribute("volume", volume)
}

pub fn stock(symbol: &str, price: f64, volume: i64) -> Event {
    stock_at(0, symbol, price, volume)
}

pub fn symbol_is(symbol: &'static str) -> impl Fn(&Event) -> bool + Send + Sync + 'static {
    move |event| event.get_str("symbol") == Some(symbol)
}

/// Price strictly above the price captured under `key` (`e1.price`)
pub fn price_above(key: &'static str) -> impl Fn(&Event, &EventData) -> bool + Send + Sync + 'static {
    move |event, captured| {
        match (event.get_f64("price"), captured.get(key).and_then(AttributeValue::as_f64)) {
            (Some(price), Some(bound)) => price > bound,
            _ => false,
        }
    }
}

struct ChannelCallback {
    sender: Sender<Vec<Event>>,
}

impl StreamCallback for ChannelCallback {
    fn receive_events(&self, events: &[Event]) {
        let _ = self.sender.send(events.to_vec());
    }
}

/// Collects every delivery made to a stream callback
pub struct OutputCollector {
    receiver: Receiver<Vec<Event>>,
    received: Vec<Vec<Event>>,
}

impl OutputCollector {
    pub fn attach(app: &WisdomApp, stream_id: &str) -> Self {
        let (sender, receiver) = unbounded();
        app.add_callback(stream_id, ChannelCallback { sender }).unwrap();
        Self {
            receiver,
            received: Vec::new(),
        }
    }

    fn drain(&mut self) {
        self.received.extend(self.receiver.try_iter());
    }

    /// Deliveries so far, one entry per callback invocation
    pub fn batches(&mut self) -> Vec<Vec<Event>> {
        self.drain();
        self.received.clone()
    }

    pub fn events(&mut self) -> Vec<Event> {
        self.batches().into_iter().flatten().collect()
    }

    pub fn count(&mut self) -> usize {
        self.events().len()
    }

    /// Block until `expected` events arrived or `timeout` passed
    pub fn wait_for(&mut self, expected: usize, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let count = self.count();
            if count >= expected {
                return count;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return count;
            }
            if let Ok(batch) = self.receiver.recv_timeout(remaining) {
                self.received.push(batch);
            }
        }
    }

    /// Values of `attribute` over all collected events
    pub fn values(&mut self, attribute: &str) -> Vec<AttributeValue> {
        self.events()
            .iter()
            .map(|e| e.get(attribute).cloned().unwrap_or(AttributeValue::Null))
            .collect()
    }
}
