//! Shared setup for integration tests.

use std::sync::Arc;

use parking_lot::Mutex;
use slirc_client::{CallbackEventBus, ChannelOutputQueue, Engine, EngineConfig, Event};

pub struct TestClient {
    pub engine: Engine,
    pub output: Arc<ChannelOutputQueue>,
    pub events: Arc<Mutex<Vec<Event>>>,
}

impl TestClient {
    pub fn new(nick: &str) -> Self {
        let bus = Arc::new(CallbackEventBus::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bus.subscribe(move |env| sink.lock().push(env.event.clone()));
        let output = Arc::new(ChannelOutputQueue::new());
        let engine = Engine::new(EngineConfig::with_nickname(nick), bus, output.clone())
            .expect("default handlers");
        engine.connecting();
        engine.on_open();
        TestClient {
            engine,
            output,
            events,
        }
    }

    pub fn feed(&self, lines: &[&str]) {
        for line in lines {
            self.engine.process_line(line.as_bytes());
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.output.drain()
    }

    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    #[allow(dead_code)]
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}
