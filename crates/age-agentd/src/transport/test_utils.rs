//! Test helpers for the transport module.

use std::io::Read;
use std::os::unix::net::UnixStream;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use super::ConnectionHandler;

pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub(crate) fn new() -> (Arc<AtomicUsize>, Arc<Self>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            count: Arc::clone(&count),
        });
        (count, handler)
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, _stream: UnixStream) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Keeps each connection open until the peer closes it.
pub(crate) struct HoldingHandler;

impl ConnectionHandler for HoldingHandler {
    fn handle(&self, mut stream: UnixStream) {
        let mut sink = Vec::new();
        drop(stream.read_to_end(&mut sink));
    }
}
