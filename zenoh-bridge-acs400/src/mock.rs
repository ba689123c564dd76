//! In-memory register transport.
//!
//! Used by the test suites to script register values and failures and to
//! inspect which wire addresses were read or written. Clones share state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::transport::{RegisterTransport, TransportError};

#[derive(Debug, Default)]
struct MockState {
    registers: HashMap<u16, u16>,
    failures: HashMap<u16, TransportError>,
    reads: Vec<u16>,
    writes: Vec<(u16, u16)>,
}

/// Scripted transport keyed by 0-based wire address.
///
/// Unscripted addresses answer with an illegal-data-address exception, like a
/// drive asked for a parameter it does not have.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value held at a 1-based device address.
    pub fn with_register(self, address: u16, value: u16) -> Self {
        self.set_register(address, value);
        self
    }

    /// Make every access to a 1-based device address fail.
    pub fn with_failure(self, address: u16, error: TransportError) -> Self {
        self.state.lock().failures.insert(address - 1, error);
        self
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.state.lock().registers.insert(address - 1, value);
    }

    /// Value currently held at a 1-based device address.
    pub fn register(&self, address: u16) -> Option<u16> {
        self.state.lock().registers.get(&(address - 1)).copied()
    }

    /// 0-based wire addresses read so far, in order.
    pub fn reads(&self) -> Vec<u16> {
        self.state.lock().reads.clone()
    }

    /// `(wire address, value)` writes so far, in order.
    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.state.lock().writes.clone()
    }
}

#[async_trait]
impl RegisterTransport for MockTransport {
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let mut state = self.state.lock();
        let mut words = Vec::with_capacity(count as usize);
        for offset in 0..count {
            let wire = address + offset;
            state.reads.push(wire);
            if let Some(error) = state.failures.get(&wire) {
                return Err(error.clone());
            }
            match state.registers.get(&wire) {
                Some(word) => words.push(*word),
                None => {
                    return Err(TransportError::Exception(
                        "IllegalDataAddress".to_string(),
                    ));
                }
            }
        }
        Ok(words)
    }

    async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if let Some(error) = state.failures.get(&address) {
            return Err(error.clone());
        }
        state.writes.push((address, value));
        state.registers.insert(address, value);
        Ok(())
    }
}
