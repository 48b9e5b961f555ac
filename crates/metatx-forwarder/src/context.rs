//! Originator recovery for services that accept delegated calls.
//!
//! A trusted forwarder appends the 20-byte originator address to the payload
//! it forwards. A service trusting exactly that forwarder reads the suffix as
//! the caller; any other caller is taken at face value.

use alloy_primitives::{Address, Bytes};

use crate::Message;

const ADDRESS_LENGTH: usize = 20;

/// Append `from` to `data` the way a forwarder encodes the originator.
pub fn append_sender(data: &[u8], from: Address) -> Bytes {
    let mut out = Vec::with_capacity(data.len() + ADDRESS_LENGTH);
    out.extend_from_slice(data);
    out.extend_from_slice(from.as_slice());
    Bytes::from(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedForwarderContext {
    trusted_forwarder: Address,
}

impl TrustedForwarderContext {
    pub fn new(trusted_forwarder: Address) -> Self {
        Self { trusted_forwarder }
    }

    pub fn trusted_forwarder(&self) -> Address {
        self.trusted_forwarder
    }

    pub fn is_trusted_forwarder(&self, address: Address) -> bool {
        address == self.trusted_forwarder
    }

    fn is_delegated(&self, message: &Message) -> bool {
        self.is_trusted_forwarder(message.caller) && message.data.len() >= ADDRESS_LENGTH
    }

    /// The originator: the appended suffix on the trusted path, else the caller.
    pub fn msg_sender(&self, message: &Message) -> Address {
        if self.is_delegated(message) {
            let split = message.data.len() - ADDRESS_LENGTH;
            Address::from_slice(&message.data[split..])
        } else {
            message.caller
        }
    }

    /// The payload without the originator suffix.
    pub fn msg_data<'a>(&self, message: &'a Message) -> &'a [u8] {
        if self.is_delegated(message) {
            &message.data[..message.data.len() - ADDRESS_LENGTH]
        } else {
            &message.data
        }
    }
}
