//! The frame model: an opcode-tagged record with a borrowed-or-owned
//! payload view, plus the `fin`/reserved-bit flags the wire format needs.
//!
//! Frame invariants (control frame length, continuation ordering) are not
//! validated here; they're preconditions checked by the caller.

use std::sync::Arc;

use rand::{thread_rng, Rng};

/// Generates a fresh client-side mask key.
pub fn generate_mask_key() -> [u8; 4] {
    let mut key = [0u8; 4];
    thread_rng().fill_bytes(&mut key);
    key
}

/// The WebSocket opcode, used by the submit queue for priority scheduling
/// and by the generator for header encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// An opcode outside the six defined above, carried through unchanged.
    Reserved(u8),
}

impl OpCode {
    /// True for the three control opcodes (`Close`, `Ping`, `Pong`).
    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// The 4-bit wire opcode value.
    pub fn code(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::Reserved(x) => x & 0x0F,
        }
    }

    /// Decodes a 4-bit wire opcode value.
    pub fn from_code(code: u8) -> OpCode {
        match code & 0x0F {
            0x0 => OpCode::Continuation,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            x => OpCode::Reserved(x),
        }
    }
}

/// A frame payload. Submitted frames own their bytes (via a reference
/// counted buffer) so they stay valid until the submission's callback
/// fires, without requiring the flusher to copy them up front.
#[derive(Debug, Clone)]
pub struct Payload(Arc<[u8]>);

impl Payload {
    /// An empty payload, used for control frames and the flush sentinel.
    pub fn empty() -> Payload {
        Payload(Arc::from(Vec::new().into_boxed_slice()))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Payload {
        Payload(Arc::from(data.into_boxed_slice()))
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Payload {
        Payload(Arc::from(data))
    }
}

impl From<Arc<[u8]>> for Payload {
    fn from(data: Arc<[u8]>) -> Payload {
        Payload(data)
    }
}

/// A single outbound WebSocket frame.
///
/// Masking of the payload bytes, if the caller's deployment needs it
/// (clients writing to a server, per RFC 6455), is the caller's
/// responsibility before the frame is submitted: the flusher never XORs
/// payload bytes. `mask` only controls whether the generator writes a
/// mask key into the header and sets the mask bit, matching the `fin=true`
/// by convention (this flusher never fragments).
#[derive(Debug, Clone)]
pub struct Frame {
    pub opcode: OpCode,
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub mask: Option<[u8; 4]>,
    pub payload: Payload,
}

impl Frame {
    /// Constructs a plain, unfragmented, unmasked frame.
    pub fn new(opcode: OpCode, payload: Payload) -> Frame {
        Frame {
            opcode,
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            mask: None,
            payload,
        }
    }

    pub fn text(data: impl Into<Payload>) -> Frame {
        Frame::new(OpCode::Text, data.into())
    }

    pub fn binary(data: impl Into<Payload>) -> Frame {
        Frame::new(OpCode::Binary, data.into())
    }

    pub fn ping(data: impl Into<Payload>) -> Frame {
        Frame::new(OpCode::Ping, data.into())
    }

    pub fn pong(data: impl Into<Payload>) -> Frame {
        Frame::new(OpCode::Pong, data.into())
    }

    pub fn close(code: u16, reason: &str) -> Frame {
        let mut data = Vec::with_capacity(2 + reason.len());
        data.push((code >> 8) as u8);
        data.push((code & 0xFF) as u8);
        data.extend_from_slice(reason.as_bytes());
        Frame::new(OpCode::Close, Payload::from(data))
    }

    /// Whether this frame satisfies the control-frame preconditions
    /// (`fin == true` and payload no longer than 125 bytes). The flusher
    /// itself never checks this; it exists so callers can assert it.
    pub fn satisfies_control_invariant(&self) -> bool {
        !self.opcode.is_control() || (self.fin && self.payload.len() <= 125)
    }
}

/// The per-submission batching preference. Ordered so that `Off < On <
/// Auto`: the drain decision for a slice is the maximum of its entries'
/// hints, clamped down to `Off` by the forcing conditions in the flush
/// engine (large frame, explicit `Off`, sentinel, aggregate overflow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BatchHint {
    Off,
    On,
    Auto,
}
