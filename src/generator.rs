//! Renders a frame's header bytes. Only ever touches the header; payload
//! bytes are appended separately by the flush engine, either into the
//! aggregate or as a second gather-write buffer.

use byteorder::{BigEndian, ByteOrder};

use crate::error::FlushError;
use crate::frame::Frame;
use crate::pool::{BufferPool, PoolBuf};

/// Upper bound on a single frame header: 1 (opcode/flags byte) + 1
/// (mask bit + short length) + 8 (extended 64-bit length) + 4 (mask key).
pub const MAX_HEADER_LEN: usize = 14;

/// Renders frame headers. Masking and length encoding are pure functions
/// of the frame's fields; no external state is consulted.
pub trait Generator: Send + Sync {
    /// The upper bound used for capacity arithmetic (the large-frame
    /// threshold and aggregate sizing). Defaults to `MAX_HEADER_LEN`;
    /// override only if a custom generator's headers can be longer.
    fn max_header_len(&self) -> usize {
        MAX_HEADER_LEN
    }

    /// Acquires a header buffer from `pool` and renders into it.
    fn render_header(&self, frame: &Frame, pool: &dyn BufferPool) -> Result<PoolBuf, FlushError>;

    /// Renders directly into the tail of `dst`, growing it. Used when the
    /// engine is appending into the shared aggregate rather than handing
    /// out a standalone buffer for a gather write.
    fn render_header_into(&self, frame: &Frame, dst: &mut PoolBuf);
}

/// The RFC 6455 framing `Generator` used unless a caller substitutes
/// their own (the generator is a trait precisely so they can).
#[derive(Debug, Default, Clone, Copy)]
pub struct StdGenerator;

impl StdGenerator {
    fn encode(frame: &Frame, out: &mut Vec<u8>) {
        let mut first_byte = frame.opcode.code();
        if frame.fin {
            first_byte |= 0x80;
        }
        if frame.rsv1 {
            first_byte |= 0x40;
        }
        if frame.rsv2 {
            first_byte |= 0x20;
        }
        if frame.rsv3 {
            first_byte |= 0x10;
        }
        let mask_bit = if frame.mask.is_some() { 0x80 } else { 0 };
        let len = frame.payload.len();
        match len {
            0...125 => {
                out.extend_from_slice(&[first_byte, (len as u8) | mask_bit]);
            }
            126...65535 => {
                let mut ext = [0u8; 2];
                BigEndian::write_u16(&mut ext, len as u16);
                out.extend_from_slice(&[first_byte, 126 | mask_bit]);
                out.extend_from_slice(&ext);
            }
            _ => {
                let mut ext = [0u8; 8];
                BigEndian::write_u64(&mut ext, len as u64);
                out.extend_from_slice(&[first_byte, 127 | mask_bit]);
                out.extend_from_slice(&ext);
            }
        }
        if let Some(mask) = frame.mask {
            out.extend_from_slice(&mask);
        }
    }
}

impl Generator for StdGenerator {
    fn render_header(&self, frame: &Frame, pool: &dyn BufferPool) -> Result<PoolBuf, FlushError> {
        let mut buf = pool.acquire(MAX_HEADER_LEN, false)?;
        Self::encode(frame, buf.as_vec_mut());
        Ok(buf)
    }

    fn render_header_into(&self, frame: &Frame, dst: &mut PoolBuf) {
        Self::encode(frame, dst.as_vec_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, OpCode};
    use crate::pool::HeapPool;

    #[test]
    fn short_payload_header_is_two_bytes() {
        let gen = StdGenerator;
        let pool = HeapPool;
        let frame = Frame::binary(vec![0u8; 64]);
        let header = gen.render_header(&frame, &pool).unwrap();
        assert_eq!(header.len(), 2);
        assert_eq!(header.as_slice()[0], 0x82); // fin + binary
        assert_eq!(header.as_slice()[1], 64);
    }

    #[test]
    fn medium_payload_uses_16_bit_extended_length() {
        let gen = StdGenerator;
        let pool = HeapPool;
        let frame = Frame::binary(vec![0u8; 300]);
        let header = gen.render_header(&frame, &pool).unwrap();
        assert_eq!(header.len(), 4);
        assert_eq!(header.as_slice()[1], 126);
        assert_eq!(BigEndian::read_u16(&header.as_slice()[2..4]), 300);
    }

    #[test]
    fn mask_key_is_appended_after_length() {
        let gen = StdGenerator;
        let pool = HeapPool;
        let mut frame = Frame::text(Vec::from("hi".as_bytes()));
        frame.mask = Some([1, 2, 3, 4]);
        let header = gen.render_header(&frame, &pool).unwrap();
        assert_eq!(header.len(), 6);
        assert_eq!(header.as_slice()[1] & 0x80, 0x80);
        assert_eq!(&header.as_slice()[2..6], &[1, 2, 3, 4]);
    }

    #[test]
    fn control_frame_header_sets_fin() {
        let gen = StdGenerator;
        let pool = HeapPool;
        let frame = Frame::ping(Vec::new());
        let header = gen.render_header(&frame, &pool).unwrap();
        assert_eq!(header.as_slice()[0], 0x80 | OpCode::Ping.code());
    }
}
