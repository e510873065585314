//! SLIP-style byte-stuffing frame codec (RFC 1055 alphabet).
//!
//! Encoding turns an arbitrary byte string into an escaped form safe to
//! split across ≤20-byte GATT writes; decoding is a small state machine
//! fed one chunk at a time that emits whole packets at unescaped `END`
//! delimiters.

use crate::wire::MAX_PLAINTEXT_LEN;

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

/// Escape `data`, doubling `END` and `ESC` bytes. Does not append a
/// terminating `END` — callers append it explicitly when closing a packet,
/// per the framing contract.
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        match b {
            END => {
                out.push(ESC);
                out.push(ESC_END);
            }
            ESC => {
                out.push(ESC);
                out.push(ESC_ESC);
            }
            _ => out.push(b),
        }
    }
    out
}

/// One-shot unescape of a complete, already END-delimited packet body.
/// Returns `None` on a malformed escape sequence.
pub fn unescape(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut escaped = false;
    for &b in data {
        if escaped {
            match b {
                ESC_END => out.push(END),
                ESC_ESC => out.push(ESC),
                _ => return None,
            }
            escaped = false;
        } else if b == ESC {
            escaped = true;
        } else {
            out.push(b);
        }
    }
    if escaped {
        return None;
    }
    Some(out)
}

/// Stateful, resumable decoder for a single characteristic stream.
///
/// Feed bytes as they arrive from GATT writes via `feed`; a packet may
/// span an arbitrary number of calls. Each completed, well-formed packet
/// is returned; a malformed escape sequence drops the accumulated packet
/// and clears the escape bit without poisoning the decoder for future
/// packets. A peer that never sends `END` cannot grow the buffer without
/// bound either — once the in-flight packet exceeds `MAX_PLAINTEXT_LEN` it
/// is dropped the same way.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    escaped: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of raw bytes. Returns every packet completed while
    /// processing this chunk, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        for &b in chunk {
            if self.escaped {
                match b {
                    ESC_END => self.buffer.push(END),
                    ESC_ESC => self.buffer.push(ESC),
                    _ => {
                        // Protocol violation: drop the in-flight packet.
                        self.buffer.clear();
                    }
                }
                self.escaped = false;
            } else if b == END {
                if !self.buffer.is_empty() {
                    packets.push(std::mem::take(&mut self.buffer));
                }
                // An END on an empty buffer is a run-in delimiter; ignore.
            } else if b == ESC {
                self.escaped = true;
            } else {
                self.buffer.push(b);
            }

            if self.buffer.len() > MAX_PLAINTEXT_LEN {
                tracing::warn!(
                    len = self.buffer.len(),
                    "packet exceeds MAX_PLAINTEXT_LEN, dropping"
                );
                self.buffer.clear();
                self.escaped = false;
            }
        }
        packets
    }

    /// Drop any partially accumulated packet and clear the escape bit.
    /// Called on connect/disconnect per-service buffer reset.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.escaped = false;
    }
}
