//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

//! Framing of wrapped data.
//!
//! Once a security layer is in effect, both directions of the connection
//! carry a sequence of frames, each formatted as:
//! - u32 BE: Length of the following ciphertext
//! - Ciphertext, as produced by the security layer's `wrap`, of exactly the
//!   given length
//!
//! This module contains the framing logic as pure state machines with no I/O
//! of their own. `FrameDecoder` is fed arbitrary fragments of the inbound
//! stream and reports when a whole frame has accumulated; `FrameEncoder`
//! accumulates outbound cleartext up to the negotiated block size and turns
//! it into a frame. The blocking (`stream`) and push-based (`filter`)
//! adapters are thin wrappers around these.

use std::convert::TryInto;

use byteorder::{BigEndian, ByteOrder};

use super::security::SecurityLayer;
use crate::support::buffer::CappedBuffer;
use crate::support::error::Error;

/// Size of the length prefix on each frame.
pub const LENGTH_SIZE: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderState {
    /// Collecting the length prefix.
    ReadingLength,
    /// Collecting the ciphertext.
    ReadingBody,
    /// A whole frame is available; `clear()` must be called before more
    /// input is accepted.
    Complete,
    /// A protocol violation was detected. The stream cannot be
    /// resynchronised.
    Failed,
}

/// Accumulates one inbound frame at a time.
#[derive(Debug)]
pub struct FrameDecoder {
    max_size: u32,
    length: [u8; LENGTH_SIZE],
    length_read: usize,
    body: CappedBuffer,
    state: DecoderState,
}

impl FrameDecoder {
    /// Create a decoder which rejects frames longer than `max_size`.
    pub fn new(max_size: u32) -> Self {
        FrameDecoder {
            max_size,
            length: [0; LENGTH_SIZE],
            length_read: 0,
            body: CappedBuffer::new(0),
            state: DecoderState::ReadingLength,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        DecoderState::Complete == self.state
    }

    /// Whether the decoder is between frames, i.e., no part of a frame has
    /// been received.
    pub fn is_idle(&self) -> bool {
        DecoderState::ReadingLength == self.state && 0 == self.length_read
    }

    /// Returns how many more bytes are needed to finish the current part of
    /// the frame (length prefix or body).
    pub fn wanted(&self) -> usize {
        match self.state {
            DecoderState::ReadingLength => LENGTH_SIZE - self.length_read,
            DecoderState::ReadingBody => self.body.remaining(),
            DecoderState::Complete | DecoderState::Failed => 0,
        }
    }

    /// Feed bytes from the stream.
    ///
    /// Consumes bytes until either `src` is exhausted or a frame is complete,
    /// returning the number of bytes consumed. Bytes past the end of a
    /// complete frame are left for the caller to feed in after `clear()`.
    ///
    /// If the length prefix declares a frame that is negative (when viewed as
    /// a signed integer) or longer than the maximum, this fails before
    /// allocating anything for the body, and the decoder refuses all further
    /// input.
    pub fn feed(&mut self, src: &[u8]) -> Result<usize, Error> {
        let mut consumed = 0;

        if DecoderState::ReadingLength == self.state {
            let count = (LENGTH_SIZE - self.length_read).min(src.len());
            self.length[self.length_read..self.length_read + count]
                .copy_from_slice(&src[..count]);
            self.length_read += count;
            consumed += count;

            if LENGTH_SIZE == self.length_read {
                if let Err(e) = self.begin_body() {
                    self.state = DecoderState::Failed;
                    return Err(e);
                }
            }
        }

        match self.state {
            DecoderState::ReadingBody => {
                consumed += self.body.append(&src[consumed..]);
                if self.body.is_full() {
                    self.state = DecoderState::Complete;
                }
            }
            DecoderState::Failed => return Err(Error::LayerFailed),
            DecoderState::ReadingLength | DecoderState::Complete => (),
        }

        Ok(consumed)
    }

    fn begin_body(&mut self) -> Result<(), Error> {
        let declared = BigEndian::read_u32(&self.length);
        if (declared as i32) < 0 {
            return Err(Error::NegativeFrameLength(declared as i32));
        }

        if declared > self.max_size {
            return Err(Error::FrameTooLarge {
                declared,
                max: self.max_size,
            });
        }

        self.body.reset(declared as usize);
        self.state = if 0 == declared {
            DecoderState::Complete
        } else {
            DecoderState::ReadingBody
        };
        Ok(())
    }

    /// Returns the ciphertext of the complete frame, if there is one.
    pub fn frame(&self) -> Option<&[u8]> {
        if self.is_complete() {
            Some(self.body.as_slice())
        } else {
            None
        }
    }

    /// Unwrap the complete frame through `layer`.
    ///
    /// The frame is not cleared.
    pub fn unwrap(&self, layer: &SecurityLayer) -> Result<Vec<u8>, Error> {
        match self.frame() {
            Some(frame) => layer.unwrap(frame),
            None => Err(Error::LayerFailed),
        }
    }

    /// Discard the current frame and start reading the next length prefix.
    ///
    /// Has no effect on a failed decoder.
    pub fn clear(&mut self) {
        if DecoderState::Failed == self.state {
            return;
        }

        self.length_read = 0;
        self.body.clear();
        self.state = DecoderState::ReadingLength;
    }
}

/// Accumulates outbound cleartext into blocks no larger than the negotiated
/// send size.
#[derive(Debug)]
pub struct FrameEncoder {
    buffer: CappedBuffer,
}

impl FrameEncoder {
    /// Create an encoder which wraps at most `max_send_size` bytes of
    /// cleartext per frame.
    pub fn new(max_send_size: u32) -> Self {
        FrameEncoder {
            buffer: CappedBuffer::new(max_send_size as usize),
        }
    }

    /// Buffer as much of `src` as fits in the current block, returning the
    /// number of bytes taken.
    pub fn append(&mut self, src: &[u8]) -> usize {
        self.buffer.append(src)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether the current block has reached the send size and must be
    /// encoded before more data can be appended.
    pub fn is_full(&self) -> bool {
        self.buffer.is_full()
    }

    /// Wrap the buffered cleartext through `layer` and return the complete
    /// frame, clearing the buffer.
    ///
    /// On error, the buffered cleartext is discarded.
    pub fn encode(&mut self, layer: &SecurityLayer) -> Result<Vec<u8>, Error> {
        let wrapped = layer.wrap(self.buffer.as_slice());
        self.buffer.clear();
        encode_frame(&wrapped?)
    }
}

/// Prefix `ciphertext` with its length.
pub fn encode_frame(ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    let length: u32 = ciphertext
        .len()
        .try_into()
        .map_err(|_| Error::CiphertextTooLarge(ciphertext.len()))?;
    let mut frame = vec![0u8; LENGTH_SIZE + ciphertext.len()];
    BigEndian::write_u32(&mut frame[..LENGTH_SIZE], length);
    frame[LENGTH_SIZE..].copy_from_slice(ciphertext);
    Ok(frame)
}
