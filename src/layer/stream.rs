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

//! Blocking `Read`/`Write` adapters over a security layer.
//!
//! `UnwrapReader` yields the cleartext of a framed, wrapped inbound stream;
//! `WrapWriter` takes cleartext and emits framed, wrapped output. Each blocks
//! only as much as the underlying stream does. The two sides are independent
//! and may be used from different threads, sharing one `SecurityLayer`.
//!
//! Any failure of the security layer is reported as an `io::Error` of kind
//! `InvalidData` (or `UnexpectedEof` for a stream cut off mid-frame). The
//! connection must be closed after such an error since the stream cannot be
//! resynchronised.

use std::io::{self, BufRead, Cursor, Read, Write};
use std::sync::Arc;

use super::frame::{DecoderState, FrameDecoder, FrameEncoder};
use super::security::SecurityLayer;
use crate::support::error::{to_ioerr, Error};

const READ_CHUNK: usize = 4096;

/// Implements `std::io::Read` and `std::io::BufRead` on top of a wrapped
/// stream, yielding its cleartext.
///
/// When a `read()` call is made while no cleartext is buffered, the next frame
/// is fully read in and unwrapped. Frame boundaries are otherwise invisible,
/// though they can be observed by the way partial reads complete.
///
/// End of the underlying stream between frames is a clean EOF; end of stream
/// anywhere else is an error.
pub struct UnwrapReader<R> {
    reader: R,
    layer: Arc<SecurityLayer>,
    decoder: FrameDecoder,
    ciphertext_chunk: Vec<u8>,
    cleartext_buffer: Cursor<Vec<u8>>,
}

impl<R: Read> UnwrapReader<R> {
    pub fn new(reader: R, layer: Arc<SecurityLayer>) -> Self {
        UnwrapReader {
            reader,
            decoder: FrameDecoder::new(layer.max_receive_size()),
            layer,
            ciphertext_chunk: vec![0u8; READ_CHUNK],
            cleartext_buffer: Cursor::new(Vec::new()),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read and unwrap the next frame into the cleartext buffer.
    ///
    /// Returns `false` on a clean EOF.
    fn next_frame(&mut self) -> Result<bool, Error> {
        if DecoderState::Failed == self.decoder.state() {
            return Err(Error::LayerFailed);
        }

        while !self.decoder.is_complete() {
            let wanted = self.decoder.wanted().min(READ_CHUNK);
            let nread =
                match self.reader.read(&mut self.ciphertext_chunk[..wanted]) {
                    Ok(n) => n,
                    Err(e) if io::ErrorKind::Interrupted == e.kind() => {
                        continue
                    }
                    Err(e) => return Err(e.into()),
                };

            if 0 == nread {
                return if self.decoder.is_idle() {
                    Ok(false)
                } else {
                    Err(Error::TruncatedFrame)
                };
            }

            self.decoder.feed(&self.ciphertext_chunk[..nread])?;
        }

        let cleartext = self.decoder.unwrap(&self.layer)?;
        self.decoder.clear();
        *self.cleartext_buffer.get_mut() = cleartext;
        self.cleartext_buffer.set_position(0);
        Ok(true)
    }
}

impl<R: Read> Read for UnwrapReader<R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        self.fill_buf()?;
        self.cleartext_buffer.read(dst)
    }
}

impl<R: Read> BufRead for UnwrapReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        // Loop since a frame may legitimately unwrap to nothing, which must
        // not be mistaken for EOF.
        while self.cleartext_buffer.position()
            >= (self.cleartext_buffer.get_ref().len() as u64)
        {
            if !self.next_frame().map_err(to_ioerr)? {
                return Ok(&[]);
            }
        }

        self.cleartext_buffer.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.cleartext_buffer.consume(amt);
    }
}

/// Implements `std::io::Write` on top of a stream, wrapping and framing the
/// cleartext written to it.
///
/// Cleartext is accumulated until a full block of the negotiated send size is
/// available, at which point a frame is written. `flush()` writes whatever is
/// buffered as a (possibly short) frame immediately; it must be called before
/// the writer is discarded or the buffered cleartext is lost.
pub struct WrapWriter<W> {
    writer: W,
    layer: Arc<SecurityLayer>,
    encoder: FrameEncoder,
}

impl<W: Write> WrapWriter<W> {
    pub fn new(writer: W, layer: Arc<SecurityLayer>) -> Self {
        WrapWriter {
            writer,
            encoder: FrameEncoder::new(layer.max_send_size()),
            layer,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Flush any buffered cleartext and return the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush()?;
        Ok(self.writer)
    }

    fn write_frame(&mut self) -> io::Result<()> {
        let frame = self.encoder.encode(&self.layer).map_err(to_ioerr)?;
        self.writer.write_all(&frame)
    }
}

impl<W: Write> Write for WrapWriter<W> {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        let count = self.encoder.append(src);
        if self.encoder.is_full() {
            self.write_frame()?;
        }

        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.encoder.is_empty() {
            self.write_frame()?;
        }

        self.writer.flush()
    }
}
