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

//! Push-based adapter for event-driven transports.
//!
//! Where the blocking adapters pull from and push to a stream, an
//! event-driven transport instead hands us each chunk of bytes as it arrives
//! and each write request as the protocol layer makes it. `SecurityFilter`
//! sits between the transport and the protocol layer: received chunks are
//! fed through a `FrameDecoder` and each complete frame is delivered upwards
//! as one block of cleartext; write requests are wrapped and framed before
//! being passed downwards.
//!
//! The inbound and outbound sides have separate locks, so one thread may be
//! receiving while another writes.

use std::sync::{Arc, Mutex};

use log::warn;

use super::frame::{FrameDecoder, FrameEncoder};
use super::security::SecurityLayer;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

/// A write travelling towards the transport.
///
/// `completion` is whatever the transport uses to notify the writer that the
/// write has gone out (e.g. a future or callback). It is carried through the
/// filter untouched.
#[derive(Debug)]
pub struct WriteRequest<C> {
    pub data: Vec<u8>,
    pub completion: Option<C>,
}

impl<C> WriteRequest<C> {
    pub fn new(data: Vec<u8>, completion: Option<C>) -> Self {
        WriteRequest { data, completion }
    }
}

pub struct SecurityFilter {
    layer: Arc<SecurityLayer>,
    inbound: Mutex<FrameDecoder>,
    outbound: Mutex<FrameEncoder>,
    log_prefix: LogPrefix,
}

impl SecurityFilter {
    pub fn new(layer: Arc<SecurityLayer>, log_prefix: LogPrefix) -> Self {
        SecurityFilter {
            inbound: Mutex::new(FrameDecoder::new(layer.max_receive_size())),
            outbound: Mutex::new(FrameEncoder::new(layer.max_send_size())),
            layer,
            log_prefix,
        }
    }

    pub fn layer(&self) -> &Arc<SecurityLayer> {
        &self.layer
    }

    /// Handle a chunk of bytes received from the transport.
    ///
    /// `chunk` may contain any fraction of a frame, or several frames. Each
    /// time a frame is completed, its cleartext is passed to `deliver`, in
    /// stream order. A frame which unwraps to nothing is delivered as an
    /// empty block.
    ///
    /// An error means the inbound stream is corrupt and the connection must
    /// be closed; the filter will reject all further input.
    pub fn on_bytes_received(
        &self,
        chunk: &[u8],
        deliver: impl FnMut(Vec<u8>),
    ) -> Result<(), Error> {
        self.receive(chunk, deliver).map_err(|e| {
            warn!("{} Inbound security layer fault: {}", self.log_prefix, e);
            e
        })
    }

    fn receive(
        &self,
        mut chunk: &[u8],
        mut deliver: impl FnMut(Vec<u8>),
    ) -> Result<(), Error> {
        let mut decoder = self.inbound.lock().unwrap();
        while !chunk.is_empty() {
            let consumed = decoder.feed(chunk)?;
            chunk = &chunk[consumed..];

            if decoder.is_complete() {
                let cleartext = decoder.unwrap(&self.layer)?;
                decoder.clear();
                deliver(cleartext);
            }
        }

        Ok(())
    }

    /// Handle a write request from the protocol layer.
    ///
    /// The data is wrapped in blocks no larger than the negotiated send size,
    /// and each resulting frame is passed to `next` as its own request, in
    /// order. The original completion is attached only to the last of these,
    /// so the writer is notified exactly once, after all of its data has been
    /// written.
    ///
    /// A request with no data is passed to `next` unchanged, since some peers
    /// cannot handle an empty wrapped frame.
    ///
    /// If wrapping fails, nothing is passed to `next`, the completion is
    /// dropped, and the connection must be closed.
    pub fn on_write_requested<C>(
        &self,
        request: WriteRequest<C>,
        mut next: impl FnMut(WriteRequest<C>),
    ) -> Result<(), Error> {
        if request.data.is_empty() {
            next(request);
            return Ok(());
        }

        let WriteRequest {
            data,
            mut completion,
        } = request;

        // The lock is held until every frame has been passed on so that
        // frames of concurrent writes are never interleaved, and so that the
        // wire order matches the order in which blocks were wrapped.
        let mut encoder = self.outbound.lock().unwrap();
        let mut frames = Vec::with_capacity(
            1 + data.len() / self.layer.max_send_size() as usize,
        );
        let mut src = &data[..];
        while !src.is_empty() {
            let count = encoder.append(src);
            src = &src[count..];
            if encoder.is_full() || src.is_empty() {
                let frame = encoder.encode(&self.layer).map_err(|e| {
                    warn!(
                        "{} Outbound security layer fault: {}",
                        self.log_prefix, e
                    );
                    e
                })?;
                frames.push(frame);
            }
        }

        let last = frames.len() - 1;
        for (ix, frame) in frames.into_iter().enumerate() {
            next(WriteRequest {
                data: frame,
                completion: if last == ix { completion.take() } else { None },
            });
        }

        Ok(())
    }
}
