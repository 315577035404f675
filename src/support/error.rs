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

use std::io;

use thiserror::Error;

use crate::layer::context::ProviderError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Declared frame length {0} is negative")]
    NegativeFrameLength(i32),
    #[error("Declared frame length {declared} exceeds maximum of {max}")]
    FrameTooLarge { declared: u32, max: u32 },
    #[error("Stream ended in the middle of a frame")]
    TruncatedFrame,
    #[error("Wrapped block of {0} bytes cannot be framed")]
    CiphertextTooLarge(usize),
    #[error("Security layer already failed")]
    LayerFailed,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error means the wrapped byte stream can no longer be
    /// trusted or resynchronised.
    pub fn is_security_fault(&self) -> bool {
        match *self {
            Error::NegativeFrameLength(..)
            | Error::FrameTooLarge { .. }
            | Error::TruncatedFrame
            | Error::CiphertextTooLarge(..)
            | Error::LayerFailed
            | Error::Provider(..) => true,
            _ => false,
        }
    }
}

/// Converts an error raised under a security layer into an `io::Error`
/// suitable for returning from `Read`/`Write` implementations.
pub fn to_ioerr(e: Error) -> io::Error {
    match e {
        Error::Io(e) => e,
        Error::TruncatedFrame => {
            io::Error::new(io::ErrorKind::UnexpectedEof, e)
        }
        e => io::Error::new(io::ErrorKind::InvalidData, e),
    }
}
