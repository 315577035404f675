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

//! Decoding of client responses to challenges, and of initial responses
//! (RFC 4959 SASL-IR).

/// A decoded client response line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientResponse {
    /// The client cancelled the exchange with `*`.
    Abort,
    /// The decoded response. `=` decodes to an explicitly empty response.
    Data(Vec<u8>),
}

impl ClientResponse {
    /// Decode `line`, which must not include the line ending.
    pub fn parse(line: &[u8]) -> Result<Self, base64::DecodeError> {
        match line {
            b"*" => Ok(ClientResponse::Abort),
            b"=" => Ok(ClientResponse::Data(Vec::new())),
            _ => base64::decode(line).map(ClientResponse::Data),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_responses() {
        assert_eq!(Ok(ClientResponse::Abort), ClientResponse::parse(b"*"));
        assert_eq!(
            Ok(ClientResponse::Data(Vec::new())),
            ClientResponse::parse(b"=")
        );
        assert_eq!(
            Ok(ClientResponse::Data(Vec::new())),
            ClientResponse::parse(b"")
        );
        assert_eq!(
            Ok(ClientResponse::Data(b"\0alice\0s3cret".to_vec())),
            ClientResponse::parse(b"AGFsaWNlAHMzY3JldA==")
        );
        assert!(ClientResponse::parse(b"*abc").is_err());
        assert!(ClientResponse::parse(b"not base64!").is_err());
    }
}
