// Copyright 2016 TMQ contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

// Per-connection I/O: open, send or receive exactly one frame, close.
// There is no handshake and every connection carries exactly one frame in
// one direction, so the state machine is a single `connect`/`write_all` or
// `accept`/`read` followed immediately by closing the socket.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::codec::{self, Frame};
use crate::error::{Error, Result};
use crate::global::HANDLER_READ_CAP;

/// Open a fresh connection to `addr`, send `frame`, and close. Used by
/// `subscribe`, `publish`, `send`, and broker fan-out.
pub async fn send_frame(addr: SocketAddr, frame: &Frame) -> std::io::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    let packed = codec::pack_frame(frame);
    stream.write_all(&packed).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Read exactly one frame from an accepted connection: a single recv up
/// to the maximum frame length.
pub async fn read_one_frame(stream: &mut TcpStream) -> Result<Frame> {
    let mut buf = vec![0u8; HANDLER_READ_CAP];
    let n = stream.read(&mut buf).await.map_err(Error::Io)?;
    if n == 0 {
        return Err(Error::Malformed("connection closed before sending a frame".into()));
    }
    codec::unpack(&buf[..n])
}
