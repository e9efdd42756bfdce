// Copyright 2016 TMQ contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

// Dispatches one accepted connection to the broker or client frame
// handler depending on the owning socket's role.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::net::TcpStream;

use crate::broker;
use crate::client;
use crate::conn;
use crate::context::Inner;
use crate::error::Result;
use crate::global::Role;
use crate::socket::SocketState;

pub(crate) async fn handle_connection(
    mut stream: TcpStream,
    state: Rc<RefCell<SocketState>>,
    inner: &Rc<Inner>,
) -> Result<()> {
    let frame = conn::read_one_frame(&mut stream).await?;
    let role = state.borrow().role;

    match role {
        Role::Broker => broker::handle_frame(frame, &state, inner).await,
        Role::Client | Role::Bridge => client::handle_frame(frame, &state),
    }
}
