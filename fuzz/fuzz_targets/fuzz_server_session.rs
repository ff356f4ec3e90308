#![no_main]

use std::sync::Arc;

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use confidential_session_stream::frame::Frame;
use confidential_session_stream::{MockProvider, ServerSession, Session, SessionConfig};

fuzz_target!(|data: &[u8]| {
    // Split the input into a hello and a confirmation at the first byte.
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = (split as usize).min(rest.len());
    let (hello, confirmation) = rest.split_at(split);

    let mut server =
        ServerSession::attested(Arc::new(MockProvider::new()), &SessionConfig::default());
    if server
        .put_incoming_message(Frame::hello(0, Bytes::copy_from_slice(hello)))
        .is_ok()
    {
        while server.outgoing_message().is_some() {}
        let _ = server.put_incoming_message(Frame::hello(1, Bytes::copy_from_slice(confirmation)));
    }
});
