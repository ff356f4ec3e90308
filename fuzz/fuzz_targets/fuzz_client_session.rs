#![no_main]

use std::sync::Arc;

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use confidential_session_stream::frame::Frame;
use confidential_session_stream::{ClientSession, MockVerifier, Session, SessionConfig};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as the responder hello, then as a record.
    let mut client =
        ClientSession::attested(Arc::new(MockVerifier::new()), &SessionConfig::default());
    while client.outgoing_message().is_some() {}

    let payload = Bytes::copy_from_slice(data);
    if client
        .put_incoming_message(Frame::hello(0, payload.clone()))
        .is_ok()
    {
        let _ = client.put_incoming_message(Frame::data(0, payload, true));
        while client.read().is_some() {}
    }
});
