#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

use confidential_session_stream::frame::codec::FrameCodec;
use confidential_session_stream::frame::FrameType;

fuzz_target!(|data: &[u8]| {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from(data);

    // Decode until the input runs out or is rejected; neither may panic.
    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        if frame.header.msg_type == FrameType::Error {
            let _ = frame.status();
        }
    }
});
