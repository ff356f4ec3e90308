#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use confidential_session_stream::crypto::SymmetricKey;
use confidential_session_stream::frame::{Flags, Frame, FrameType};
use confidential_session_stream::session::record::RecordLayer;

fuzz_target!(|data: &[u8]| {
    // Layout: sequence (4) || flags (1) || ciphertext.
    if data.len() < 5 {
        return;
    }
    let sequence = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let mut frame = Frame::data(sequence, Bytes::copy_from_slice(&data[5..]), true);
    frame.header.flags = Flags::from_raw(data[4]);

    let send = SymmetricKey::from([0x42; 32]);
    let recv = SymmetricKey::from([0x24; 32]);
    let mut record = RecordLayer::new(&send, &recv, [0xAA; 32], 1 << 20);

    let _ = record.open(&frame);
    // Replay of the same sequence goes through the monotonic check.
    let _ = record.open(&frame);

    frame.header.msg_type = FrameType::Hello;
    let _ = record.open(&frame);
});
