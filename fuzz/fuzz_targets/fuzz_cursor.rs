#![no_main]

use dbwire::{Frame, MessageCursor, QueryRequest};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Framing must reject or accept, never panic or read out of bounds
    let Ok(frame) = Frame::new(data) else {
        return;
    };
    let _ = QueryRequest::from_frame(frame);

    if let Ok(mut cursor) = MessageCursor::new(frame) {
        while cursor.has_more_documents() {
            match cursor.next_document() {
                Ok(doc) => {
                    let _ = doc.validate();
                }
                Err(_) => break,
            }
        }
    }
});
