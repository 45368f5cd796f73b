//! Example: Query In, Reply Out
//!
//! Builds a query frame, parses it the way a server would, mints an object id
//! for the response document and assembles the correlated reply.
//!
//! Run with: `cargo run --example wire_roundtrip`

#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;

use dbwire::config::WireConfig;
use dbwire::identity::{IdentityContext, ObjectIdGenerator};
use dbwire::utils::{global_metrics, logging};
use dbwire::{
    DocumentView, Frame, QueryFrameBuilder, QueryOptions, QueryRequest, Reply, ReplyBuilder,
    ReplyView, ResultFlags,
};

/// `{ _id: <oid> }`
fn id_document(oid: &[u8; 12]) -> Vec<u8> {
    let mut doc = 22i32.to_le_bytes().to_vec();
    doc.push(0x07);
    doc.extend_from_slice(b"_id\0");
    doc.extend_from_slice(oid);
    doc.push(0x00);
    doc
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = WireConfig::from_env()?;
    config.apply()?;
    logging::init_logging(&config.logging)?;

    println!("=== Wire Round Trip Demo ===\n");

    // 1. Client side: encode a query
    let filter = [5u8, 0, 0, 0, 0];
    let wire = QueryFrameBuilder::new("demo.users", DocumentView::new(&filter)?)
        .limit(1)
        .options(QueryOptions::SLAVE_OK)
        .build()?;
    println!("Query frame: {} bytes", wire.len());
    println!("   - Hex: {:02X?}", &wire[..wire.len().min(32)]);

    // 2. Server side: parse it
    let frame = Frame::new(&wire)?;
    let query = QueryRequest::from_frame(frame)?;
    println!(
        "Parsed query on {} (skip={}, limit={}, options={:?})",
        query.namespace(),
        query.skip(),
        query.limit(),
        query.options()
    );

    // 3. Mint an id and reply with it
    let identity = Arc::new(IdentityContext::from_os()?);
    let generator = ObjectIdGenerator::new(identity.clone());
    let oid = generator.create()?;
    println!("Minted {} (machine id {:06x})", oid, identity.machine_id()?);

    let doc = id_document(oid.as_bytes());
    let mut replies: Vec<Reply> = Vec::new();
    ReplyBuilder::single(ResultFlags::ok(), DocumentView::new(&doc)?)
        .send(&mut replies, frame.header())?;

    // 4. Client side: read the reply back
    for reply in &replies {
        let view = ReplyView::parse(Frame::new(&reply.frame)?)?;
        println!(
            "Reply {} -> {}: {} document(s), {} bytes",
            reply.request_id,
            reply.response_to,
            view.n_returned(),
            reply.frame.len()
        );
        for doc in view.documents()? {
            doc.validate()?;
            println!("   - {:?}", doc);
        }
    }

    global_metrics().log_metrics();
    Ok(())
}
