//! Loopback - client and server sessions over an in-memory pipe.
//!
//! This example demonstrates:
//! - Establishing both sides of a session with `SessionBuilder`
//! - Serving `<get>` requests with subtree filtering on the server side
//! - Publishing a notification through `NotificationPublisher`
//!
//! # Running
//!
//! ```text
//! RUST_LOG=netconf_engine=debug cargo run --example loopback
//! ```

use std::sync::Arc;

use netconf_engine::codec::XmlCodec;
use netconf_engine::filter::{self, NotificationPublisher};
use netconf_engine::negotiation::{capabilities, SequentialAllocator};
use netconf_engine::protocol::{classify, MessageKind};
use netconf_engine::rpc::{build_data_reply, build_error_reply, build_reply, operations, RpcError};
use netconf_engine::{Node, Session, SessionBuilder};
use tracing_subscriber::EnvFilter;

const DATASTORE: &str = r#"<data>
  <users xmlns="urn:example:users">
    <user><name>alice</name><id>1</id><role>admin</role></user>
    <user><name>bob</name><id>2</id><role>ops</role></user>
  </users>
</data>"#;

/// Answer requests until the client closes the session.
async fn serve(mut session: Session, datastore: Node) -> netconf_engine::Result<()> {
    while let Some(request) = session.next_message().await {
        if classify(&request) != MessageKind::Rpc {
            continue;
        }
        let Some(operation) = request.children().first() else {
            continue;
        };

        let reply = match operation.local_name() {
            "get" => {
                let selected = filter::apply(&datastore, operation.child("filter"))?;
                let content = selected.map(|d| d.children().to_vec()).unwrap_or_default();
                build_data_reply(&request, content)
            }
            "close-session" => {
                session.send(&build_reply(&request, Vec::new())).await?;
                break;
            }
            other => build_error_reply(
                &request,
                &[RpcError::new("protocol", "operation-not-supported")
                    .with_message(format!("<{}> is not served here", other))],
            ),
        };
        session.send(&reply).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let allocator = Arc::new(SequentialAllocator::new());

    let (client, server) = tokio::join!(
        SessionBuilder::client()
            .capability(capabilities::NOTIFICATION_1_0)
            .establish(client_io),
        SessionBuilder::server(allocator).establish(server_io),
    );
    let client = client?;
    let server = server?;
    println!(
        "session {} established, framing {:?}",
        client.session_id(),
        client.framing()
    );

    let server_task = tokio::spawn(serve(server, XmlCodec::from_xml_str(DATASTORE)?));

    let bob = XmlCodec::from_xml_str(
        r#"<filter><users xmlns="urn:example:users"><user><name>bob</name></user></users></filter>"#,
    )?;
    let reply = client.rpc(operations::get(Some(&bob))).await?;
    if let Some(data) = reply.data() {
        println!("filtered: {}", XmlCodec::to_xml_string(data));
    }

    let reply = client.rpc(operations::commit()).await?;
    for error in reply.errors() {
        println!("commit refused: {}", error);
    }

    let publisher = NotificationPublisher::new();
    let mut subscription = publisher.subscribe(Some(XmlCodec::from_xml_str(
        "<filter><user-added/></filter>",
    )?))?;
    let event = XmlCodec::from_xml_str(
        r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0">
             <eventTime>2024-05-01T10:00:00Z</eventTime>
             <user-added xmlns="urn:example:users"><name>carol</name></user-added>
           </notification>"#,
    )?;
    println!("notification delivered to {} subscriber(s)", publisher.publish(&event)?);
    if let Some(received) = subscription.try_recv() {
        println!("received: {}", XmlCodec::to_xml_string(&received));
    }

    client.close().await?;
    server_task.await??;
    Ok(())
}
