//! Connects to a DCP hub, registers a device name, sends a `get` command
//! and prints whatever replies arrive.
//!
//! Run with:
//!     cargo run --example echo_client -- <host> <port> <device-name>

use dcpclient::client::{Connection, NullHandler};

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        println!("Usage: {} <host> <port> <device-name>", args[0]);
        return Ok(());
    }

    let host = &args[1];
    let port: u16 = args[2].parse()?;
    let device_name = args[3].as_bytes();

    let mut handler = NullHandler;
    let mut conn = Connection::new()?;
    conn.connect_to_server(host.clone(), port, device_name, &mut handler)?;

    if !conn.wait_for_connected(5_000, &mut handler) {
        return Err(format!("failed to connect: {}", conn.error_string()).into());
    }
    println!("connected to {}:{}", conn.server_name(), conn.server_port());

    conn.send_message(b"hub", b"get version".to_vec(), 0);
    conn.wait_for_messages_written(5_000, &mut handler);

    if conn.wait_for_ready_read(5_000, &mut handler) {
        while conn.messages_available() > 0 {
            println!("{}", conn.read_message());
        }
    } else {
        println!("no reply within timeout");
    }

    conn.disconnect_from_server(&mut handler);
    Ok(())
}
