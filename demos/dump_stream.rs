//! Connects to a DCP hub and prints every packet on the wire using
//! `PacketView`, without fully decoding the payload of each one.
//!
//! Run with:
//!     cargo run --example dump_stream -- <host> <port>

use std::io::Read;
use std::net::TcpStream;

use byteorder::{BigEndian, ByteOrder};
use dcpclient::hub::PacketView;

const PACKET_HEADER_SIZE: usize = 8;
const MESSAGE_HEADER_SIZE: usize = 42;
const DATA_LEN_OFFSET: usize = PACKET_HEADER_SIZE + 38;

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        println!("Usage: {} <host> <port>", args[0]);
        return Ok(());
    }

    let port: u16 = args[2].parse()?;
    let mut sock = TcpStream::connect((args[1].as_str(), port))?;

    loop {
        let mut buffer = vec![0u8; PACKET_HEADER_SIZE + MESSAGE_HEADER_SIZE];
        if sock.read_exact(&mut buffer).is_err() {
            break;
        }

        let data_len = BigEndian::read_u32(&buffer[DATA_LEN_OFFSET..]) as usize;
        buffer.resize(buffer.len() + data_len, 0);
        let data_start = PACKET_HEADER_SIZE + MESSAGE_HEADER_SIZE;
        if sock.read_exact(&mut buffer[data_start..]).is_err() {
            break;
        }

        match PacketView::new(&buffer) {
            Ok(view) => println!(
                "[{} bytes] flags=0x{:04x} {} -> {}",
                view.size(),
                view.flags(),
                String::from_utf8_lossy(view.source()),
                String::from_utf8_lossy(view.destination()),
            ),
            Err(e) => {
                eprintln!("dropping malformed packet: {e}");
                break;
            }
        }
    }

    Ok(())
}
