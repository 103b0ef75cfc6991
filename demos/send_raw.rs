use std::io::Write;

use ibquery_rust::{commands, proto::Command, Channel, QueryClient};

fn main() {
    let mut io = QueryClient::new("127.0.0.1")
        .node("c")
        .io(true)
        .expect("Failed to open node");

    println!("Connected to {}", io.version());

    io.send(&Command::new(commands::STEP).expect("Invalid command"))
        .expect("Failed to send command");
    io.flush().expect("Failed to flush");

    println!("Done")
}
