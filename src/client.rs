//! Communicate with an info-beamer node

use std::{io::{self, BufWriter, Read, Write}, net::{TcpStream, ToSocketAddrs}, time::Duration};

use log::{debug, info};

use crate::{commands::DEFAULT_PORT, config::Config, proto::{self, Command}};

const INIT_BUFFER_SIZE: usize = 1024;
const GREETING_PREFIX: &str = "Info Beamer";
const NODE_ACCEPTED: &str = "ok!";

/// A trait representing a valid stream to open a node on
pub trait NodeStream: Read + Write {}
impl<T: Read + Write> NodeStream for T {}

/// A byte sink commands are written to
///
/// Implemented for every [Write]r. Sent commands may stay buffered until
/// [Write::flush] is called.
pub trait Channel: Write {
    /// Write one framed command
    fn send(&mut self, command: &Command) -> Result<(), crate::Error> {
        debug!("Sending opcode '{}'", command.opcode() as char);
        self.write_all(&command.to_bytes())?;
        Ok(())
    }
}
impl<W: Write + ?Sized> Channel for W {}

/// Address of a query server
#[derive(Debug, Clone)]
pub struct QueryClient {
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
}

impl QueryClient {
    /// Target `host` on the default port
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_port(host, DEFAULT_PORT)
    }

    /// Target `host` on a specific port
    pub fn with_port(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, connect_timeout: None }
    }

    /// Target the endpoint described by a configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.endpoint_address.clone(),
            port: config.port,
            connect_timeout: config.connect_timeout(),
        }
    }

    /// Bound the time spent establishing each connection
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Select a node by its path
    pub fn node(&self, path: impl Into<String>) -> NodeRef<'_> {
        NodeRef { client: self, path: path.into() }
    }

    /// Low level method to open a TCP connection to the server
    pub fn connect(&self) -> Result<TcpStream, crate::Error> {
        let Some(timeout) = self.connect_timeout else {
            return Ok(TcpStream::connect((self.host.as_str(), self.port))?);
        };

        let mut last_error = None;
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no address"))
            .into())
    }
}

/// A node on a query server, not opened yet
pub struct NodeRef<'a> {
    client: &'a QueryClient,
    path: String,
}

impl NodeRef<'_> {
    /// Path of this node
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Connect and open this node, in raw mode or line mode
    pub fn io(&self, raw: bool) -> Result<NodeIo<TcpStream>, crate::Error> {
        let stream = self.client.connect()?;
        info!("Connected to {}:{}", self.client.host, self.client.port);
        NodeIo::open(stream, &self.path, raw)
    }
}

/// An opened node where we can write commands and read lines back
pub struct NodeIo<S: NodeStream> {
    stream: BufWriter<S>,
    buffer: Vec<u8>,
    version: String,
}

impl<S: NodeStream> NodeIo<S> {
    /// Open a node over an arbitrary stream
    ///
    /// Checks the server greeting, then asks for `path` in raw or line mode
    /// and waits for the server to accept it.
    pub fn open(stream: S, path: &str, raw: bool) -> Result<Self, crate::Error> {
        let mut node = Self {
            stream: BufWriter::new(stream),
            buffer: Vec::with_capacity(INIT_BUFFER_SIZE),
            version: String::new(),
        };

        let greeting = node.recv_line()?;
        let Some(version) = greeting.strip_prefix(GREETING_PREFIX) else {
            return Err(crate::Error::UnexpectedGreeting(greeting));
        };
        node.version = version.trim().to_owned();

        let selector = if raw { format!("*raw/{path}\n") } else { format!("{path}\n") };
        node.stream.write_all(selector.as_bytes())?;
        node.stream.flush()?;

        let response = node.recv_line()?;
        if response != NODE_ACCEPTED {
            return Err(crate::Error::NodeRejected(response));
        }

        info!("Opened node {path} (raw: {raw}) on {}", node.version);
        Ok(node)
    }

    /// Version announced by the server greeting
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Receive next line sent by the node, without its terminator
    ///
    /// Pending writes are flushed first so the node sees any request a reply
    /// is awaited for.
    pub fn recv_line(&mut self) -> Result<String, crate::Error> {
        self.stream.flush()?;

        let mut buffer = [0_u8; INIT_BUFFER_SIZE];
        loop {
            if let Some(line) = proto::take_line(&mut self.buffer) {
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }

            let byte_red = self.stream.get_mut().read(&mut buffer)?;
            if byte_red == 0 {
                return Err(crate::Error::UnexpectedEndOfStream)
            }
            self.buffer.extend_from_slice(&buffer[..byte_red]);
        }
    }

    /// Underlying stream
    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }

    /// Flush pending bytes and give back the underlying stream
    pub fn into_inner(self) -> Result<S, crate::Error> {
        self.stream.into_inner().map_err(|e| e.into_error().into())
    }
}

impl<S: NodeStream> Write for NodeIo<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
