//! Transport abstraction over the two socket kinds SPICE is actually deployed on: TCP (the
//! common case) and a local Unix domain socket (the usual libvirt/qemu local-display setup).

use mio::event::Source;
use mio::net::{TcpStream, UnixStream};
use mio::{Interest, Registry, Token};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::path::Path;

pub enum Transport {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Transport {
    pub fn connect_tcp(addr: SocketAddr) -> io::Result<Transport> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Transport::Tcp(stream))
    }

    pub fn connect_unix<P: AsRef<Path>>(path: P) -> io::Result<Transport> {
        Ok(Transport::Unix(UnixStream::connect(path)?))
    }

    pub fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.register(registry, token, interests),
            Transport::Unix(stream) => stream.register(registry, token, interests),
        }
    }

    pub fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.reregister(registry, token, interests),
            Transport::Unix(stream) => stream.reregister(registry, token, interests),
        }
    }

    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.deregister(registry),
            Transport::Unix(stream) => stream.deregister(registry),
        }
    }

    /// Shuts down only the write half of the socket, leaving reads to hit EOF naturally
    /// whenever the peer finishes its own trailing writes.
    pub fn shutdown_write(&self) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.shutdown(std::net::Shutdown::Write),
            Transport::Unix(stream) => stream.shutdown(std::net::Shutdown::Write),
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.read(buf),
            Transport::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.write(buf),
            Transport::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.flush(),
            Transport::Unix(stream) => stream.flush(),
        }
    }
}
