//! Non-blocking stream/datagram sockets bridging guest socket activity to the
//! host OS. Every descriptor is non-blocking by construction; the only
//! places the emulator thread may stall are the two bounded
//! `wait_readiness` calls used by the virtual TCP translator (connect
//! completion, post-send drain).

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream, UdpSocket};
use std::os::unix::io::AsRawFd;

use crate::constants::{REDIRECT_SUBNET_OCTETS, REDIRECT_THIRD_OCTETS};

/// Rewrites a guest-addressed destination under the card's IP redirection
/// rule: `192.168.64.0/24` and `192.168.65.0/24` are redirected to localhost
/// so the guest can "talk to the gateway" and reach the host.
pub fn redirect_destination(ip: Ipv4Addr) -> Ipv4Addr {
    let o = ip.octets();
    if o[0] == REDIRECT_SUBNET_OCTETS[0]
        && o[1] == REDIRECT_SUBNET_OCTETS[1]
        && REDIRECT_THIRD_OCTETS.contains(&o[2])
    {
        Ipv4Addr::LOCALHOST
    } else {
        ip
    }
}

const POLLIN: i16 = libc::POLLIN;
const POLLOUT: i16 = libc::POLLOUT;

/// Blocks the calling thread for at most `timeout_ms` waiting for `events`
/// (`POLLIN`/`POLLOUT`) on `fd`. Returns the events that were actually ready.
/// This is the only place in the crate that may stall the emulator thread.
fn wait_readiness(fd: i32, events: i16, timeout_ms: i32) -> io::Result<i16> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    // SAFETY: `pfd` is a single well-formed pollfd on the stack, alive for the
    // duration of the call; `nfds` matches the single-element array.
    let rc = unsafe { libc::poll(&mut pfd as *mut libc::pollfd, 1, timeout_ms) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(pfd.revents)
}

/// A non-blocking TCP stream, used both for the per-socket TCP mode and for
/// the virtual TCP translator's re-originated connection.
pub struct StreamSocket {
    inner: TcpStream,
}

impl StreamSocket {
    /// Issues a non-blocking connect. Returns `(socket, in_progress)`: if
    /// `in_progress` is true the caller should later call
    /// `poll_connect_complete`.
    ///
    /// `std` only exposes a blocking `TcpStream::connect`, so the
    /// non-blocking variant is built by creating a raw non-blocking socket
    /// first. This keeps `connect_nonblocking`/`poll_connect_complete`
    /// symmetric with the card's "non-blocking connect in progress" state.
    pub fn connect_nonblocking(addr: SocketAddrV4) -> io::Result<(Self, bool)> {
        let domain = socket_domain();
        // SAFETY: a single `socket(2)` call; the returned fd is owned by the
        // `TcpStream` built from it below and closed on drop.
        let fd = unsafe { libc::socket(domain, libc::SOCK_STREAM, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        set_nonblocking_fd(fd)?;

        let sockaddr = sockaddr_in(addr);
        // SAFETY: `sockaddr` is a valid `sockaddr_in` on the stack sized via
        // `size_of`; `fd` was just created above.
        let rc = unsafe {
            libc::connect(
                fd,
                &sockaddr as *const libc::sockaddr_in as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_in>() as u32,
            )
        };

        // SAFETY: `fd` is a freshly created, valid socket descriptor not
        // owned elsewhere.
        let inner: TcpStream = unsafe { std::os::unix::io::FromRawFd::from_raw_fd(fd) };

        if rc == 0 {
            return Ok((Self { inner }, false));
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock
            || err.raw_os_error() == Some(libc::EINPROGRESS)
        {
            Ok((Self { inner }, true))
        } else {
            Err(err)
        }
    }

    /// Waits up to `timeout_ms` for the connect to finish, then reports
    /// success via `SO_ERROR`: SYN-SENT -> ESTABLISHED when writable and
    /// `SO_ERROR == 0`.
    pub fn poll_connect_complete(&self, timeout_ms: i32) -> io::Result<bool> {
        let revents = wait_readiness(self.inner.as_raw_fd(), POLLOUT, timeout_ms)?;
        if revents & POLLOUT == 0 {
            return Ok(false);
        }
        match self.inner.take_error()? {
            None => Ok(true),
            Some(e) => Err(e),
        }
    }

    pub fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Reads whatever is currently available without blocking. `Ok(None)`
    /// means nothing is ready; `Ok(Some(vec![]))` means the peer closed
    /// (host read returned zero: ESTABLISHED -> CLOSE-WAIT).
    pub fn try_recv(&mut self, max: usize) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; max];
        match self.inner.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(buf))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Polls for readable data for up to `timeout_ms`, used for the bounded
    /// post-send drain.
    pub fn poll_recv(&mut self, max: usize, timeout_ms: i32) -> io::Result<Option<Vec<u8>>> {
        let revents = wait_readiness(self.inner.as_raw_fd(), POLLIN, timeout_ms)?;
        if revents & POLLIN == 0 {
            return Ok(None);
        }
        self.try_recv(max)
    }
}

/// A non-blocking TCP listener for guest `LISTEN`.
pub struct ListenSocket {
    inner: TcpListener,
}

impl ListenSocket {
    pub fn bind(port: u16) -> io::Result<Self> {
        let inner = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
        inner.set_nonblocking(true)?;
        Ok(Self { inner })
    }

    /// Accepts a pending connection without blocking. The accepted
    /// connection replaces the listening descriptor.
    pub fn try_accept(&self) -> io::Result<Option<StreamSocket>> {
        match self.inner.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(true)?;
                Ok(Some(StreamSocket { inner: stream }))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// A non-blocking UDP datagram socket for guest UDP-mode sockets.
pub struct DatagramSocket {
    inner: UdpSocket,
}

impl DatagramSocket {
    pub fn bind(port: u16) -> io::Result<Self> {
        let inner = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
        inner.set_nonblocking(true)?;
        Ok(Self { inner })
    }

    pub fn send_to(&self, buf: &[u8], dest: SocketAddrV4) -> io::Result<usize> {
        self.inner.send_to(buf, dest)
    }

    pub fn try_recv(&self, max: usize) -> io::Result<Option<(Vec<u8>, SocketAddrV4)>> {
        let mut buf = vec![0u8; max];
        match self.inner.recv_from(&mut buf) {
            Ok((n, std::net::SocketAddr::V4(from))) => {
                buf.truncate(n);
                Ok(Some((buf, from)))
            }
            Ok((n, _)) => {
                buf.truncate(n);
                Ok(None)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn socket_domain() -> i32 {
    libc::AF_INET
}

fn set_nonblocking_fd(fd: i32) -> io::Result<()> {
    // SAFETY: `fd` is a valid descriptor owned by the caller for the duration
    // of this call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: same `fd`, setting flags previously read above.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn sockaddr_in(addr: SocketAddrV4) -> libc::sockaddr_in {
    libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: addr.port().to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from_ne_bytes(addr.ip().octets()),
        },
        sin_zero: [0; 8],
        #[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
        sin_len: std::mem::size_of::<libc::sockaddr_in>() as u8,
    }
}
