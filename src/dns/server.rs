//! DNS server listeners.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::info;
use trust_dns_server::ServerFuture;

use crate::dns::handler::Handler;
use crate::dns::soa::Soa;
use crate::dns::Resolver;
use crate::error::Error;

/// Listener configuration.
pub struct ServerConfig {
    /// Address for both listeners.
    pub addr: SocketAddr,
    pub no_tcp: bool,
    pub no_udp: bool,
    /// Idle timeout for accepted TCP connections.
    pub tcp_timeout: Duration,
    /// If provided, this signal fires once all listeners are ready.
    pub ready: Option<oneshot::Sender<()>>,
    /// If the `ns` field is set, the server is authoritative and NS and SOA
    /// records are returned.
    pub soa: Soa,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: SocketAddr::from(([0, 0, 0, 0], 53)),
            no_tcp: false,
            no_udp: false,
            tcp_timeout: Duration::from_secs(5),
            ready: None,
            soa: Soa::default(),
        }
    }
}

/// Serve DNS requests until `cancel` fires. The resolver implementation
/// effectively defines the zones.
///
/// Cancellation aborts the listener tasks (closing both sockets) and
/// returns [`Error::Cancelled`]; otherwise the first transport error ends
/// the server.
pub async fn serve(
    cancel: CancellationToken,
    resolver: Arc<dyn Resolver>,
    mut config: ServerConfig,
) -> Result<(), Error> {
    config.soa.init()?;

    let handler = Handler::new(resolver, config.soa.clone());
    let mut server = ServerFuture::new(handler);

    if !config.no_udp {
        let socket = UdpSocket::bind(config.addr).await?;
        info!(addr = %config.addr, "DNS listening on UDP");
        server.register_socket(socket);
    }

    if !config.no_tcp {
        let listener = TcpListener::bind(config.addr).await?;
        info!(addr = %config.addr, "DNS listening on TCP");
        server.register_listener(listener, config.tcp_timeout);
    }

    if let Some(ready) = config.ready.take() {
        let _ = ready.send(());
    }

    if config.no_tcp && config.no_udp {
        cancel.cancelled().await;
        return Err(Error::Cancelled);
    }

    // The listener tasks own their sockets. Aborting the join drops the
    // server, which aborts those tasks and closes the sockets.
    let mut done = tokio::spawn(server.block_until_done());
    tokio::select! {
        () = cancel.cancelled() => {
            done.abort();
            Err(Error::Cancelled)
        }
        joined = &mut done => match joined {
            Ok(result) => result.map_err(Error::from),
            Err(err) => Err(Error::Io(io::Error::new(io::ErrorKind::Other, err))),
        },
    }
}
