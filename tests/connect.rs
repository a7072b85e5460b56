use netdial::{
    Connector, Interrupt, NetConfig, NetError, Network, NetworkAddress, ProxyConfig,
    ProxyRegistry, ServiceEndpoint,
};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::oneshot;
use tokio::time::Instant;

const TIMEOUT: Duration = Duration::from_secs(5);

/// What the stub proxy answers to a CONNECT request
#[derive(Clone, Copy)]
enum Answer {
    Succeed,
    Refuse(u8),
    RequireAuth,
}

/// Raw CONNECT request (ATYP onwards) and user/pass sub-negotiation, if any
type Captured = (Vec<u8>, Option<Vec<u8>>);

/// Minimal SOCKS5 proxy stub for one connection. Sends back what it captured.
async fn start_stub_proxy(answer: Answer) -> (SocketAddr, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut s, _) = listener.accept().await.unwrap();

        let mut head = [0u8; 2];
        s.read_exact(&mut head).await.unwrap();
        let mut methods = vec![0u8; head[1] as usize];
        s.read_exact(&mut methods).await.unwrap();

        let mut creds = None;
        if matches!(answer, Answer::RequireAuth) {
            assert!(methods.contains(&0x02), "client did not offer user/pass");
            s.write_all(&[0x05, 0x02]).await.unwrap();
            let mut buf = vec![0u8; 2];
            s.read_exact(&mut buf).await.unwrap();
            let mut user = vec![0u8; buf[1] as usize];
            s.read_exact(&mut user).await.unwrap();
            let plen = s.read_u8().await.unwrap();
            let mut pass = vec![0u8; plen as usize];
            s.read_exact(&mut pass).await.unwrap();
            buf.extend(&user);
            buf.push(plen);
            buf.extend(&pass);
            creds = Some(buf);
            s.write_all(&[0x01, 0x00]).await.unwrap();
        } else {
            s.write_all(&[0x05, 0x00]).await.unwrap();
        }

        let mut req = [0u8; 4];
        s.read_exact(&mut req).await.unwrap();
        let mut request = vec![req[3]];
        let rest = match req[3] {
            0x01 => 6,
            0x04 => 18,
            _ => {
                let len = s.read_u8().await.unwrap();
                request.push(len);
                len as usize + 2
            }
        };
        let mut tail = vec![0u8; rest];
        s.read_exact(&mut tail).await.unwrap();
        request.extend(tail);

        let rep = match answer {
            Answer::Refuse(code) => code,
            _ => 0x00,
        };
        s.write_all(&[0x05, rep, 0x00, 0x01, 127, 0, 0, 1, 0x1f, 0x90])
            .await
            .unwrap();
        if rep == 0 {
            s.write_all(b"pong").await.unwrap();
        }
        let _ = tx.send((request, creds));
    });

    (addr, rx)
}

/// Address on loopback that nothing listens on
async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

fn proxy_at(addr: SocketAddr) -> ProxyConfig {
    ProxyConfig::new(ServiceEndpoint::from(addr))
}

#[tokio::test]
async fn proxy_happy_path() {
    let (addr, rx) = start_stub_proxy(Answer::Succeed).await;
    let connector = Connector::new(NetConfig::default());

    let mut stream = connector
        .connect_through_proxy(&proxy_at(addr), "seed.example.org", 8333, TIMEOUT)
        .await
        .unwrap();

    let mut pong = [0u8; 4];
    stream.read_exact(&mut pong).await.unwrap();
    assert_eq!(&pong, b"pong");

    let (request, creds) = rx.await.unwrap();
    assert_eq!(request[0], 0x03);
    assert_eq!(&request[2..2 + 16], b"seed.example.org");
    assert!(creds.is_none());
}

#[tokio::test]
async fn destination_rejected_keeps_flag_clear() {
    let (addr, _rx) = start_stub_proxy(Answer::Refuse(0x05)).await;
    let connector = Connector::new(NetConfig::default());

    let err = connector
        .connect_through_proxy(&proxy_at(addr), "seed.example.org", 8333, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::ProxyRefused(5)));
    assert!(!err.proxy_connection_failed());
}

#[tokio::test]
async fn unreachable_proxy_sets_flag() {
    let addr = closed_port().await;
    let connector = Connector::new(NetConfig::default());

    let err = connector
        .connect_through_proxy(&proxy_at(addr), "seed.example.org", 8333, TIMEOUT)
        .await
        .unwrap_err();
    assert!(err.proxy_connection_failed(), "{err}");
    match err {
        NetError::ProxyUnreachable { source, .. } => {
            assert!(matches!(*source, NetError::ConnectRefusedOrUnreachable { .. }));
        }
        other => panic!("unexpected {other}"),
    }
}

#[tokio::test]
async fn socket_factory_failure_is_proxy_unreachable() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let factory = move |_: &ServiceEndpoint| -> io::Result<TcpSocket> {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::other("out of sockets"))
    };
    let connector = Connector::new(NetConfig::default()).with_socket_factory(Arc::new(factory));

    let proxy = proxy_at("127.0.0.1:9050".parse().unwrap());
    let err = connector
        .connect_through_proxy(&proxy, "seed.example.org", 8333, TIMEOUT)
        .await
        .unwrap_err();
    assert!(err.proxy_connection_failed());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn randomized_credentials_are_fresh_per_connection() {
    let connector = Connector::new(NetConfig::default());
    let mut seen = Vec::new();

    for _ in 0..2 {
        let (addr, rx) = start_stub_proxy(Answer::RequireAuth).await;
        let proxy = proxy_at(addr).with_randomized_credentials(true);
        connector
            .connect_through_proxy(&proxy, "example.onion.invalid", 8333, TIMEOUT)
            .await
            .unwrap();
        let (_, creds) = rx.await.unwrap();
        seen.push(creds.expect("credentials were sent"));
    }

    assert_ne!(seen[0], seen[1]);
}

#[tokio::test]
async fn direct_connect() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut s, _) = listener.accept().await.unwrap();
        s.write_all(b"hello").await.unwrap();
    });

    let connector = Connector::new(NetConfig::default());
    let mut stream = connector
        .connect_directly(&ServiceEndpoint::from(addr), TIMEOUT, false)
        .await
        .unwrap();
    assert!(stream.nodelay().unwrap());

    let mut buf = [0u8; 5];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello");
}

#[tokio::test]
async fn direct_connect_refused() {
    let addr = closed_port().await;
    let connector = Connector::new(NetConfig::default());

    for manual in [true, false] {
        let err = connector
            .connect_directly(&ServiceEndpoint::from(addr), TIMEOUT, manual)
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::ConnectRefusedOrUnreachable { .. }));
        assert!(!err.proxy_connection_failed());
    }
}

#[tokio::test]
async fn direct_connect_rejects_non_ip() {
    let connector = Connector::new(NetConfig::default());
    let onion = NetworkAddress::parse_special(
        "pg6mmjiyjmcrsslvykfwnntlaru7p5svn6y2ymmju6nubxndf4pscryd.onion",
    )
    .unwrap();

    let err = connector
        .connect_directly(&ServiceEndpoint::new(onion, 8333), TIMEOUT, true)
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::InvalidInput(_)));
}

#[tokio::test]
async fn interrupted_connector_returns_promptly() {
    let interrupt = Interrupt::new();
    interrupt.set();
    let connector = Connector::new(NetConfig::default()).with_interrupt(interrupt);

    // 192.0.2.0/24 is TEST-NET-1; the interrupt fires before connect matters
    let dest = ServiceEndpoint::new(NetworkAddress::Ipv4(Ipv4Addr::new(192, 0, 2, 1)), 8333);
    let started = Instant::now();
    let err = connector.connect_directly(&dest, TIMEOUT, true).await.unwrap_err();
    assert!(matches!(err, NetError::Interrupted));
    assert!(started.elapsed() < Duration::from_secs(1));

    let err = connector
        .connect_through_proxy(&ProxyConfig::new(dest), "example.com", 80, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::Interrupted));
    assert!(!err.proxy_connection_failed());
}

#[tokio::test]
async fn node_connect_routes_onion_through_proxy() {
    let (addr, rx) = start_stub_proxy(Answer::Succeed).await;
    let proxies = Arc::new(ProxyRegistry::new());
    proxies.set_proxy(Network::Onion, proxy_at(addr)).unwrap();

    let connector = Connector::new(NetConfig::default()).with_proxies(proxies);
    let onion = "pg6mmjiyjmcrsslvykfwnntlaru7p5svn6y2ymmju6nubxndf4pscryd.onion";
    connector
        .connect(&format!("{onion}:9735"), 8333, true)
        .await
        .unwrap();

    let (request, _) = rx.await.unwrap();
    assert_eq!(request[0], 0x03);
    assert_eq!(&request[2..2 + onion.len()], onion.as_bytes());
    assert_eq!(&request[2 + onion.len()..], &9735u16.to_be_bytes());
}

#[tokio::test]
async fn node_connect_defers_names_to_name_proxy() {
    let (addr, rx) = start_stub_proxy(Answer::Succeed).await;
    let proxies = Arc::new(ProxyRegistry::new());
    proxies.set_name_proxy(proxy_at(addr)).unwrap();

    // resolving locally would be a leak
    let resolver = |name: &str, _: bool| -> io::Result<Vec<NetworkAddress>> {
        panic!("{name} must be resolved by the proxy")
    };
    let connector = Connector::new(NetConfig::default())
        .with_proxies(proxies)
        .with_resolver(Arc::new(resolver));

    connector.connect("seed.example.org", 8333, false).await.unwrap();

    let (request, _) = rx.await.unwrap();
    assert_eq!(request[0], 0x03);
    assert_eq!(&request[2..2 + 16], b"seed.example.org");
    assert_eq!(&request[18..], &8333u16.to_be_bytes());
}

#[tokio::test]
async fn node_connect_direct_when_no_proxy() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = listener.accept().await;
    });

    let connector = Connector::new(NetConfig::default());
    let stream: TcpStream = connector.connect(&addr.to_string(), 8333, true).await.unwrap();
    assert_eq!(stream.peer_addr().unwrap(), addr);
}

#[tokio::test]
async fn node_connect_without_dns_or_name_proxy_fails() {
    let config = NetConfig {
        name_lookup: false,
        ..NetConfig::default()
    };
    let connector = Connector::new(config);

    let err = connector.connect("seed.example.org", 8333, true).await.unwrap_err();
    assert!(matches!(err, NetError::ResolutionFailed(_)));
}

#[tokio::test]
async fn slow_resolver_does_not_stall_runtime() {
    let resolver = |name: &str, _: bool| -> io::Result<Vec<NetworkAddress>> {
        std::thread::sleep(Duration::from_secs(1));
        Err(io::Error::other(format!("{name}: nxdomain")))
    };
    let interrupt = Interrupt::new();
    let connector = Connector::new(NetConfig::default())
        .with_resolver(Arc::new(resolver))
        .with_interrupt(interrupt.clone());

    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(10)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        interrupt.set();
    });

    let started = Instant::now();
    let err = connector.connect("slow.example.org", 8333, true).await.unwrap_err();
    assert!(matches!(err, NetError::Interrupted), "{err}");
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(ticks.load(Ordering::SeqCst) > 0);
}
