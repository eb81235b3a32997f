//! Request gates, in the order they run:
//!
//! 1. network allow-list (at accept time, drops the connection)
//! 2. credentials
//! 3. write permission
//! 4. root availability

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use axum_server::accept::{Accept, DefaultAcceptor};
use futures::future::{self, Either, Ready};
use ipnet::IpNet;
use sharefs_common::Credentials;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::fs::FileSystem;
use crate::routes::error_body;

/// Permitted client networks. Empty means unrestricted.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ranges: Vec<IpNet>,
}

impl AllowList {
    pub fn new(ranges: Vec<IpNet>) -> Self {
        AllowList { ranges }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Loopback peers are always admitted.
    pub fn permits(&self, addr: IpAddr) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        let addr = addr.to_canonical();
        addr.is_loopback() || self.ranges.iter().any(|range| range.contains(&addr))
    }
}

/// Configured accounts. Empty means credentials are not checked.
#[derive(Debug, Clone, Default)]
pub struct AccountSet {
    accounts: Vec<Credentials>,
}

impl AccountSet {
    pub fn new(accounts: Vec<Credentials>) -> Self {
        AccountSet { accounts }
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn validate(&self, presented: &Credentials) -> Option<&Credentials> {
        self.accounts.iter().find(|account| *account == presented)
    }
}

/// Immutable access policy captured at startup.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub allow_list: AllowList,
    pub accounts: AccountSet,
    pub read_only: bool,
    pub realm: String,
}

/// Per-request state produced by the credential gate.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub account: Option<Credentials>,
}

impl RequestContext {
    pub fn account_name(&self) -> &str {
        self.account.as_ref().map(|a| a.name.as_str()).unwrap_or("-")
    }
}

/// Wraps the transport acceptor and drops connections from peers outside
/// the allow-list before any bytes are read.
#[derive(Debug, Clone)]
pub struct AllowListAcceptor<A = DefaultAcceptor> {
    inner: A,
    allow_list: Arc<AllowList>,
}

impl AllowListAcceptor {
    pub fn new(allow_list: Arc<AllowList>) -> Self {
        AllowListAcceptor {
            inner: DefaultAcceptor::new(),
            allow_list,
        }
    }
}

impl<A> AllowListAcceptor<A> {
    pub fn admits(&self, peer: io::Result<SocketAddr>) -> bool {
        match peer {
            Ok(addr) => self.allow_list.permits(addr.ip()),
            Err(_) => self.allow_list.is_unrestricted(),
        }
    }
}

/// Streams that know the address of the remote peer.
pub trait PeerAddr {
    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

impl PeerAddr for TcpStream {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }
}

impl<A, I, S> Accept<I, S> for AllowListAcceptor<A>
where
    A: Accept<I, S>,
    I: PeerAddr,
{
    type Stream = A::Stream;
    type Service = A::Service;
    type Future = Either<A::Future, Ready<io::Result<(Self::Stream, Self::Service)>>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let peer = stream.peer_addr();
        let peer_label = peer
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|_| "unknown".to_string());
        if self.admits(peer) {
            return Either::Left(self.inner.accept(stream, service));
        }

        warn!(peer = %peer_label, "connection rejected by allow-list");
        drop(stream);
        Either::Right(future::ready(Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "peer not in allow-list",
        ))))
    }
}

pub async fn credential_gate(
    State(policy): State<Arc<Policy>>,
    mut request: Request,
    next: Next,
) -> Response {
    if policy.accounts.is_empty() {
        request.extensions_mut().insert(RequestContext::default());
        return next.run(request).await;
    }

    // A missing or malformed header is checked as the empty pair.
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(Credentials::from_header_value)
        .unwrap_or_default();

    match policy.accounts.validate(&presented) {
        Some(account) => {
            debug!(account = %account.name, "credentials accepted");
            request.extensions_mut().insert(RequestContext {
                account: Some(account.clone()),
            });
            next.run(request).await
        }
        None => {
            warn!(account = %presented.name, "credentials rejected");
            unauthorized(&policy.realm)
        }
    }
}

fn unauthorized(realm: &str) -> Response {
    let mut response = error_body(StatusCode::UNAUTHORIZED, "unauthorized");
    let challenge = format!("Basic realm=\"{}\"", realm.replace('"', "'"));
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

pub fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::DELETE | Method::PATCH
    )
}

pub async fn write_gate(
    State(policy): State<Arc<Policy>>,
    request: Request,
    next: Next,
) -> Response {
    if policy.read_only && is_mutating(request.method()) {
        warn!(method = %request.method(), path = %request.uri().path(), "write rejected in read-only mode");
        return error_body(StatusCode::FORBIDDEN, "server is read-only");
    }
    next.run(request).await
}

pub async fn root_gate(
    State(fs): State<Arc<FileSystem>>,
    request: Request,
    next: Next,
) -> Response {
    if !fs.root_available().await {
        warn!(root = %fs.resolver().root().display(), "shared root is unavailable");
        return error_body(StatusCode::SERVICE_UNAVAILABLE, "shared root unavailable");
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_allow_list_is_unrestricted() {
        let list = AllowList::default();
        assert!(list.permits("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn test_allow_list_ranges() {
        let list = AllowList::new(vec![net("10.0.0.0/8"), net("2001:db8::/32")]);
        assert!(list.permits("10.1.2.3".parse().unwrap()));
        assert!(list.permits("2001:db8::1".parse().unwrap()));
        assert!(!list.permits("192.168.1.1".parse().unwrap()));
        assert!(!list.permits("2001:db9::1".parse().unwrap()));
    }

    #[test]
    fn test_loopback_always_permitted() {
        let list = AllowList::new(vec![net("10.0.0.0/8")]);
        assert!(list.permits("127.0.0.1".parse().unwrap()));
        assert!(list.permits("::1".parse().unwrap()));
    }

    #[test]
    fn test_mapped_ipv4_is_compared_as_ipv4() {
        let list = AllowList::new(vec![net("10.0.0.0/8")]);
        assert!(list.permits("::ffff:10.0.0.7".parse().unwrap()));
        assert!(!list.permits("::ffff:11.0.0.7".parse().unwrap()));
    }

    #[test]
    fn test_acceptor_admission() {
        let acceptor = AllowListAcceptor::new(Arc::new(AllowList::new(vec![net("10.0.0.0/8")])));
        assert!(acceptor.admits(Ok("10.9.9.9:4000".parse().unwrap())));
        assert!(!acceptor.admits(Ok("198.51.100.2:4000".parse().unwrap())));
        assert!(!acceptor.admits(Err(io::Error::other("gone"))));

        let open = AllowListAcceptor::new(Arc::new(AllowList::default()));
        assert!(open.admits(Err(io::Error::other("gone"))));
    }

    #[tokio::test]
    async fn test_acceptor_passes_loopback_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (stream, _) = listener.accept().await.unwrap();
        let _client = connect.await.unwrap();

        let acceptor = AllowListAcceptor::new(Arc::new(AllowList::new(vec![net("10.0.0.0/8")])));
        let accepted = acceptor.accept(stream, ()).await;
        assert!(accepted.is_ok());
    }

    struct FakeStream(io::Result<SocketAddr>);

    impl PeerAddr for FakeStream {
        fn peer_addr(&self) -> io::Result<SocketAddr> {
            match &self.0 {
                Ok(addr) => Ok(*addr),
                Err(err) => Err(io::Error::new(err.kind(), err.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_acceptor_refuses_peer_outside_allow_list() {
        let acceptor = AllowListAcceptor::new(Arc::new(AllowList::new(vec![net("10.0.0.0/8")])));

        let refused = acceptor
            .accept(FakeStream(Ok("198.51.100.2:4000".parse().unwrap())), ())
            .await;
        assert_eq!(
            refused.err().map(|err| err.kind()),
            Some(io::ErrorKind::PermissionDenied)
        );

        let unknown = acceptor
            .accept(FakeStream(Err(io::Error::other("gone"))), ())
            .await;
        assert!(unknown.is_err());

        let admitted = acceptor
            .accept(FakeStream(Ok("10.1.2.3:4000".parse().unwrap())), ())
            .await;
        assert!(admitted.is_ok());
    }

    #[test]
    fn test_account_validation_is_exact() {
        let accounts = AccountSet::new(vec![Credentials::new("alice", "pw")]);
        assert!(accounts.validate(&Credentials::new("alice", "pw")).is_some());
        assert!(accounts.validate(&Credentials::new("alice", "PW")).is_none());
        assert!(accounts.validate(&Credentials::default()).is_none());
    }

    #[test]
    fn test_mutating_methods() {
        assert!(is_mutating(&Method::PUT));
        assert!(is_mutating(&Method::DELETE));
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::HEAD));
    }
}
