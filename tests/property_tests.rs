//! Property tests for public address resolution.
//!
//! These check the precedence rules and the purity of the resolver across
//! generated header sets, request targets and bind addresses.

use std::net::{Ipv4Addr, SocketAddr};

use auth_gate::address::{determine_scheme, resolve};
use http::{HeaderMap, HeaderValue};
use proptest::prelude::*;

// Strategy: DNS-style host names
fn arb_host() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,10}(\\.[a-z]{2,6}){0,2}").unwrap()
}

fn arb_port() -> impl Strategy<Value = u16> {
    1u16..=65535
}

fn arb_scheme() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("http"), Just("https")]
}

// Strategy: "on" with arbitrary letter case
fn arb_ssl_on() -> impl Strategy<Value = String> {
    (any::<bool>(), any::<bool>()).prop_map(|(o, n)| {
        let o = if o { 'O' } else { 'o' };
        let n = if n { 'N' } else { 'n' };
        format!("{o}{n}")
    })
}

fn arb_local() -> impl Strategy<Value = SocketAddr> {
    (any::<[u8; 4]>(), arb_port())
        .prop_map(|(ip, port)| SocketAddr::from((Ipv4Addr::from(ip), port)))
}

fn header_map(pairs: &[(&'static str, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.insert(*name, HeaderValue::from_str(value).unwrap());
    }
    map
}

fn expected_port(scheme: &str, port: u16) -> Option<u16> {
    match (scheme, port) {
        ("http", 80) | ("https", 443) => None,
        _ => Some(port),
    }
}

proptest! {
    /// Property: a single valid forwarded-host token decides host and port,
    /// whatever the Host header says.
    #[test]
    fn proptest_forwarded_host_wins(
        forwarded in arb_host(),
        port in arb_port(),
        host_header in prop::option::of(arb_host()),
        local in arb_local(),
    ) {
        let mut pairs = vec![("x-forwarded-host", format!("{forwarded}:{port}"))];
        if let Some(host) = host_header {
            pairs.push(("host", host));
        }
        let addr = resolve(&header_map(&pairs), "/", local, "http").unwrap();

        prop_assert_eq!(addr.host(), forwarded.as_str());
        prop_assert_eq!(addr.port(), expected_port("http", port));
    }

    /// Property: only the first forwarded-host token is used.
    #[test]
    fn proptest_forwarded_host_first_token(
        first in arb_host(),
        rest in prop::collection::vec(arb_host(), 1..4),
        port in arb_port(),
    ) {
        let value = std::iter::once(format!("  {first}:{port} "))
            .chain(rest)
            .collect::<Vec<_>>()
            .join(",");
        let headers = header_map(&[("x-forwarded-host", value)]);
        let local = "127.0.0.1:1".parse().unwrap();
        let addr = resolve(&headers, "/", local, "http").unwrap();

        prop_assert_eq!(addr.host(), first.as_str());
        prop_assert_eq!(addr.port(), expected_port("http", port));
    }

    /// Property: forwarded SSL "on" in any case forces https over the
    /// forwarded protocol.
    #[test]
    fn proptest_forwarded_ssl_forces_https(
        on in arb_ssl_on(),
        proto in prop::option::of(arb_scheme()),
    ) {
        let mut pairs = vec![("x-forwarded-ssl", on)];
        if let Some(proto) = proto {
            pairs.push(("x-forwarded-proto", proto.to_owned()));
        }
        prop_assert_eq!(determine_scheme(&header_map(&pairs), "http"), "https");
    }

    /// Property: with only a Host header, the address is the default scheme
    /// plus that host.
    #[test]
    fn proptest_host_header_fallback(host in arb_host(), local in arb_local()) {
        let headers = header_map(&[("host", host.clone())]);
        let addr = resolve(&headers, "/index.html", local, "http").unwrap();
        prop_assert_eq!(addr.to_string(), format!("http://{host}"));
    }

    /// Property: the local address tier omits exactly the scheme's default port.
    #[test]
    fn proptest_local_address_port_omission(
        scheme in arb_scheme(),
        ip in any::<[u8; 4]>(),
        port in prop_oneof![Just(80u16), Just(443u16), arb_port()],
    ) {
        let local = SocketAddr::from((Ipv4Addr::from(ip), port));
        let addr = resolve(&HeaderMap::new(), "/", local, scheme).unwrap();

        prop_assert_eq!(addr.scheme(), scheme);
        prop_assert_eq!(addr.host(), Ipv4Addr::from(ip).to_string());
        prop_assert_eq!(addr.port(), expected_port(scheme, port));
    }

    /// Property: an absolute request target beats the Host header and keeps
    /// its own scheme.
    #[test]
    fn proptest_absolute_target_beats_host_header(
        scheme in arb_scheme(),
        target_host in arb_host(),
        port in arb_port(),
        host_header in arb_host(),
    ) {
        let target = format!("{scheme}://{target_host}:{port}/some/path?q=1");
        let headers = header_map(&[("host", host_header)]);
        let local = "127.0.0.1:1".parse().unwrap();
        let addr = resolve(&headers, &target, local, "http").unwrap();

        prop_assert_eq!(addr.scheme(), scheme);
        prop_assert_eq!(addr.host(), target_host.as_str());
        prop_assert_eq!(addr.port(), expected_port(scheme, port));
    }

    /// Property: resolution is a pure function of its inputs.
    #[test]
    fn proptest_resolution_is_idempotent(
        forwarded in prop::option::of((arb_host(), arb_port())),
        host_header in prop::option::of(arb_host()),
        proto in prop::option::of(arb_scheme()),
        absolute in any::<bool>(),
        local in arb_local(),
    ) {
        let mut pairs = Vec::new();
        if let Some((host, port)) = forwarded {
            pairs.push(("x-forwarded-host", format!("{host}:{port}")));
        }
        if let Some(host) = host_header {
            pairs.push(("host", host));
        }
        if let Some(proto) = proto {
            pairs.push(("x-forwarded-proto", proto.to_owned()));
        }
        let headers = header_map(&pairs);
        let target = if absolute { "http://origin.example.com:8080/x" } else { "/x" };

        let first = resolve(&headers, target, local, "http").unwrap();
        let second = resolve(&headers, target, local, "http").unwrap();
        prop_assert_eq!(first, second);
    }
}

#[test]
fn wildcard_bind_on_https_omits_port() {
    let bind = "0.0.0.0:443".parse().unwrap();
    let addr = resolve(&HeaderMap::new(), "/", bind, "https").unwrap();
    assert_eq!(addr.to_string(), "https://0.0.0.0");
}

#[test]
fn host_header_example() {
    let headers = header_map(&[("host", "example.com".to_owned())]);
    let local = "10.1.1.1:5050".parse().unwrap();
    let addr = resolve(&headers, "/", local, "http").unwrap();
    assert_eq!(addr.to_string(), "http://example.com");
    assert_eq!(addr.port(), None);
}
