#![forbid(unsafe_code)]

pub mod endpoint {
	use std::net::SocketAddr;
	use std::num::NonZeroU16;

	/// URL scheme accepted by [`WsEndpoint::parse`].
	pub const WS_SCHEME: &str = "ws://";

	/// Parsed `ws://host:port` endpoint.
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct WsEndpoint {
		pub host: String,
		pub port: u16,
	}

	impl WsEndpoint {
		/// Returns `host:port` (host preserved, IPv6 stays bracketed).
		pub fn hostport(&self) -> String {
			format!("{}:{}", self.host, self.port)
		}

		/// Returns the endpoint as a `ws://host:port/` URL for a client handshake.
		pub fn url(&self) -> String {
			format!("{WS_SCHEME}{}/", self.hostport())
		}

		/// Resolve without DNS; only IP literal hosts succeed.
		pub fn to_socket_addr_if_ip_literal(&self) -> Result<SocketAddr, String> {
			self.hostport()
				.parse()
				.map_err(|_| format!("{} is not an IP literal; use an address like 127.0.0.1", self.host))
		}

		/// Parse `ws://host:port`. IPv6 hosts must be bracketed; no path, query or fragment.
		pub fn parse(s: &str) -> Result<Self, String> {
			let s = s.trim();
			let authority = s
				.strip_prefix(WS_SCHEME)
				.filter(|a| !a.is_empty())
				.ok_or_else(|| format!("expected {WS_SCHEME}host:port, got {s:?}"))?;

			if let Some(c) = authority.chars().find(|c| matches!(c, '/' | '?' | '#')) {
				return Err(format!("unexpected {c:?} in {s:?}: path, query and fragment are not allowed"));
			}

			let (host, port) = split_host_port(authority).map_err(|why| format!("{why} in {s:?}"))?;

			let port = port
				.parse::<NonZeroU16>()
				.map_err(|_| format!("port must be 1..=65535 in {s:?}"))?;

			Ok(Self {
				host: host.to_string(),
				port: port.get(),
			})
		}
	}

	fn split_host_port(authority: &str) -> Result<(&str, &str), &'static str> {
		let (host, port) = match authority.strip_prefix('[') {
			Some(rest) => {
				let (addr, tail) = rest.split_once(']').ok_or("unterminated IPv6 bracket")?;
				let port = tail.strip_prefix(':').ok_or("missing :port")?;
				(&authority[..addr.len() + 2], port)
			}
			None => {
				let (host, port) = authority.rsplit_once(':').ok_or("missing :port")?;
				if host.contains(':') {
					return Err("IPv6 host must be bracketed like [::1]");
				}
				(host.trim(), port)
			}
		};

		if host.is_empty() || host == "[]" {
			return Err("missing host");
		}
		Ok((host, port.trim()))
	}

}
