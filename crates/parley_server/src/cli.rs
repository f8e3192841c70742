#![forbid(unsafe_code)]

use std::net::SocketAddr;

use parley_util::endpoint::WsEndpoint;

pub const DEFAULT_BIND_ENDPOINT: &str = "ws://127.0.0.1:5000";

pub const USAGE: &str = "\
Usage: parley_server [--bind ws://host:port]

Options:
	--bind    Bind endpoint (default: ws://127.0.0.1:5000); --listen is an alias
	--help    Show this help
";

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	Serve { bind: SocketAddr },
	Help,
}

/// Parse arguments (without the program name). The bind host must be an IP literal.
pub fn parse_command<I>(args: I) -> Result<Command, String>
where
	I: IntoIterator<Item = String>,
{
	let mut bind = None;

	let mut args = args.into_iter();
	while let Some(arg) = args.next() {
		match arg.as_str() {
			"--help" | "-h" => return Ok(Command::Help),
			"--bind" | "--listen" => {
				let value = args
					.next()
					.filter(|v| !v.trim().is_empty())
					.ok_or_else(|| format!("{arg} needs a value like {DEFAULT_BIND_ENDPOINT}"))?;
				bind = Some(value);
			}
			other => return Err(format!("unknown argument: {other}")),
		}
	}

	let endpoint = WsEndpoint::parse(bind.as_deref().unwrap_or(DEFAULT_BIND_ENDPOINT))?;
	let bind = endpoint.to_socket_addr_if_ip_literal()?;
	Ok(Command::Serve { bind })
}
