#![forbid(unsafe_code)]

use parley_domain::{ConnectionId, DisplayName};
use proptest::prelude::*;

use crate::server::registry::ConnectionRegistry;

fn name(s: &str) -> DisplayName {
	DisplayName::new(s).expect("valid DisplayName")
}

#[test]
fn snapshot_is_in_join_order() {
	let mut reg = ConnectionRegistry::new();
	let (a, b, c) = (ConnectionId::new_v4(), ConnectionId::new_v4(), ConnectionId::new_v4());

	reg.register(a, name("alice"));
	reg.register(b, name("bob"));
	reg.register(c, name("carol"));

	assert_eq!(reg.snapshot(), vec![name("alice"), name("bob"), name("carol")]);
	assert_eq!(reg.len(), 3);
}

#[test]
fn unregister_keeps_remaining_order() {
	let mut reg = ConnectionRegistry::new();
	let (a, b, c) = (ConnectionId::new_v4(), ConnectionId::new_v4(), ConnectionId::new_v4());
	reg.register(a, name("alice"));
	reg.register(b, name("bob"));
	reg.register(c, name("carol"));

	assert_eq!(reg.unregister(&b), Some(name("bob")));
	assert_eq!(reg.snapshot(), vec![name("alice"), name("carol")]);
	assert!(!reg.contains(&b));
}

#[test]
fn unregister_unknown_is_not_found() {
	let mut reg = ConnectionRegistry::new();
	assert_eq!(reg.unregister(&ConnectionId::new_v4()), None);
	assert!(reg.is_empty());
}

#[test]
fn register_twice_renames_in_place() {
	let mut reg = ConnectionRegistry::new();
	let (a, b) = (ConnectionId::new_v4(), ConnectionId::new_v4());
	reg.register(a, name("alice"));
	reg.register(b, name("bob"));

	assert_eq!(reg.register(a, name("alicia")), Some(name("alice")));
	assert_eq!(reg.snapshot(), vec![name("alicia"), name("bob")]);
	assert_eq!(reg.display_name(&a), Some(&name("alicia")));
	assert_eq!(reg.len(), 2);
}

#[test]
fn duplicate_names_are_allowed() {
	let mut reg = ConnectionRegistry::new();
	reg.register(ConnectionId::new_v4(), name("sam"));
	reg.register(ConnectionId::new_v4(), name("sam"));
	assert_eq!(reg.snapshot(), vec![name("sam"), name("sam")]);
}

proptest! {
	#[test]
	fn snapshot_tracks_model(ops in prop::collection::vec((any::<bool>(), 0usize..6, "[a-z]{1,5}"), 0..64)) {
		let ids: Vec<ConnectionId> = (0..6).map(|_| ConnectionId::new_v4()).collect();
		let mut reg = ConnectionRegistry::new();
		let mut model: Vec<(ConnectionId, String)> = Vec::new();

		for (is_join, idx, n) in ops {
			let id = ids[idx];
			if is_join {
				reg.register(id, name(&n));
				match model.iter_mut().find(|(m, _)| *m == id) {
					Some(entry) => entry.1 = n,
					None => model.push((id, n)),
				}
			} else {
				let removed = reg.unregister(&id);
				let pos = model.iter().position(|(m, _)| *m == id);
				prop_assert_eq!(removed.is_some(), pos.is_some());
				if let Some(pos) = pos {
					model.remove(pos);
				}
			}

			let expected: Vec<DisplayName> = model.iter().map(|(_, n)| name(n)).collect();
			prop_assert_eq!(reg.len(), model.len());
			prop_assert_eq!(reg.snapshot(), expected);
		}
	}
}
