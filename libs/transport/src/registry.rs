//! Transport Registry
//!
//! Process-wide name→constructor map selecting a backend at startup.
//! The map lives behind a lock-protected lazy initializer seeded with
//! the built-in backends; external backends join via `register`.

use config::Args;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use crate::error::{Result, TransportError};
use crate::transports::{MpiTransport, NoTransport, TcpTransport, Transport};

/// Constructor signature stored in the registry.
pub type Factory = fn(&Args) -> Result<Box<dyn Transport>>;

static REGISTRY: Lazy<Mutex<BTreeMap<&'static str, Factory>>> = Lazy::new(|| {
    let mut builders: BTreeMap<&'static str, Factory> = BTreeMap::new();
    builders.insert("none", NoTransport::from_args as Factory);
    builders.insert("mpi", MpiTransport::from_args as Factory);
    builders.insert("tcp", TcpTransport::from_args as Factory);
    Mutex::new(builders)
});

/// Register an additional backend under `name`. Overwrites any previous
/// factory with the same name.
pub fn register(name: &'static str, factory: Factory) {
    REGISTRY.lock().insert(name, factory);
}

/// Names currently registered, sorted.
pub fn names() -> Vec<&'static str> {
    REGISTRY.lock().keys().copied().collect()
}

/// Construct the backend selected by the `transport` key of `args`
/// (default "none"). An unknown name is a configuration error listing
/// the valid names.
pub fn create(args: &Args) -> Result<Box<dyn Transport>> {
    let name: String = args.get_or("transport", "none".to_string());

    let factory = {
        let registry = REGISTRY.lock();
        registry.get(name.as_str()).copied()
    };

    match factory {
        Some(factory) => factory(args),
        None => Err(TransportError::configuration(
            format!(
                "unknown transport '{}', valid transports are: {}",
                name,
                names().join(", ")
            ),
            Some("transport"),
        )),
    }
}
