//! Session registry: maps telephony connections and call sids to bridges.

mod registry;

pub use registry::{BridgeHandle, SessionKey, SessionRegistry, TelephonyLink};
