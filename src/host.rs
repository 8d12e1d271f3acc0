//! Packet interception boundary
//!
//! The shield never talks to a concrete packet framework. It registers a
//! callback through [`PacketHost`] and relies on one contract: every matching
//! packet is delivered once, before normal processing, and the returned
//! [`Verdict`] is honored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{Result, ShieldError};
use crate::lock_utils::{read_lock_or_recover, write_lock_or_recover};
use crate::packet::InboundPacket;

/// Per-packet decision returned to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Continue normal processing
    Accept,
    /// Discard; no further processing
    Drop,
}

/// Address family a hook is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFamily {
    Ipv4,
}

/// Inspection point within the host's pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before routing
    PreRouting,
    /// Packets destined to this host
    LocalIn,
}

/// Where and how early a callback runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookRegistration {
    pub family: HookFamily,
    pub point: HookPoint,
    /// Lower runs first
    pub priority: i32,
}

impl HookRegistration {
    /// IPv4, locally destined, ahead of every other hook
    pub fn local_in_first() -> Self {
        Self {
            family: HookFamily::Ipv4,
            point: HookPoint::LocalIn,
            priority: i32::MIN,
        }
    }
}

/// Callback invoked for every delivered packet
pub trait PacketCallback: Send + Sync {
    fn on_packet(&self, packet: &InboundPacket) -> Verdict;
}

/// Opaque registration handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle(u64);

/// Host packet-interception framework
pub trait PacketHost: Send + Sync {
    fn register(
        &self,
        registration: HookRegistration,
        callback: Arc<dyn PacketCallback>,
    ) -> Result<HookHandle>;

    fn deregister(&self, handle: HookHandle) -> Result<()>;
}

struct RegisteredHook {
    handle: HookHandle,
    registration: HookRegistration,
    callback: Arc<dyn PacketCallback>,
}

/// In-process host: packets are injected with [`InMemoryHost::deliver`] and
/// run through the registered callbacks in priority order.
#[derive(Default)]
pub struct InMemoryHost {
    hooks: RwLock<Vec<RegisteredHook>>,
    next_handle: AtomicU64,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `packet` through every local-in IPv4 hook. The first `Drop` wins;
    /// with no hooks registered the packet is accepted.
    pub fn deliver(&self, packet: &InboundPacket) -> Verdict {
        // Callbacks run outside the lock so a hook may (de)register others
        let callbacks: Vec<Arc<dyn PacketCallback>> = read_lock_or_recover(&self.hooks, "packet hooks")
            .iter()
            .filter(|hook| hook.registration.point == HookPoint::LocalIn)
            .map(|hook| Arc::clone(&hook.callback))
            .collect();

        for callback in callbacks {
            if callback.on_packet(packet) == Verdict::Drop {
                return Verdict::Drop;
            }
        }

        Verdict::Accept
    }

    /// Number of registered hooks
    pub fn hook_count(&self) -> usize {
        read_lock_or_recover(&self.hooks, "packet hooks").len()
    }
}

impl PacketHost for InMemoryHost {
    fn register(
        &self,
        registration: HookRegistration,
        callback: Arc<dyn PacketCallback>,
    ) -> Result<HookHandle> {
        let handle = HookHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut hooks = write_lock_or_recover(&self.hooks, "packet hooks");

        // Stable sort keeps registration order among equal priorities
        let position = hooks.partition_point(|hook| hook.registration.priority <= registration.priority);
        hooks.insert(
            position,
            RegisteredHook {
                handle,
                registration,
                callback,
            },
        );

        Ok(handle)
    }

    fn deregister(&self, handle: HookHandle) -> Result<()> {
        let mut hooks = write_lock_or_recover(&self.hooks, "packet hooks");
        let before = hooks.len();
        hooks.retain(|hook| hook.handle != handle);

        if hooks.len() == before {
            return Err(ShieldError::Config(format!(
                "hook {:?} is not registered",
                handle
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Fixed {
        verdict: Verdict,
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl PacketCallback for Fixed {
        fn on_packet(&self, _packet: &InboundPacket) -> Verdict {
            self.seen.lock().unwrap().push(self.name);
            self.verdict
        }
    }

    fn hook(verdict: Verdict, name: &'static str, seen: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn PacketCallback> {
        Arc::new(Fixed {
            verdict,
            name,
            seen: Arc::clone(seen),
        })
    }

    fn with_priority(priority: i32) -> HookRegistration {
        HookRegistration {
            priority,
            ..HookRegistration::local_in_first()
        }
    }

    #[test]
    fn test_no_hooks_accepts() {
        let host = InMemoryHost::new();
        assert_eq!(host.deliver(&InboundPacket::new(vec![0x45])), Verdict::Accept);
    }

    #[test]
    fn test_priority_order_and_first_drop_wins() {
        let host = InMemoryHost::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        host.register(with_priority(100), hook(Verdict::Accept, "late", &seen))
            .unwrap();
        host.register(with_priority(0), hook(Verdict::Drop, "middle", &seen))
            .unwrap();
        host.register(HookRegistration::local_in_first(), hook(Verdict::Accept, "first", &seen))
            .unwrap();

        assert_eq!(host.deliver(&InboundPacket::new(vec![])), Verdict::Drop);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "middle"]);
    }

    #[test]
    fn test_pre_routing_hooks_are_not_run_at_local_in() {
        let host = InMemoryHost::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registration = HookRegistration {
            point: HookPoint::PreRouting,
            ..HookRegistration::local_in_first()
        };

        host.register(registration, hook(Verdict::Drop, "pre", &seen))
            .unwrap();

        assert_eq!(host.deliver(&InboundPacket::new(vec![])), Verdict::Accept);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_deregister() {
        let host = InMemoryHost::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = host
            .register(HookRegistration::local_in_first(), hook(Verdict::Drop, "x", &seen))
            .unwrap();

        host.deregister(handle).unwrap();
        assert_eq!(host.hook_count(), 0);
        assert_eq!(host.deliver(&InboundPacket::new(vec![])), Verdict::Accept);

        // Second deregistration is reported
        assert!(host.deregister(handle).is_err());
    }
}
