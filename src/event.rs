//! Event values and their runtime type identity.
//!
//! Any `'static` value that can cross a thread boundary is an event; there is
//! nothing to implement. On publication the value is moved into an
//! [`ErasedEvent`], a type-erased container tagged with the [`TypeKey`] of the
//! original type. Dispatch recovers the typed value with a key-guarded
//! downcast.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use downcast_rs::{impl_downcast, Downcast};

/// Marker trait for publishable event values.
///
/// Automatically implemented for every `T: Any + Send`. Events are carried by
/// value: publication moves them into the center, and subscribers observe them
/// by shared reference.
pub trait Event: Downcast + Send {}

impl_downcast!(Event);

impl<T: Any + Send> Event for T {}

/// Process-run-stable identity of an event type, usable as a map key.
///
/// Equality and hashing consider only the underlying [`TypeId`]; the type name
/// is carried solely for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key of the event type `E`.
    pub fn of<E: Event>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: type_name::<E>(),
        }
    }

    /// Returns the full type name of the keyed event type.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A published event value with its compile-time type erased.
///
/// Built once per publication, then moved through the handoff buffer and the
/// time queue without further allocation.
pub struct ErasedEvent {
    key: TypeKey,
    value: Box<dyn Event>,
}

impl ErasedEvent {
    /// Erases `event`, recording the [`TypeKey`] of `E`.
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            key: TypeKey::of::<E>(),
            value: Box::new(event),
        }
    }

    /// Returns the identity of the erased type.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Recovers a typed view of the value.
    ///
    /// The stored key is checked before the downcast; a mismatch yields `None`.
    /// The guard exists to contain corrupted dispatch and is unreachable under
    /// correct use.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        if self.key != TypeKey::of::<E>() {
            return None;
        }
        self.value.downcast_ref::<E>()
    }
}

impl fmt::Debug for ErasedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedEvent").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn assert_send<T: Send>() {}

    const _: () = {
        assert_send::<ErasedEvent>();
        assert_send::<TypeKey>();
    };

    #[derive(Debug, PartialEq)]
    struct Ping(u32);

    #[derive(Debug)]
    struct Pong;

    #[test]
    fn key_identity_per_type() {
        assert_eq!(TypeKey::of::<Ping>(), TypeKey::of::<Ping>());
        assert_ne!(TypeKey::of::<Ping>(), TypeKey::of::<Pong>());
    }

    #[test]
    fn key_name_is_diagnostic_only() {
        assert!(TypeKey::of::<Ping>().name().contains("Ping"));
        assert!(TypeKey::of::<Ping>().to_string().contains("Ping"));
    }

    #[test]
    fn erase_and_recover() {
        let event = ErasedEvent::new(Ping(7));
        assert_eq!(event.key(), TypeKey::of::<Ping>());
        assert_eq!(event.downcast_ref::<Ping>(), Some(&Ping(7)));
    }

    #[test]
    fn guarded_downcast_rejects_other_types() {
        let event = ErasedEvent::new(Ping(7));
        assert!(event.downcast_ref::<Pong>().is_none());
    }
}
