use serde::{Deserialize, Serialize};

/// Identity of a transmitting station. Zero is reserved for "no frame pending".
pub type StationId = u64;

/// What a signal on the bus carries.
///
/// Overlapping data signals combine additively, so a `Data` identity that does
/// not belong to any station is the trace of a collision. `Jam` absorbs
/// everything it overlaps with.
///
/// Identity sums wrap at `u64::MAX`. Repeated merges in a collision storm
/// outgrow any fixed width, and a wrapped sum still differs from its
/// neighbours, so merging carries on as it would with unbounded integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    Data(StationId),
    Jam,
}

impl SignalKind {
    /// Superposition of two signals sharing a slot. The sum wraps.
    pub fn combine(self, other: SignalKind) -> SignalKind {
        match (self, other) {
            (SignalKind::Data(a), SignalKind::Data(b)) => SignalKind::Data(a.wrapping_add(b)),
            _ => SignalKind::Jam,
        }
    }

    pub fn is_jam(self) -> bool {
        matches!(self, SignalKind::Jam)
    }

    pub fn data_id(self) -> Option<StationId> {
        match self {
            SignalKind::Data(id) => Some(id),
            SignalKind::Jam => None,
        }
    }
}

/// A signal occupying one bus slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub lifetime: u32,
    pub decaying: bool,
}

impl Signal {
    pub fn new(kind: SignalKind, lifetime: u32) -> Self {
        Self {
            kind,
            lifetime,
            decaying: false,
        }
    }

    pub fn data(id: StationId, lifetime: u32) -> Self {
        Self::new(SignalKind::Data(id), lifetime)
    }

    pub fn jam(lifetime: u32) -> Self {
        Self::new(SignalKind::Jam, lifetime)
    }

    pub fn is_jam(&self) -> bool {
        self.kind.is_jam()
    }

    /// A slot holding this signal is cleared on the next propagation pass.
    pub fn is_expiring(&self) -> bool {
        self.lifetime < 2
    }

    /// One propagation step later. The signal stops spawning copies from now on.
    #[must_use]
    pub fn decay(self) -> Signal {
        Signal {
            kind: self.kind,
            lifetime: self.lifetime.saturating_sub(1),
            decaying: true,
        }
    }

    /// Fresh, still-spreading copy for a neighbouring slot.
    #[must_use]
    pub fn spread(self) -> Signal {
        Signal::new(self.kind, self.lifetime)
    }

    /// Merge `self`, the actively propagating signal, into `other`.
    ///
    /// The result keeps the lifetime of `self` and starts spreading again.
    #[must_use]
    pub fn merge(self, other: Signal) -> Signal {
        debug_assert!(!self.decaying, "only a spreading signal can merge into a slot");
        Signal::new(self.kind.combine(other.kind), self.lifetime)
    }
}
