//! Shared validity record for capsules issued from views.
//!
//! Zero-copy capsules may be moved to other threads, so they cannot borrow
//! the hook that issued them. Instead each one holds an
//! `Arc<ExposureWindow>` plus the window number it was issued in. The hook
//! advances the window whenever it refreshes its views and closes it on
//! teardown; a capsule checks its stamp on every access.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dlext_core::{ArrayKind, ExecutionSpace, ParticleProperty, StaleReason};
use smallvec::SmallVec;

/// Window number a capsule was issued in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowStamp(pub u64);

impl fmt::Display for WindowStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Window counter, teardown flag and write leases.
#[derive(Debug)]
pub struct ExposureWindow {
    current: AtomicU64,
    closed: AtomicBool,
    leases: Vec<AtomicBool>,
}

impl ExposureWindow {
    /// A fresh, open window.
    pub fn new() -> Arc<Self> {
        let slots = ArrayKind::COUNT * ExecutionSpace::ALL.len();
        Arc::new(Self {
            current: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            leases: (0..slots).map(|_| AtomicBool::new(false)).collect(),
        })
    }

    /// The current window.
    pub fn stamp(&self) -> WindowStamp {
        WindowStamp(self.current.load(Ordering::Acquire))
    }

    /// Start a new window, invalidating every stamp issued so far.
    pub fn advance(&self) -> WindowStamp {
        WindowStamp(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Close the window for good.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether a capsule issued at `stamp` is still backed by stable memory.
    pub fn check(&self, stamp: WindowStamp) -> Result<(), StaleReason> {
        if self.is_closed() {
            return Err(StaleReason::TornDown);
        }
        if self.stamp() != stamp {
            return Err(StaleReason::WindowAdvanced);
        }
        Ok(())
    }

    /// Take the exclusive write lease for every engine array behind
    /// `property` in `space`, or `None` if any of them is already leased.
    ///
    /// Composite properties share columns with their plain counterparts,
    /// so a writable `positions` excludes a writable `positions_types`.
    /// On conflict, arrays taken so far are released again.
    pub fn try_lease(
        self: &Arc<Self>,
        property: ParticleProperty,
        space: ExecutionSpace,
    ) -> Option<WriteLease> {
        let mut lease = WriteLease {
            window: Arc::clone(self),
            slots: SmallVec::new(),
            property,
            space,
        };
        for &kind in property.arrays() {
            let slot = slot(kind, space);
            self.leases[slot]
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .ok()?;
            lease.slots.push(slot);
        }
        Some(lease)
    }

    /// Whether `kind` in `space` is currently leased.
    pub fn is_leased(&self, kind: ArrayKind, space: ExecutionSpace) -> bool {
        self.leases[slot(kind, space)].load(Ordering::Acquire)
    }
}

fn slot(kind: ArrayKind, space: ExecutionSpace) -> usize {
    kind.index() * ExecutionSpace::ALL.len() + space.index()
}

/// Exclusive right to expose one property in one space as read-write.
///
/// Holds every engine array the property reads. Released on drop.
#[derive(Debug)]
#[must_use]
pub struct WriteLease {
    window: Arc<ExposureWindow>,
    slots: SmallVec<[usize; 2]>,
    property: ParticleProperty,
    space: ExecutionSpace,
}

impl WriteLease {
    /// The leased property.
    pub fn property(&self) -> ParticleProperty {
        self.property
    }

    /// The leased space.
    pub fn space(&self) -> ExecutionSpace {
        self.space
    }
}

impl Drop for WriteLease {
    fn drop(&mut self) {
        for &slot in &self.slots {
            self.window.leases[slot].store(false, Ordering::Release);
        }
    }
}

// Capsules carry window handles and leases across threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ExposureWindow>();
    assert::<WriteLease>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_invalidates_old_stamps() {
        let w = ExposureWindow::new();
        let s0 = w.stamp();
        assert_eq!(w.check(s0), Ok(()));
        let s1 = w.advance();
        assert_eq!(w.check(s0), Err(StaleReason::WindowAdvanced));
        assert_eq!(w.check(s1), Ok(()));
    }

    #[test]
    fn close_wins_over_current_stamp() {
        let w = ExposureWindow::new();
        let s = w.stamp();
        w.close();
        assert_eq!(w.check(s), Err(StaleReason::TornDown));
    }

    #[test]
    fn lease_is_exclusive_per_array_and_space() {
        let w = ExposureWindow::new();
        let lease = w
            .try_lease(ParticleProperty::Forces, ExecutionSpace::Host)
            .unwrap();
        assert!(w
            .try_lease(ParticleProperty::Forces, ExecutionSpace::Host)
            .is_none());
        let other = w.try_lease(ParticleProperty::Forces, ExecutionSpace::Device);
        assert!(other.is_some());
        let other = w.try_lease(ParticleProperty::Positions, ExecutionSpace::Host);
        assert!(other.is_some());

        assert!(w.is_leased(ArrayKind::Forces, ExecutionSpace::Host));
        drop(lease);
        assert!(!w.is_leased(ArrayKind::Forces, ExecutionSpace::Host));
        assert!(w
            .try_lease(ParticleProperty::Forces, ExecutionSpace::Host)
            .is_some());
    }

    #[test]
    fn composite_conflicts_with_shared_column() {
        let w = ExposureWindow::new();
        let host = ExecutionSpace::Host;
        let x = w.try_lease(ParticleProperty::Positions, host).unwrap();
        assert!(w.try_lease(ParticleProperty::PositionsTypes, host).is_none());
        // The failed attempt must not leave the packed type column held.
        assert!(!w.is_leased(ArrayKind::PackedTypes, host));
        drop(x);

        let nf = w.try_lease(ParticleProperty::NetForces, host).unwrap();
        assert!(w.is_leased(ArrayKind::Forces, host));
        assert!(w.is_leased(ArrayKind::Energies, host));
        assert!(w.try_lease(ParticleProperty::Forces, host).is_none());
        drop(nf);
        assert!(!w.is_leased(ArrayKind::Energies, host));
        assert!(w.try_lease(ParticleProperty::Forces, host).is_some());
    }

    #[test]
    fn lease_released_from_another_thread() {
        let w = ExposureWindow::new();
        let lease = w
            .try_lease(ParticleProperty::Tags, ExecutionSpace::Host)
            .unwrap();
        std::thread::spawn(move || drop(lease)).join().unwrap();
        assert!(!w.is_leased(ArrayKind::Tags, ExecutionSpace::Host));
    }
}
