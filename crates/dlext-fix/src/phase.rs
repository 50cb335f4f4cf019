//! Step phases a fix can be called at, with LAMMPS `FixConst` bit values.

use std::fmt;
use std::str::FromStr;

/// One point in the engine's timestep at which registered fixes run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before the first half of velocity Verlet.
    InitialIntegrate,
    /// After the first half of velocity Verlet.
    PostIntegrate,
    /// Before particles migrate between domains.
    PreExchange,
    /// Before neighbor lists are rebuilt.
    PreNeighbor,
    /// After neighbor lists are rebuilt.
    PostNeighbor,
    /// Before forces are computed.
    PreForce,
    /// Before reverse communication of ghost forces.
    PreReverse,
    /// After forces are computed.
    PostForce,
    /// Second half of velocity Verlet.
    FinalIntegrate,
    /// After the step has completed.
    EndOfStep,
}

impl Phase {
    /// All phases in the order the engine visits them.
    pub const ALL: [Phase; 10] = [
        Phase::InitialIntegrate,
        Phase::PostIntegrate,
        Phase::PreExchange,
        Phase::PreNeighbor,
        Phase::PostNeighbor,
        Phase::PreForce,
        Phase::PreReverse,
        Phase::PostForce,
        Phase::FinalIntegrate,
        Phase::EndOfStep,
    ];

    /// The `FixConst` mask bit.
    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    /// The LAMMPS method name, e.g. `post_force`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::InitialIntegrate => "initial_integrate",
            Self::PostIntegrate => "post_integrate",
            Self::PreExchange => "pre_exchange",
            Self::PreNeighbor => "pre_neighbor",
            Self::PostNeighbor => "post_neighbor",
            Self::PreForce => "pre_force",
            Self::PreReverse => "pre_reverse",
            Self::PostForce => "post_force",
            Self::FinalIntegrate => "final_integrate",
            Self::EndOfStep => "end_of_step",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| format!("unknown phase '{s}'"))
    }
}

/// Set of phases, stored as a `FixConst` bitmask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PhaseMask(u32);

impl PhaseMask {
    /// No phases.
    pub const EMPTY: PhaseMask = PhaseMask(0);

    /// Mask containing only `phase`.
    pub const fn only(phase: Phase) -> Self {
        Self(phase.bit())
    }

    /// Raw bits, as passed to [`StepPipeline::register_fix`](dlext_core::StepPipeline::register_fix).
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether `phase` is in the set.
    pub const fn contains(self, phase: Phase) -> bool {
        self.0 & phase.bit() != 0
    }

    /// Add `phase`.
    pub fn insert(&mut self, phase: Phase) {
        self.0 |= phase.bit();
    }

    /// Whether the set is empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Phases in the set, in step order.
    pub fn iter(self) -> impl Iterator<Item = Phase> {
        Phase::ALL.into_iter().filter(move |&p| self.contains(p))
    }
}

impl FromIterator<Phase> for PhaseMask {
    fn from_iter<I: IntoIterator<Item = Phase>>(iter: I) -> Self {
        let mut mask = Self::EMPTY;
        for phase in iter {
            mask.insert(phase);
        }
        mask
    }
}

impl fmt::Display for PhaseMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        for (i, phase) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{phase}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_match_fixconst() {
        assert_eq!(Phase::InitialIntegrate.bit(), 1);
        assert_eq!(Phase::PreExchange.bit(), 4);
        assert_eq!(Phase::PreForce.bit(), 32);
        assert_eq!(Phase::PostForce.bit(), 128);
        assert_eq!(Phase::EndOfStep.bit(), 512);
    }

    #[test]
    fn names_round_trip() {
        for p in Phase::ALL {
            assert_eq!(p.name().parse::<Phase>(), Ok(p));
        }
        assert!("post_forces".parse::<Phase>().is_err());
    }

    #[test]
    fn mask_collects_and_prints_in_step_order() {
        let mask: PhaseMask = [Phase::EndOfStep, Phase::PreForce].into_iter().collect();
        assert_eq!(mask.bits(), 32 | 512);
        assert!(mask.contains(Phase::PreForce));
        assert!(!mask.contains(Phase::PostForce));
        assert_eq!(mask.to_string(), "pre_force|end_of_step");
        assert_eq!(PhaseMask::EMPTY.to_string(), "none");
    }
}
