//! Lock-mode algebra for multigranularity locking.
//!
//! Three relations govern the six lock modes: pairwise compatibility between
//! transactions on the same resource, the intention lock an ancestor must
//! carry before a descendant lock may be requested, and substitutability
//! (which modes can silently stand in for which). Each relation is an
//! independent domain table; none of them is derivable from the others, so
//! all three are encoded as fixed 6x6 truth tables.

use std::fmt;

/// A multigranularity lock mode.
#[allow(clippy::upper_case_acronyms)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum LockType {
    /// No lock held.
    NL,
    /// Intention shared: declares intent to take S locks on descendants.
    IS,
    /// Intention exclusive: declares intent to take X locks on descendants.
    IX,
    /// Shared access to this resource and, implicitly, every descendant.
    S,
    /// Shared access to this resource plus intention exclusive below.
    SIX,
    /// Exclusive access to this resource and every descendant.
    X,
}

/// Table row/column order: NL, IS, IX, S, SIX, X.
const MODES: usize = 6;

/// `COMPATIBLE[a][b]`: a transaction holding `a` and a different transaction
/// holding `b` may simultaneously hold locks on the same resource.
const COMPATIBLE: [[bool; MODES]; MODES] = [
    [true, true, true, true, true, true],
    [true, true, true, true, true, false],
    [true, true, true, false, false, false],
    [true, true, false, true, false, false],
    [true, true, false, false, false, false],
    [true, false, false, false, false, false],
];

/// `PARENT_PERMITS[parent][child]`: holding `parent` on an ancestor permits
/// requesting `child` on a descendant. A plain S permits no further locking
/// intent below it (it already grants implicit S to the whole subtree), and
/// SIX forbids redundant S/IS bookkeeping underneath itself.
const PARENT_PERMITS: [[bool; MODES]; MODES] = [
    [true, false, false, false, false, false],
    [true, true, false, true, false, false],
    [true, true, true, true, true, true],
    [true, false, false, true, false, false],
    [true, false, true, false, true, true],
    [true, false, false, false, false, false],
];

/// `SUBSTITUTABLE[substitute][required]`: holding `substitute` satisfies
/// every guarantee `required` would have given.
const SUBSTITUTABLE: [[bool; MODES]; MODES] = [
    [true, false, false, false, false, false],
    [true, true, false, false, false, false],
    [true, true, true, false, false, false],
    [true, true, false, true, false, false],
    [true, true, true, true, true, false],
    [true, true, true, true, true, true],
];

impl LockType {
    /// Every mode, in table order.
    pub const ALL: [LockType; MODES] = [
        LockType::NL,
        LockType::IS,
        LockType::IX,
        LockType::S,
        LockType::SIX,
        LockType::X,
    ];

    const fn ordinal(self) -> usize {
        match self {
            LockType::NL => 0,
            LockType::IS => 1,
            LockType::IX => 2,
            LockType::S => 3,
            LockType::SIX => 4,
            LockType::X => 5,
        }
    }

    /// Whether `self` and `other`, held by different transactions, may
    /// coexist on the same resource. Symmetric.
    #[inline]
    #[must_use]
    pub const fn compatible(self, other: LockType) -> bool {
        COMPATIBLE[self.ordinal()][other.ordinal()]
    }

    /// Minimal lock an ancestor must hold for `self` to be granted on a
    /// descendant.
    #[inline]
    #[must_use]
    pub const fn parent_lock(self) -> LockType {
        match self {
            LockType::S | LockType::IS => LockType::IS,
            LockType::X | LockType::IX | LockType::SIX => LockType::IX,
            LockType::NL => LockType::NL,
        }
    }

    /// Whether holding `self` on an ancestor permits requesting `child` on a
    /// descendant.
    #[inline]
    #[must_use]
    pub const fn can_be_parent_of(self, child: LockType) -> bool {
        PARENT_PERMITS[self.ordinal()][child.ordinal()]
    }

    /// Whether `self` may silently replace `required` without losing any
    /// guarantee `required` provided.
    #[inline]
    #[must_use]
    pub const fn substitutable_for(self, required: LockType) -> bool {
        SUBSTITUTABLE[self.ordinal()][required.ordinal()]
    }

    /// True for the intention modes IS, IX and SIX.
    #[inline]
    #[must_use]
    pub const fn is_intent(self) -> bool {
        matches!(self, LockType::IS | LockType::IX | LockType::SIX)
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockType::NL => "NL",
            LockType::IS => "IS",
            LockType::IX => "IX",
            LockType::S => "S",
            LockType::SIX => "SIX",
            LockType::X => "X",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::LockType::{self, IS, IX, NL, S, SIX, X};

    #[test]
    fn compatibility_is_symmetric() {
        for a in LockType::ALL {
            for b in LockType::ALL {
                assert_eq!(a.compatible(b), b.compatible(a), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn nl_is_compatible_with_everything() {
        for t in LockType::ALL {
            assert!(NL.compatible(t), "NL vs {t}");
        }
    }

    #[test]
    fn exclusive_is_compatible_only_with_nl() {
        for t in LockType::ALL {
            assert_eq!(X.compatible(t), t == NL, "X vs {t}");
        }
    }

    #[test]
    fn shared_rows_match_the_table() {
        assert!(S.compatible(S));
        assert!(S.compatible(IS));
        assert!(!S.compatible(IX));
        assert!(!S.compatible(SIX));
        assert!(SIX.compatible(IS));
        assert!(!SIX.compatible(SIX));
        assert!(IX.compatible(IX));
        assert!(!IX.compatible(S));
    }

    #[test]
    fn parent_lock_is_the_minimal_intent() {
        assert_eq!(S.parent_lock(), IS);
        assert_eq!(IS.parent_lock(), IS);
        assert_eq!(X.parent_lock(), IX);
        assert_eq!(IX.parent_lock(), IX);
        assert_eq!(SIX.parent_lock(), IX);
        assert_eq!(NL.parent_lock(), NL);
    }

    #[test]
    fn x_and_nl_parents_permit_only_nl_children() {
        for t in LockType::ALL {
            assert_eq!(X.can_be_parent_of(t), t == NL, "X over {t}");
            assert_eq!(NL.can_be_parent_of(t), t == NL, "NL over {t}");
        }
    }

    #[test]
    fn ix_parent_permits_every_child() {
        // Includes the S child cell, which intuition tends to get wrong.
        for t in LockType::ALL {
            assert!(IX.can_be_parent_of(t), "IX over {t}");
        }
    }

    #[test]
    fn s_parent_permits_only_nl_and_s() {
        for t in LockType::ALL {
            assert_eq!(S.can_be_parent_of(t), t == NL || t == S, "S over {t}");
        }
    }

    #[test]
    fn six_parent_rejects_redundant_read_locks() {
        assert!(SIX.can_be_parent_of(NL));
        assert!(SIX.can_be_parent_of(IX));
        assert!(SIX.can_be_parent_of(SIX));
        assert!(SIX.can_be_parent_of(X));
        assert!(!SIX.can_be_parent_of(IS));
        assert!(!SIX.can_be_parent_of(S));
    }

    #[test]
    fn every_mode_substitutes_itself() {
        for t in LockType::ALL {
            assert!(t.substitutable_for(t), "{t} for {t}");
        }
    }

    #[test]
    fn nl_substitutes_nothing_else() {
        for t in LockType::ALL {
            assert_eq!(NL.substitutable_for(t), t == NL, "NL for {t}");
        }
    }

    #[test]
    fn x_substitutes_everything() {
        for t in LockType::ALL {
            assert!(X.substitutable_for(t), "X for {t}");
        }
    }

    #[test]
    fn six_substitutes_all_but_x() {
        for t in LockType::ALL {
            assert_eq!(SIX.substitutable_for(t), t != X, "SIX for {t}");
        }
    }

    #[test]
    fn intent_modes() {
        assert!(IS.is_intent());
        assert!(IX.is_intent());
        assert!(SIX.is_intent());
        assert!(!NL.is_intent());
        assert!(!S.is_intent());
        assert!(!X.is_intent());
    }
}
