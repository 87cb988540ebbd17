// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::cmp::Ordering;

use crate::blocks::Tipset;
use num_bigint::BigInt;

pub type Weight = BigInt;

/// Orders two weighted tipsets by preference. The heavier tipset wins. Equal
/// weights are broken by the smaller minimum ticket digest, then by the
/// smaller key bytes, so every node picks the same head regardless of the
/// order in which tipsets arrived.
pub fn fork_choice(a: (&Tipset, &Weight), b: (&Tipset, &Weight)) -> Ordering {
    a.1.cmp(b.1).then_with(|| {
        (b.0.min_ticket_digest(), b.0.key().to_bytes())
            .cmp(&(a.0.min_ticket_digest(), a.0.key().to_bytes()))
    })
}

/// Returns `true` when `candidate` is strictly preferred over `current`.
pub fn is_heavier(candidate: (&Tipset, &Weight), current: (&Tipset, &Weight)) -> bool {
    fork_choice(candidate, current) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::header_with_ticket;

    #[test]
    fn heavier_weight_wins() {
        let a = Tipset::from(header_with_ticket(1000, b"a"));
        let b = Tipset::from(header_with_ticket(1001, b"b"));
        assert!(is_heavier((&a, &BigInt::from(105)), (&b, &BigInt::from(100))));
        assert!(!is_heavier((&a, &BigInt::from(100)), (&b, &BigInt::from(105))));
    }

    #[test]
    fn ties_are_broken_by_ticket_digest() {
        let a = Tipset::from(header_with_ticket(1000, b"a"));
        let b = Tipset::from(header_with_ticket(1001, b"b"));
        let w = BigInt::from(100);
        let (low, high) = if a.min_ticket_digest() < b.min_ticket_digest() {
            (&a, &b)
        } else {
            (&b, &a)
        };
        assert!(is_heavier((low, &w), (high, &w)));
        assert!(!is_heavier((high, &w), (low, &w)));
        assert!(!is_heavier((low, &w), (low, &w)));
    }
}
