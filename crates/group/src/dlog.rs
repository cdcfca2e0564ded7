// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::group::ElementModP;

struct DlogTable {
    known: HashMap<ElementModP, u64>,
    last_element: ElementModP,
    last_exponent: u64,
}

/// Bounded discrete log `g^k -> k` for small `k`.
///
/// Powers of `g` are memoized as they are walked so repeated lookups over a tally only pay for
/// the largest count once. The table is shared behind a mutex and can be used from many
/// threads.
pub struct DiscreteLog {
    bound: u64,
    table: Mutex<DlogTable>,
}

impl DiscreteLog {
    pub fn new(bound: u64) -> Self {
        let mut known = HashMap::new();
        known.insert(ElementModP::one(), 0);
        Self {
            bound,
            table: Mutex::new(DlogTable {
                known,
                last_element: ElementModP::one(),
                last_exponent: 0,
            }),
        }
    }

    pub fn bound(&self) -> u64 {
        self.bound
    }

    /// Returns `k <= bound` with `g^k = element`, or `None` when no such `k` exists.
    pub fn find(&self, element: &ElementModP) -> Option<u64> {
        let mut table = self
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(exponent) = table.known.get(element) {
            return Some(*exponent);
        }

        let g = ElementModP::generator();
        let start = table.last_exponent;
        while table.last_exponent < self.bound {
            let next = table.last_element.mul(&g);
            table.last_exponent += 1;
            let exponent = table.last_exponent;
            table.known.insert(next.clone(), exponent);
            table.last_element = next;
            if &table.last_element == element {
                debug!(from = start, to = exponent, "discrete log table extended");
                return Some(exponent);
            }
        }

        warn!(bound = self.bound, "discrete log not found within bound");
        None
    }
}
