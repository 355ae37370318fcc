//! Batch allocation across categories.
//!
//! Two passes decide how many targets each category gets:
//! 1. `floor(pct / 100 * batch_size)` per category, clamped to what is available
//! 2. leftover slots handed out in priority order until the batch is full or
//!    every category is exhausted
//!
//! Each category's pool is then shuffled and the first N taken. Anything still
//! missing is filled from unused available targets, again in priority order.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::domain::{Category, Target};
use crate::scheduler::categorize::Pools;

/// Target share of the batch per category, in percent.
///
/// Need not sum to 100; missing categories count as 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentages(BTreeMap<Category, u32>);

impl Default for Percentages {
    fn default() -> Self {
        Self(BTreeMap::from([
            (Category::NeverTested, 70),
            (Category::ReliableSuccess, 10),
            (Category::RecentMixed, 10),
            (Category::OldSuccess, 5),
            (Category::FailedOnly, 5),
        ]))
    }
}

impl Percentages {
    pub fn new(shares: impl IntoIterator<Item = (Category, u32)>) -> Self {
        Self(shares.into_iter().collect())
    }

    pub fn get(&self, category: Category) -> u32 {
        self.0.get(&category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }
}

/// Result of one scheduling run. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct BatchSelection {
    /// Final per-category slot counts
    pub allocation: BTreeMap<Category, usize>,
    /// Targets to audit, duplicate-free, none in cooldown
    pub selected: Vec<Target>,
    pub available_counts: BTreeMap<Category, usize>,
    pub cooldown_counts: BTreeMap<Category, usize>,
}

/// Compute per-category slot counts for a batch.
///
/// The result never exceeds `batch_size` in total nor any category's available count.
pub fn allocate(pools: &Pools, batch_size: usize, percentages: &Percentages) -> BTreeMap<Category, usize> {
    let available = pools.available_counts();
    let mut allocation: BTreeMap<Category, usize> = BTreeMap::new();

    for category in Category::ALL {
        let requested = percentages.get(category) as usize * batch_size / 100;
        allocation.insert(category, requested.min(available[&category]));
    }

    let mut allocated: usize = allocation.values().sum();
    if allocated > batch_size {
        // Percentages summing past 100 can overshoot; trim lowest priority first.
        for category in Category::ALL.into_iter().rev() {
            let excess = allocated - batch_size;
            let slot = allocation.entry(category).or_default();
            let cut = excess.min(*slot);
            *slot -= cut;
            allocated -= cut;
            if allocated == batch_size {
                break;
            }
        }
    }

    for category in Category::ALL {
        if allocated >= batch_size {
            break;
        }
        let slot = allocation.entry(category).or_default();
        let spare = available[&category] - *slot;
        let extra = spare.min(batch_size - allocated);
        *slot += extra;
        allocated += extra;
    }

    allocation
}

/// Allocate a batch and draw the targets.
///
/// Shuffling uses `rng`, so a seeded generator gives reproducible selections.
/// Returns fewer than `batch_size` targets when not enough are eligible.
pub fn select_batch<R: Rng + ?Sized>(
    pools: &Pools,
    batch_size: usize,
    percentages: &Percentages,
    rng: &mut R,
) -> BatchSelection {
    let allocation = allocate(pools, batch_size, percentages);

    let mut selected: Vec<Target> = Vec::with_capacity(batch_size);
    let mut seen: HashSet<String> = HashSet::new();
    let mut leftovers: Vec<Target> = Vec::new();

    for category in Category::ALL {
        let mut pool = pools.available_in(category).to_vec();
        pool.shuffle(rng);

        let quota = allocation.get(&category).copied().unwrap_or(0);
        let mut taken = 0;
        for target in pool {
            if taken < quota && selected.len() < batch_size && !seen.contains(&target.id) {
                seen.insert(target.id.clone());
                selected.push(target);
                taken += 1;
            } else {
                leftovers.push(target);
            }
        }
    }

    for target in leftovers {
        if selected.len() >= batch_size {
            break;
        }
        if seen.insert(target.id.clone()) {
            selected.push(target);
        }
    }

    log::info!(
        "Selected {} of {} requested targets ({} available, {} cooling down)",
        selected.len(),
        batch_size,
        pools.total_available(),
        pools.cooldown.values().map(Vec::len).sum::<usize>()
    );

    BatchSelection {
        allocation,
        selected,
        available_counts: pools.available_counts(),
        cooldown_counts: pools.cooldown_counts(),
    }
}
