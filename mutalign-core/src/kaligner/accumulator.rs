//! Streaming clustering of seed hits into islands of near-constant offset.
//!
//! A fixed number of slots each track one open island. Every hit, in `(index, offset)` order,
//! either extends a slot whose last offset is within `max_allowed_delta`, or replaces a slot
//! (closing and reporting the island it held). Work is `O(hits * slot_count)`.

use super::index::KmerHit;
use log::trace;

/// A run of seed hits sharing roughly one offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Island {
    /// Position of the first hit in the input slice.
    pub first_record: usize,
    pub first_index: u32,
    pub first_offset: i32,
    pub last_index: u32,
    pub min_offset: i32,
    pub max_offset: i32,
    pub last_offset: i32,
    pub score: i32,
}

impl Island {
    fn start(record: usize, hit: KmerHit, score: i32) -> Self {
        Island {
            first_record: record,
            first_index: hit.index,
            first_offset: hit.offset,
            last_index: hit.index,
            min_offset: hit.offset,
            max_offset: hit.offset,
            last_offset: hit.offset,
            score,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    island: Island,
    /// First record of a run of same-index hits not yet attributed to one offset; the island
    /// then spans the run's offsets and cannot be extended until a later hit picks one.
    stretch: Option<usize>,
}

impl Slot {
    /// Eviction rank; an unresolved stretch is always evicted first.
    fn rank(&self) -> i32 {
        if self.stretch.is_some() {
            i32::MIN
        } else {
            self.island.score
        }
    }
}

#[derive(Clone, Debug)]
pub struct OffsetPacksAccumulator {
    slots: Vec<Option<Slot>>,
    max_allowed_delta: i32,
    match_score: i32,
    mismatch_score: i32,
    shift_score: i32,
    island_minimal_score: i32,
    islands: Vec<Island>,
}

impl OffsetPacksAccumulator {
    /// Penalties may be given with either sign; their magnitudes are used.
    pub fn new(
        slot_count: usize,
        max_allowed_delta: i32,
        match_score: i32,
        mismatch_score: i32,
        shift_score: i32,
        island_minimal_score: i32,
    ) -> Self {
        OffsetPacksAccumulator {
            slots: vec![None; slot_count.max(1)],
            max_allowed_delta: max_allowed_delta.abs(),
            match_score,
            mismatch_score: mismatch_score.abs(),
            shift_score: shift_score.abs(),
            island_minimal_score,
            islands: Vec::new(),
        }
    }

    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    pub fn into_islands(self) -> Vec<Island> {
        self.islands
    }

    pub fn number_of_islands(&self) -> usize {
        self.islands.len()
    }

    #[inline]
    fn in_delta(&self, a: i32, b: i32) -> bool {
        (a - b).abs() <= self.max_allowed_delta
    }

    fn finish(&mut self, slot: Option<Slot>) {
        let Some(slot) = slot else {
            return;
        };
        if slot.stretch.is_some() || slot.island.score < self.island_minimal_score {
            return;
        }
        trace!(
            "island: seeds {}..={}, offsets {}..={}, score {}",
            slot.island.first_index,
            slot.island.last_index,
            slot.island.min_offset,
            slot.island.max_offset,
            slot.island.score
        );
        self.islands.push(slot.island);
    }

    /// Picks, inside the stretch starting at `first`, the hit closest to `offset`.
    fn resolve_stretch(&self, hits: &[KmerHit], first: usize, offset: i32) -> usize {
        let anchor = hits[first];
        let mut best = first;
        let mut best_delta = (offset - anchor.offset).abs();
        let mut r = first;
        while r + 1 < hits.len()
            && hits[r + 1].index == anchor.index
            && (anchor.offset - hits[r + 1].offset).abs() <= self.max_allowed_delta
        {
            r += 1;
            let delta = (offset - hits[r].offset).abs();
            if delta < best_delta {
                best = r;
                best_delta = delta;
            }
        }
        best
    }

    /// Clusters `hits`, sorted by `(index, offset)`, replacing previous results.
    pub fn calculate_initial_partitioning(&mut self, hits: &[KmerHit]) {
        self.islands.clear();
        self.slots.iter_mut().for_each(|s| *s = None);

        let mut record = 0usize;
        'records: while record < hits.len() {
            let hit = hits[record];
            let mut rejected = None;

            for i in 0..self.slots.len() {
                let Some(mut slot) = self.slots[i] else {
                    continue;
                };
                if let Some(first) = slot.stretch {
                    if slot.island.min_offset <= hit.offset && hit.offset <= slot.island.max_offset {
                        let chosen = self.resolve_stretch(hits, first, hit.offset);
                        slot = Slot {
                            island: Island::start(chosen, hits[chosen], self.match_score),
                            stretch: None,
                        };
                        self.slots[i] = Some(slot);
                    } else {
                        continue;
                    }
                }

                let last = slot.island.last_offset;
                if !self.in_delta(last, hit.offset) {
                    continue;
                }
                // Self-correlated k-mers: a same-seed neighbour closer to the island wins.
                let distance = (last - hit.offset).abs();
                let closer = |r: usize| {
                    hits[r].index == hit.index && distance > (last - hits[r].offset).abs()
                };
                if (record + 1 < hits.len() && closer(record + 1)) || (record > 0 && closer(record - 1))
                {
                    record += 1;
                    continue 'records;
                }
                if hit.index <= slot.island.last_index {
                    continue;
                }

                let gap = (hit.index - slot.island.last_index - 1) as i32;
                let delta = self.match_score
                    - gap * self.mismatch_score
                    - distance * self.shift_score;
                if delta > 0 {
                    let island = &mut slot.island;
                    island.last_index = hit.index;
                    island.min_offset = island.min_offset.min(hit.offset);
                    island.max_offset = island.max_offset.max(hit.offset);
                    island.last_offset = hit.offset;
                    island.score += delta;
                    self.slots[i] = Some(slot);
                    record += 1;
                    continue 'records;
                }
                rejected.get_or_insert(i);
            }

            let target = rejected.unwrap_or_else(|| self.eviction_target());
            let closed = self.slots[target].take();
            self.finish(closed);

            let mut slot = Slot {
                island: Island::start(record, hit, self.match_score),
                stretch: None,
            };
            // Same seed hitting several nearby offsets: keep the whole run until a later hit
            // tells which offset continues.
            let mut offset = hit.offset;
            while record + 1 < hits.len()
                && hits[record + 1].index == hit.index
                && (offset - hits[record + 1].offset).abs() <= self.max_allowed_delta
            {
                if slot.stretch.is_none() {
                    slot.stretch = Some(slot.island.first_record);
                }
                record += 1;
                offset = hits[record].offset;
                slot.island.max_offset = offset;
            }
            self.slots[target] = Some(slot);
            record += 1;
        }

        let open: Vec<Option<Slot>> = self.slots.iter_mut().map(Option::take).collect();
        for slot in open {
            self.finish(slot);
        }
    }

    /// First empty slot, otherwise the lowest-ranked one (earliest on ties).
    fn eviction_target(&self) -> usize {
        let mut target = 0;
        let mut lowest = i32::MAX;
        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                None => return i,
                Some(s) if s.rank() < lowest => {
                    lowest = s.rank();
                    target = i;
                }
                Some(_) => {}
            }
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(records: &[(u32, i32)]) -> Vec<KmerHit> {
        records
            .iter()
            .map(|&(index, offset)| KmerHit { index, offset })
            .collect()
    }

    fn accumulator(slots: usize) -> OffsetPacksAccumulator {
        OffsetPacksAccumulator::new(slots, 3, 10, -7, -3, 20)
    }

    #[test]
    fn single_island() {
        let mut acc = accumulator(2);
        acc.calculate_initial_partitioning(&hits(&[(0, 5), (1, 5), (2, 6), (4, 6)]));
        assert_eq!(acc.number_of_islands(), 1);
        let island = acc.islands()[0];
        assert_eq!((island.first_index, island.last_index), (0, 4));
        assert_eq!((island.min_offset, island.max_offset), (5, 6));
        // 10 + 10 + (10 - 3) + (10 - 7)
        assert_eq!(island.score, 30);
    }

    #[test]
    fn distant_offsets_form_separate_islands() {
        let mut acc = accumulator(2);
        acc.calculate_initial_partitioning(&hits(&[
            (0, 0),
            (0, 40),
            (1, 0),
            (1, 40),
            (2, 0),
            (2, 40),
        ]));
        let mut offsets: Vec<i32> = acc.islands().iter().map(|i| i.first_offset).collect();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![0, 40]);
        assert!(acc.islands().iter().all(|i| i.score == 30));
    }

    #[test]
    fn weak_islands_are_dropped() {
        let mut acc = accumulator(1);
        acc.calculate_initial_partitioning(&hits(&[(0, 0), (1, 50), (2, 100)]));
        assert_eq!(acc.number_of_islands(), 0);
    }

    #[test]
    fn lowest_score_slot_is_evicted() {
        let mut acc = accumulator(2);
        acc.calculate_initial_partitioning(&hits(&[
            (0, 0),
            (1, 0),
            (2, 0),
            (3, 20),
            (3, 40),
            (4, 0),
        ]));
        // The newcomer at offset 20 is evicted, the strong island goes on to absorb seed 4.
        assert_eq!(acc.number_of_islands(), 1);
        let strong = acc.islands()[0];
        assert_eq!(strong.last_index, 4);
        assert_eq!(strong.score, 30 + (10 - 7));
    }

    #[test]
    fn unprofitable_extension_closes_island() {
        let mut acc = accumulator(2);
        acc.calculate_initial_partitioning(&hits(&[(0, 0), (1, 0), (2, 0), (5, 0)]));
        assert_eq!(acc.number_of_islands(), 1);
        assert_eq!(acc.islands()[0].last_index, 2);
        assert_eq!(acc.islands()[0].score, 30);
    }

    #[test]
    fn closer_same_seed_hit_wins() {
        let mut acc = accumulator(2);
        acc.calculate_initial_partitioning(&hits(&[(0, 10), (1, 10), (2, 8), (2, 10), (3, 10)]));
        let island = acc.islands()[0];
        assert_eq!(island.min_offset, 10);
        assert_eq!(island.score, 40);
    }
}
