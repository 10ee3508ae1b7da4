use std::sync::{LazyLock, Mutex};

use chrono::Utc;
use rand::Rng;

struct OrderedIdState {
    last_millis: u64,
    last_random: u128,
}

static ORDERED_ID_STATE: LazyLock<Mutex<OrderedIdState>> = LazyLock::new(|| {
    Mutex::new(OrderedIdState {
        last_millis: 0,
        last_random: 0,
    })
});

const RANDOM_BITS: u32 = 80;
const RANDOM_MASK: u128 = (1u128 << RANDOM_BITS) - 1;

/// Generates a time-ordered, UUID-formatted document id.
///
/// The first 48 bits carry the millisecond clock, the remaining 80 bits are
/// random. Ids minted within the same millisecond increment the random part so
/// that lexicographic order follows generation order within this process.
pub fn next_ordered_id() -> String {
    next_ordered_id_at(Utc::now().timestamp_millis().max(0) as u64)
}

pub(crate) fn next_ordered_id_at(now_millis: u64) -> String {
    let mut state = match ORDERED_ID_STATE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let millis = now_millis.max(state.last_millis);
    if millis == state.last_millis && state.last_random < RANDOM_MASK {
        state.last_random += 1;
    } else {
        state.last_millis = millis;
        state.last_random = rand::thread_rng().gen::<u128>() & (RANDOM_MASK >> 1);
    }

    let value = ((millis as u128 & 0xFFFF_FFFF_FFFF) << RANDOM_BITS) | state.last_random;
    let hex = format!("{value:032x}");
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_uuid_shaped() {
        let id = next_ordered_id();
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
    }

    #[test]
    fn ids_sort_by_generation_order() {
        let mut ids = Vec::new();
        for millis in [5_000u64, 5_000, 5_000, 5_001, 5_001] {
            ids.push(next_ordered_id_at(millis + 1_900_000_000_000));
        }
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids.iter().collect::<std::collections::BTreeSet<_>>().len(), 5);
    }
}
