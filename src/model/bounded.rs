/// Push a batch of new items onto the front of a FIFO history, then truncate to `cap`.
///
/// Spec §3 "Bounded windows ... must always be enforced by truncation after a
/// merge" and §9 "Bounded-window truncation is part of the data contract, not
/// an optimization". `history` is kept newest-first; new items are prepended
/// in the order given (also newest-first, matching §4.C's upstream page order).
pub fn prepend_and_truncate<T>(history: &mut Vec<T>, new_items: Vec<T>, cap: usize) {
    let mut merged = new_items;
    merged.append(history);
    merged.truncate(cap);
    *history = merged;
}

/// FIFO-truncate a flat hash dedup list (spec §3 `processedTransactionHashes`).
pub fn fifo_truncate(hashes: &mut Vec<String>, cap: usize) {
    if hashes.len() > cap {
        let excess = hashes.len() - cap;
        hashes.drain(0..excess);
    }
}
