//! Equal-share settlement shared by the energy and fluid networks.
//!
//! Settlement works on plain vectors of stocks and requests so the
//! conservation guarantees can be checked without any holders involved.
//! Networks gather the vectors from their members, call [`settle`], and
//! apply the returned gains and losses back onto the holders.

/// Split `amount` over slots capped by `limits`, adding each grant to
/// `grants[i]`. Returns the undistributed remainder.
///
/// Every round divides what is left evenly over the slots that still have
/// room; slots that are filled drop out. Once the per-slot share rounds down
/// to zero, a single pass in slot order hands out the rest.
pub fn split_equally(amount: u64, limits: &[u64], grants: &mut [u64]) -> u64 {
    debug_assert_eq!(limits.len(), grants.len());

    let mut open: Vec<(usize, u64)> = limits
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, limit)| *limit > 0)
        .collect();
    let mut available = amount;

    while available > 0 && !open.is_empty() {
        let share = available / open.len() as u64;
        if share == 0 {
            for (slot, room) in &open {
                let give = available.min(*room);
                grants[*slot] += give;
                available -= give;
                if available == 0 {
                    break;
                }
            }
            return available;
        }

        open.retain_mut(|(slot, room)| {
            let give = share.min(*room);
            grants[*slot] += give;
            *room -= give;
            available -= give;
            *room > 0
        });
    }

    available
}

/// Saturating sum.
pub fn total(values: &[u64]) -> u64 {
    values.iter().fold(0u64, |acc, v| acc.saturating_add(*v))
}

/// Stocks and requests of one network, in member order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    pub provider_stock: Vec<u64>,
    pub consumer_requests: Vec<u64>,
    pub buffer_stock: Vec<u64>,
    pub buffer_requests: Vec<u64>,
}

/// Per-member movements computed by [`settle`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settlement {
    pub provider_loss: Vec<u64>,
    pub consumer_gain: Vec<u64>,
    pub buffer_gain: Vec<u64>,
    pub buffer_loss: Vec<u64>,
    /// Whether buffers were drawn from this tick (otherwise they may have been filled).
    pub used_buffers: bool,
    /// Total amount that changed hands.
    pub moved: u64,
}

/// Compute one tick of distribution under `transfer_rate`.
///
/// Returns `Err(residual)` when the sources could not cover what was handed
/// out. That cannot happen for a consistent ledger and callers treat it as a
/// fatal fault.
pub fn settle(ledger: &Ledger, transfer_rate: u64) -> Result<Settlement, u64> {
    let provider_supply = transfer_rate.min(total(&ledger.provider_stock));
    let requested = transfer_rate.min(total(&ledger.consumer_requests));
    let buffer_supply = (transfer_rate - provider_supply).min(total(&ledger.buffer_stock));

    let used_buffers = requested > provider_supply;
    let available = provider_supply + if used_buffers { buffer_supply } else { 0 };

    let mut settlement = Settlement {
        provider_loss: vec![0; ledger.provider_stock.len()],
        consumer_gain: vec![0; ledger.consumer_requests.len()],
        buffer_gain: vec![0; ledger.buffer_requests.len()],
        buffer_loss: vec![0; ledger.buffer_stock.len()],
        used_buffers,
        moved: 0,
    };

    let mut left = split_equally(available, &ledger.consumer_requests, &mut settlement.consumer_gain);
    if !used_buffers && left > 0 {
        left = split_equally(left, &ledger.buffer_requests, &mut settlement.buffer_gain);
    }

    let handed_out = available - left;
    let (provider_loss, buffer_loss) = collect(handed_out, &ledger.provider_stock, &ledger.buffer_stock, used_buffers)?;
    settlement.provider_loss = provider_loss;
    settlement.buffer_loss = buffer_loss;
    settlement.moved = handed_out;
    Ok(settlement)
}

/// Take `amount` from providers in equal shares, then from buffers when
/// `used_buffers` is set. Returns the per-slot losses as
/// `(provider_loss, buffer_loss)`, or `Err(residual)` with the part the
/// stocks could not cover.
pub fn collect(
    amount: u64,
    provider_stock: &[u64],
    buffer_stock: &[u64],
    used_buffers: bool,
) -> Result<(Vec<u64>, Vec<u64>), u64> {
    let mut provider_loss = vec![0; provider_stock.len()];
    let mut buffer_loss = vec![0; buffer_stock.len()];

    let mut deficit = split_equally(amount, provider_stock, &mut provider_loss);
    if deficit != 0 && used_buffers {
        deficit = split_equally(deficit, buffer_stock, &mut buffer_loss);
    }
    if deficit != 0 {
        return Err(deficit);
    }
    Ok((provider_loss, buffer_loss))
}
