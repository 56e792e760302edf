//! Coin-type currency table.
//!
//! Coin types on the bus are 4-bit indices into a 16-slot table of credit
//! values. Slots 8-15 are reserved by the changers seen in the field and
//! decode as zero value rather than as an out-of-range error, which keeps
//! the lookup total for every 4-bit input.

/// Credit value per coin-type index, in currency units (EUR).
pub const COIN_VALUES: [f64; 16] = [
    0.01, 0.02, 0.05, 0.10, 0.20, 0.50, 1.00, 2.00, //
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];

/// Credit value for a coin-type field. Only the low nibble is significant.
pub fn coin_value(coin_type: u8) -> f64 {
    COIN_VALUES[(coin_type & 0x0F) as usize]
}
