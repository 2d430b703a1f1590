//! Policy thresholds, in asset units

use rust_decimal::Decimal;

/// Smallest transferable amount; anything below is rejected, never rounded
pub const MIN_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

/// Native balance an account needs before the ledger considers it active
pub const ACTIVATION_RESERVE: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

/// Native balance kept on top of the fee by tips and non-closing withdrawals
pub const TRANSFER_BUFFER: Decimal = Decimal::from_parts(2, 0, 0, false, 1);

/// Native balance kept on top of the fee by an opt-in
pub const OPT_IN_BUFFER: Decimal = Decimal::from_parts(11, 0, 0, false, 2);
