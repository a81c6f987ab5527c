//! Metrics exposed by the finality engine.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use valence_chain_types::BlockHeight;

use crate::errors::BftError;

pub const BFT_FINALIZED_HEIGHT: &str = "bft_finalized_height";
pub const BFT_PREVOTED_CONFIRMED_HEIGHT: &str = "bft_prevoted_confirmed_height";
pub const BFT_HEADER_WINDOW_LEN: &str = "bft_header_window_len";
pub const BFT_INVALID_HEADERS_TOTAL: &str = "bft_invalid_headers_total";

/// Registers metric descriptions with the installed recorder. Call once at
/// process startup.
pub fn register_metrics() {
    describe_gauge!(BFT_FINALIZED_HEIGHT, "Highest finalized block height");
    describe_gauge!(
        BFT_PREVOTED_CONFIRMED_HEIGHT,
        "Highest block height confirmed by the pre-vote threshold"
    );
    describe_gauge!(BFT_HEADER_WINDOW_LEN, "Number of headers in the sliding window");
    describe_counter!(
        BFT_INVALID_HEADERS_TOTAL,
        "Headers rejected by consensus verification, labeled by violation kind"
    );
}

#[allow(clippy::as_conversions)]
pub(crate) fn record_heights(finalized: BlockHeight, prevoted: BlockHeight, window_len: usize) {
    gauge!(BFT_FINALIZED_HEIGHT).set(finalized.0 as f64);
    gauge!(BFT_PREVOTED_CONFIRMED_HEIGHT).set(prevoted.0 as f64);
    gauge!(BFT_HEADER_WINDOW_LEN).set(window_len as f64);
}

pub(crate) fn record_invalid_header(err: &BftError) {
    let kind: &'static str = err.into();
    counter!(BFT_INVALID_HEADERS_TOTAL, "kind" => kind).increment(1);
}
