//! Fuzz target: `ModemStatusTracker::apply_response`
//!
//! Arbitrary response text must parse without panicking, and a reported
//! signal level must stay inside the `+CSQ` range.
//!
//! cargo fuzz run fuzz_modem_status

#![no_main]

use libfuzzer_sys::fuzz_target;
use trackmux::app::modem_status::ModemStatusTracker;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let tracker = ModemStatusTracker::new();
    let updated = tracker.apply_response(text);
    assert!(updated <= text.lines().count());

    let status = tracker.status();
    if let Some(dbm) = status.rssi_dbm {
        assert!((-113..=-51).contains(&dbm));
    }
    if let Some(op) = status.operator {
        assert!(op.len() <= trackmux::app::modem_status::OPERATOR_CAP);
    }
});
