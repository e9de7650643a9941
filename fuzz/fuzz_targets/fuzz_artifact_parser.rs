#![no_main]

use covreach_domain::{check_artifact, tally_targets};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let verdict = check_artifact(text);
        let tally = tally_targets(text);
        // A passing verdict means no marked line is uncovered.
        assert_eq!(verdict.success, tally.uncovered == 0);
        assert_eq!(verdict.message.is_empty(), verdict.success);
    }
});
