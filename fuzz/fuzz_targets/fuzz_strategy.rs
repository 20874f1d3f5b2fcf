#![no_main]

use libfuzzer_sys::fuzz_target;

use skyreduce_core::strategy::{Context, StrategyConfig};

fuzz_target!(|data: &[u8]| {
    if data.len() < 7 {
        return;
    }
    let context = Context::ALL[usize::from(data[0]) % Context::ALL.len()];
    let nwplanes = usize::from(u16::from_le_bytes([data[1], data[2]])).max(1);
    let support = usize::from(u16::from_le_bytes([data[3], data[4]]));
    let nwslabs = match usize::from(u16::from_le_bytes([data[5], data[6]])) {
        0 => None,
        n => Some(n),
    };

    let Ok(s) = StrategyConfig::derive(context, nwplanes, 10.0, support, nwslabs, 16) else {
        assert_eq!(context, Context::HybridWProjectWStack);
        assert!(nwslabs.is_none());
        return;
    };

    assert_eq!(s.imaging_context, context.imaging_context());
    assert!(s.nwplanes >= 1);
    if context == Context::HybridWProjectWStack {
        assert_eq!(s.support % 2, 0);
        assert!(s.support >= 14);
        assert_eq!(Some(s.vis_slices), nwslabs);
    } else {
        assert_eq!(s.vis_slices, 1);
    }
});
