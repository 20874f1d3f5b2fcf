#![no_main]

use libfuzzer_sys::fuzz_target;

use skyreduce_core::partition::Partitioner;

fuzz_target!(|data: &[u8]| {
    if data.len() < 11 {
        return;
    }
    let lo = u64::from(u32::from_le_bytes([data[0], data[1], data[2], data[3]]));
    // Span capped at 2^16 to bound the partition count
    let span = u64::from(u16::from_le_bytes([data[4], data[5]]));
    let group = u64::from(u32::from_le_bytes([data[6], data[7], data[8], data[9]]));
    let single = data[10] & 1 == 1;
    let hi = lo + span;

    let Ok(parts) = Partitioner::new(group).single(single).plan(lo, hi) else {
        assert_eq!(group, 0);
        return;
    };

    assert_eq!(parts[0].start, lo);
    if single {
        assert_eq!(parts.len(), 1);
        return;
    }
    assert_eq!(parts[parts.len() - 1].end, hi);
    for (i, p) in parts.iter().enumerate() {
        assert_eq!(p.index, i);
        assert!(p.start <= p.end);
        assert!(p.len() <= group);
        if i + 1 < parts.len() {
            assert_eq!(p.len(), group);
            assert_eq!(parts[i + 1].start, p.end + 1);
        }
    }
});
