// cargo fuzz run decode corpus/decode -- -timeout=30

#![no_main]

use libfuzzer_sys::fuzz_target;

use gifplay::{Animation, MemoryBitmaps};

fuzz_target!(|data: &[u8]| {
    let mut anim = Animation::new(MemoryBitmaps);
    // frames surveyed before a scan error must still decode
    let _ = anim.data_scan(data);
    for frame in 0..anim.info().frame_count {
        let _ = anim.frame_decode(data, frame);
    }
});
