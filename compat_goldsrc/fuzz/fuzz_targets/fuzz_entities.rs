#![no_main]

use compat_goldsrc::entities::EntityList;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(list) = EntityList::decode(data) {
        let _ = list.encode();
    }
});
