// Links every service provider crate so its `inventory` registrations end up in the binary.
// A provider that is not referenced here is silently missing from the hub.
#![allow(unused_imports)]

use demo_service as _;
