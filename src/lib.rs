#![forbid(unsafe_op_in_unsafe_fn)]

/*!
Probes the OpenCL platforms and devices visible to the host.

Every device is listed with its static capabilities and, unless excluded,
self-tested: a tiny [`rot13`](transform) kernel is compiled, dispatched over a
fixed input and the result is compared against the host.

```no_run
# use clprobe::{filter::ExclusionSet, probe::{Prober, ProbeOptions}};
# fn main() -> clprobe::result::Result<()> {
# #[cfg(feature = "device")]
# {
let backend = clprobe::device::OclBackend::new();
let prober = Prober::new(backend, ExclusionSet::new(["Clover"]), ProbeOptions::default());
print!("{}", prober.run());
# }
# Ok(())
# }
```
*/

pub use anyhow;

pub mod result {
    pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
}

pub mod device;
pub mod filter;
pub mod probe;
pub mod report;
pub mod transform;
