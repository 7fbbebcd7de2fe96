/*!

Platforms and [devices](Device) as reported by a [`Backend`].

Discovery is best effort. An attribute that can not be queried is `None` and a
warning is logged, the remaining attributes, devices and platforms are still
enumerated.

Listing the platforms with the OpenCL backend:
```no_run
# use clprobe::{anyhow::Result, device::{list_platforms, list_devices}};
# fn main() -> Result<()> {
# #[cfg(feature = "device")]
# {
let backend = clprobe::device::OclBackend::new();
for platform in list_platforms(&backend)? {
    let devices = list_devices(&backend, &platform)?;
    dbg!(platform.info(), devices.len());
}
# }
Ok(())
# }
```

# Engines
A [`DeviceEngine`] is an execution context and queue that contains exactly one
device. Engines are created per self-test and never shared, buffers and
programs are owned by the engine that created them.
*/

use crate::result::Result;
use serde::Serialize;
use std::fmt::{self, Debug, Display};

#[cfg(feature = "device")]
mod ocl_engine;
#[cfg(feature = "device")]
pub use ocl_engine::{OclBackend, OclEngine};

/// Errors.
pub mod error {
    /** Device is unavailable.

    - The "device" feature is not enabled.
    - The OpenCL library could not be loaded.
    */
    #[derive(Clone, Copy, Debug, thiserror::Error)]
    #[error("DeviceUnavailable")]
    pub struct DeviceUnavailable;

    /// The program failed to build, `log` holds the compiler output.
    #[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
    #[error("Program build failed!\n{log}")]
    pub struct BuildFailure {
        pub log: String,
    }

    impl BuildFailure {
        pub fn new(log: impl Into<String>) -> Self {
            Self { log: log.into() }
        }
    }
}
use error::BuildFailure;

/// Platform and device discovery.
pub trait Backend {
    type Platform;
    type Device;
    type Engine: DeviceEngine;
    /// Platforms in discovery order.
    fn platforms(&self) -> Result<Vec<Self::Platform>>;
    fn platform_attribute(
        &self,
        platform: &Self::Platform,
        attribute: PlatformAttribute,
    ) -> Result<String>;
    /// Devices of every type in discovery order.
    fn devices(&self, platform: &Self::Platform) -> Result<Vec<Self::Device>>;
    fn device_name(&self, device: &Self::Device) -> Result<String>;
    fn device_kind(&self, device: &Self::Device) -> Result<DeviceKind>;
    fn device_compute_units(&self, device: &Self::Device) -> Result<u32>;
    fn device_global_mem_size(&self, device: &Self::Device) -> Result<u64>;
    /// Creates a context and queue for `device` alone.
    fn engine(&self, platform: &Self::Platform, device: &Self::Device) -> Result<Self::Engine>;
}

/** Execution on a single device.

The engine is moved to a worker thread for the dispatch, so it and its
programs and buffers must be [`Send`]. */
pub trait DeviceEngine: Send + 'static {
    type Program: Send + 'static;
    type Buffer: Send + 'static;
    /// Compiles `src` for the device.
    fn build_program(&self, src: &str) -> Result<Self::Program, BuildFailure>;
    /// A read only buffer initialized with `data`.
    fn upload(&self, data: &[u8]) -> Result<Self::Buffer>;
    /// A zeroed write only buffer.
    fn alloc(&self, len: usize) -> Result<Self::Buffer>;
    /** Enqueues `kernel` with one work-item per group and blocks until it
    finishes.

    **errors**
    Returns an error if the kernel could not be enqueued or failed to execute. */
    fn dispatch(
        &self,
        program: &Self::Program,
        kernel: &str,
        global_work_size: usize,
        buffers: &[&Self::Buffer],
    ) -> Result<()>;
    /// Blocking read of the whole buffer.
    fn download(&self, buffer: &Self::Buffer) -> Result<Vec<u8>>;
}

/// Queryable platform attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum PlatformAttribute {
    #[display(fmt = "name")]
    Name,
    #[display(fmt = "profile")]
    Profile,
    #[display(fmt = "version")]
    Version,
    #[display(fmt = "vendor")]
    Vendor,
    #[display(fmt = "extensions")]
    Extensions,
}

/// Platform info.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlatformInfo {
    pub name: Option<String>,
    pub profile: Option<String>,
    pub version: Option<String>,
    pub vendor: Option<String>,
    pub extensions: Option<Vec<String>>,
}

/// A discovered platform.
pub struct Platform<P> {
    index: usize,
    handle: P,
    info: PlatformInfo,
}

impl<P> Platform<P> {
    /// Position in discovery order.
    pub fn index(&self) -> usize {
        self.index
    }
    pub fn handle(&self) -> &P {
        &self.handle
    }
    pub fn info(&self) -> &PlatformInfo {
        &self.info
    }
}

impl<P> Debug for Platform<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("index", &self.index)
            .field("info", &self.info)
            .finish()
    }
}

/** Device type flags.

A device can report more than one type. */
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceKind {
    cpu: bool,
    gpu: bool,
    accelerator: bool,
}

impl DeviceKind {
    /// No types.
    pub const fn empty() -> Self {
        Self {
            cpu: false,
            gpu: false,
            accelerator: false,
        }
    }
    pub const fn cpu(&self) -> bool {
        self.cpu
    }
    /// Adds `cpu`.
    pub const fn with_cpu(mut self, cpu: bool) -> Self {
        self.cpu = cpu;
        self
    }
    pub const fn gpu(&self) -> bool {
        self.gpu
    }
    /// Adds `gpu`.
    pub const fn with_gpu(mut self, gpu: bool) -> Self {
        self.gpu = gpu;
        self
    }
    pub const fn accelerator(&self) -> bool {
        self.accelerator
    }
    /// Adds `accelerator`.
    pub const fn with_accelerator(mut self, accelerator: bool) -> Self {
        self.accelerator = accelerator;
        self
    }
    /// Labels of the set flags, in the order CPU, GPU, ACCELERATOR.
    pub fn labels(&self) -> impl Iterator<Item = &'static str> {
        [
            (self.cpu, "CPU"),
            (self.gpu, "GPU"),
            (self.accelerator, "ACCELERATOR"),
        ]
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
    }
}

/// Space separated labels, ie "CPU GPU".
impl Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, label) in self.labels().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(label)?;
        }
        Ok(())
    }
}

/// Device info.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub kind: Option<DeviceKind>,
    pub compute_units: Option<u32>,
    pub global_mem_size: Option<u64>,
}

/// A discovered device.
pub struct Device<D> {
    index: usize,
    handle: D,
    info: DeviceInfo,
}

impl<D> Device<D> {
    /// Position within the platform.
    pub fn index(&self) -> usize {
        self.index
    }
    pub fn handle(&self) -> &D {
        &self.handle
    }
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }
}

impl<D> Debug for Device<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("index", &self.index)
            .field("info", &self.info)
            .finish()
    }
}

fn available<T>(what: impl Display, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("{what} unavailable: {e:#}");
            None
        }
    }
}

/** Lists the platforms with their info.

**errors**
Returns an error if the platforms can not be listed. Attribute failures are
not errors. */
pub fn list_platforms<B: Backend>(backend: &B) -> Result<Vec<Platform<B::Platform>>> {
    let handles = backend.platforms()?;
    log::debug!("found {} platforms", handles.len());
    let platforms = handles
        .into_iter()
        .enumerate()
        .map(|(index, handle)| {
            let query = |attribute: PlatformAttribute| {
                available(
                    format_args!("platform[{index}] {attribute}"),
                    backend.platform_attribute(&handle, attribute),
                )
            };
            let info = PlatformInfo {
                name: query(PlatformAttribute::Name),
                profile: query(PlatformAttribute::Profile),
                version: query(PlatformAttribute::Version),
                vendor: query(PlatformAttribute::Vendor),
                extensions: query(PlatformAttribute::Extensions)
                    .map(|x| x.split_whitespace().map(String::from).collect()),
            };
            Platform {
                index,
                handle,
                info,
            }
        })
        .collect();
    Ok(platforms)
}

/** Lists the devices of `platform` with their info.

**errors**
Returns an error if the devices can not be listed. Attribute failures are not
errors. */
pub fn list_devices<B: Backend>(
    backend: &B,
    platform: &Platform<B::Platform>,
) -> Result<Vec<Device<B::Device>>> {
    let handles = backend.devices(platform.handle())?;
    log::debug!(
        "platform[{}] has {} devices",
        platform.index(),
        handles.len()
    );
    let devices = handles
        .into_iter()
        .enumerate()
        .map(|(index, handle)| {
            let what = |attribute: &str| {
                format!("platform[{}] device[{index}] {attribute}", platform.index())
            };
            let info = DeviceInfo {
                name: available(what("name"), backend.device_name(&handle)),
                kind: available(what("type"), backend.device_kind(&handle)),
                compute_units: available(what("units"), backend.device_compute_units(&handle)),
                global_mem_size: available(
                    what("mem"),
                    backend.device_global_mem_size(&handle),
                ),
            };
            Device {
                index,
                handle,
                info,
            }
        })
        .collect();
    Ok(devices)
}
