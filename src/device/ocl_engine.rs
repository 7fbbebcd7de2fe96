use super::{error::BuildFailure, Backend, DeviceEngine, DeviceKind, PlatformAttribute};

use anyhow::{bail, Result};
use ocl::{
    core,
    enums::{DeviceInfo, DeviceInfoResult, PlatformInfo},
    flags::{DeviceType, MemFlags},
    Buffer, Context, Device, Kernel, Platform, Program, Queue,
};

/// The OpenCL installable client driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct OclBackend {
    _m: (),
}

impl OclBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for OclBackend {
    type Platform = Platform;
    type Device = Device;
    type Engine = OclEngine;
    fn platforms(&self) -> Result<Vec<Platform>> {
        let ids = core::get_platform_ids().map_err(ocl::Error::from)?;
        Ok(ids.into_iter().map(Platform::new).collect())
    }
    fn platform_attribute(
        &self,
        platform: &Platform,
        attribute: PlatformAttribute,
    ) -> Result<String> {
        let info = match attribute {
            PlatformAttribute::Name => PlatformInfo::Name,
            PlatformAttribute::Profile => PlatformInfo::Profile,
            PlatformAttribute::Version => PlatformInfo::Version,
            PlatformAttribute::Vendor => PlatformInfo::Vendor,
            PlatformAttribute::Extensions => PlatformInfo::Extensions,
        };
        let result = platform.info(info).map_err(ocl::Error::from)?;
        Ok(result.to_string())
    }
    fn devices(&self, platform: &Platform) -> Result<Vec<Device>> {
        Ok(Device::list_all(platform)?)
    }
    fn device_name(&self, device: &Device) -> Result<String> {
        match device.info(DeviceInfo::Name).map_err(ocl::Error::from)? {
            DeviceInfoResult::Name(name) => Ok(name),
            result => bail!("Unexpected device info {result:?}!"),
        }
    }
    fn device_kind(&self, device: &Device) -> Result<DeviceKind> {
        match device.info(DeviceInfo::Type).map_err(ocl::Error::from)? {
            DeviceInfoResult::Type(ty) => Ok(DeviceKind::empty()
                .with_cpu(ty.contains(DeviceType::CPU))
                .with_gpu(ty.contains(DeviceType::GPU))
                .with_accelerator(ty.contains(DeviceType::ACCELERATOR))),
            result => bail!("Unexpected device info {result:?}!"),
        }
    }
    fn device_compute_units(&self, device: &Device) -> Result<u32> {
        match device.info(DeviceInfo::MaxComputeUnits).map_err(ocl::Error::from)? {
            DeviceInfoResult::MaxComputeUnits(units) => Ok(units),
            result => bail!("Unexpected device info {result:?}!"),
        }
    }
    fn device_global_mem_size(&self, device: &Device) -> Result<u64> {
        match device.info(DeviceInfo::GlobalMemSize).map_err(ocl::Error::from)? {
            DeviceInfoResult::GlobalMemSize(bytes) => Ok(bytes),
            result => bail!("Unexpected device info {result:?}!"),
        }
    }
    fn engine(&self, platform: &Platform, device: &Device) -> Result<OclEngine> {
        let context = Context::builder()
            .platform(*platform)
            .devices(*device)
            .build()?;
        let queue = Queue::new(&context, *device, None)?;
        Ok(OclEngine {
            context,
            device: *device,
            queue,
        })
    }
}

/// A context and in order queue with one device.
pub struct OclEngine {
    context: Context,
    device: Device,
    queue: Queue,
}

impl DeviceEngine for OclEngine {
    type Program = Program;
    type Buffer = Buffer<u8>;
    fn build_program(&self, src: &str) -> Result<Program, BuildFailure> {
        // The build error carries the build log of each device.
        Program::builder()
            .src(src)
            .devices(self.device)
            .build(&self.context)
            .map_err(|e| BuildFailure::new(e.to_string()))
    }
    fn upload(&self, data: &[u8]) -> Result<Buffer<u8>> {
        let buffer = Buffer::builder()
            .queue(self.queue.clone())
            .flags(MemFlags::READ_ONLY)
            .len(data.len())
            .copy_host_slice(data)
            .build()?;
        Ok(buffer)
    }
    fn alloc(&self, len: usize) -> Result<Buffer<u8>> {
        let zeros = vec![0u8; len];
        let buffer = Buffer::builder()
            .queue(self.queue.clone())
            .flags(MemFlags::WRITE_ONLY)
            .len(len)
            .copy_host_slice(&zeros)
            .build()?;
        Ok(buffer)
    }
    fn dispatch(
        &self,
        program: &Program,
        kernel: &str,
        global_work_size: usize,
        buffers: &[&Buffer<u8>],
    ) -> Result<()> {
        let mut builder = Kernel::builder();
        builder
            .program(program)
            .name(kernel)
            .queue(self.queue.clone())
            .global_work_size(global_work_size)
            .local_work_size(1usize);
        for buffer in buffers.iter().copied() {
            builder.arg(buffer);
        }
        let kernel = builder.build()?;
        unsafe {
            kernel.enq()?;
        }
        self.queue.finish()?;
        Ok(())
    }
    fn download(&self, buffer: &Buffer<u8>) -> Result<Vec<u8>> {
        let mut data = vec![0u8; buffer.len()];
        buffer.read(&mut data).enq()?;
        self.queue.finish()?;
        Ok(data)
    }
}
