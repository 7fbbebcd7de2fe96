#![allow(dead_code)]

//! A scripted backend for testing without hardware.

use anyhow::{bail, format_err, Result};
use clprobe::{
    device::{error::BuildFailure, Backend, DeviceEngine, DeviceKind, PlatformAttribute},
    probe::KERNEL_NAME,
    transform::transform_byte,
};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

/// What the device does when self-tested.
#[derive(Clone, Debug)]
pub enum Behavior {
    Correct,
    EngineFails(String),
    BuildFails(String),
    DispatchFails(String),
    /// Writes these bytes instead of the transform.
    Output(Vec<u8>),
    /// Drops the last byte of the output.
    Truncated,
    /// Sleeps before computing the correct output.
    Hangs(Duration),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Engine(String),
    Build(String),
    Upload(String, usize),
    Alloc(String, usize),
    Dispatch(String, usize),
    Download(String),
}

impl Event {
    pub fn device(&self) -> &str {
        match self {
            Self::Engine(x)
            | Self::Build(x)
            | Self::Upload(x, _)
            | Self::Alloc(x, _)
            | Self::Dispatch(x, _)
            | Self::Download(x) => x,
        }
    }
}

pub type Events = Arc<Mutex<Vec<Event>>>;

/// `None` attributes fail to query.
#[derive(Clone, Debug)]
pub struct MockDevice {
    pub id: String,
    pub name: Option<String>,
    pub kind: Option<DeviceKind>,
    pub compute_units: Option<u32>,
    pub global_mem_size: Option<u64>,
    pub behavior: Behavior,
}

impl MockDevice {
    pub fn gpu(name: &str) -> Self {
        Self {
            id: name.into(),
            name: Some(name.into()),
            kind: Some(DeviceKind::empty().with_gpu(true)),
            compute_units: Some(36),
            global_mem_size: Some(8_573_157_376),
            behavior: Behavior::Correct,
        }
    }
    pub fn cpu(name: &str) -> Self {
        Self {
            kind: Some(DeviceKind::empty().with_cpu(true)),
            compute_units: Some(16),
            global_mem_size: Some(32_000_000_000),
            ..Self::gpu(name)
        }
    }
    pub fn behavior(self, behavior: Behavior) -> Self {
        Self { behavior, ..self }
    }
}

/// `None` attributes fail to query, `devices: Err` fails to list.
#[derive(Clone, Debug)]
pub struct MockPlatform {
    pub name: Option<String>,
    pub profile: Option<String>,
    pub version: Option<String>,
    pub vendor: Option<String>,
    pub extensions: Option<String>,
    pub devices: Result<Vec<MockDevice>, String>,
}

impl MockPlatform {
    pub fn new(name: &str, devices: Vec<MockDevice>) -> Self {
        Self {
            name: Some(name.into()),
            profile: Some("FULL_PROFILE".into()),
            version: Some("OpenCL 3.0".into()),
            vendor: Some(format!("{name} vendor")),
            extensions: Some("cl_khr_icd cl_khr_fp64".into()),
            devices: Ok(devices),
        }
    }
}

pub struct MockBackend {
    platforms: Result<Vec<MockPlatform>, String>,
    events: Events,
}

impl MockBackend {
    pub fn new(platforms: Vec<MockPlatform>) -> Self {
        Self {
            platforms: Ok(platforms),
            events: Events::default(),
        }
    }
    pub fn failing(error: &str) -> Self {
        Self {
            platforms: Err(error.into()),
            events: Events::default(),
        }
    }
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
    /// Events of the device with `id`.
    pub fn device_events(&self, id: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|x| x.device() == id)
            .collect()
    }
}

fn attribute<T: Clone>(value: &Option<T>, what: &str) -> Result<T> {
    value
        .clone()
        .ok_or_else(|| format_err!("CL_INVALID_VALUE querying {what}"))
}

impl Backend for MockBackend {
    type Platform = MockPlatform;
    type Device = MockDevice;
    type Engine = MockEngine;
    fn platforms(&self) -> Result<Vec<MockPlatform>> {
        self.platforms.clone().map_err(|e| format_err!(e))
    }
    fn platform_attribute(
        &self,
        platform: &MockPlatform,
        attribute: PlatformAttribute,
    ) -> Result<String> {
        let value = match attribute {
            PlatformAttribute::Name => &platform.name,
            PlatformAttribute::Profile => &platform.profile,
            PlatformAttribute::Version => &platform.version,
            PlatformAttribute::Vendor => &platform.vendor,
            PlatformAttribute::Extensions => &platform.extensions,
        };
        self::attribute(value, &attribute.to_string())
    }
    fn devices(&self, platform: &MockPlatform) -> Result<Vec<MockDevice>> {
        platform.devices.clone().map_err(|e| format_err!(e))
    }
    fn device_name(&self, device: &MockDevice) -> Result<String> {
        attribute(&device.name, "name")
    }
    fn device_kind(&self, device: &MockDevice) -> Result<DeviceKind> {
        attribute(&device.kind, "type")
    }
    fn device_compute_units(&self, device: &MockDevice) -> Result<u32> {
        attribute(&device.compute_units, "units")
    }
    fn device_global_mem_size(&self, device: &MockDevice) -> Result<u64> {
        attribute(&device.global_mem_size, "mem")
    }
    fn engine(&self, _platform: &MockPlatform, device: &MockDevice) -> Result<MockEngine> {
        self.events.lock().push(Event::Engine(device.id.clone()));
        if let Behavior::EngineFails(e) = &device.behavior {
            bail!("{e}");
        }
        Ok(MockEngine {
            device: device.clone(),
            events: self.events.clone(),
        })
    }
}

pub struct MockEngine {
    device: MockDevice,
    events: Events,
}

impl MockEngine {
    pub fn new(device: MockDevice) -> (Self, Events) {
        let events = Events::default();
        let engine = Self {
            device,
            events: events.clone(),
        };
        (engine, events)
    }
    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl DeviceEngine for MockEngine {
    type Program = ();
    type Buffer = Arc<Mutex<Vec<u8>>>;
    fn build_program(&self, src: &str) -> Result<(), BuildFailure> {
        self.push(Event::Build(self.device.id.clone()));
        if let Behavior::BuildFails(log) = &self.device.behavior {
            return Err(BuildFailure::new(log.clone()));
        }
        if !src.contains(KERNEL_NAME) {
            return Err(BuildFailure::new("no kernels"));
        }
        Ok(())
    }
    fn upload(&self, data: &[u8]) -> Result<Self::Buffer> {
        self.push(Event::Upload(self.device.id.clone(), data.len()));
        Ok(Arc::new(Mutex::new(data.to_vec())))
    }
    fn alloc(&self, len: usize) -> Result<Self::Buffer> {
        self.push(Event::Alloc(self.device.id.clone(), len));
        Ok(Arc::new(Mutex::new(vec![0; len])))
    }
    fn dispatch(
        &self,
        _program: &(),
        kernel: &str,
        global_work_size: usize,
        buffers: &[&Self::Buffer],
    ) -> Result<()> {
        self.push(Event::Dispatch(self.device.id.clone(), global_work_size));
        if kernel != KERNEL_NAME {
            bail!("CL_INVALID_KERNEL_NAME");
        }
        let [x, y] = buffers else {
            bail!("CL_INVALID_KERNEL_ARGS");
        };
        let x = x.lock().clone();
        let mut y = y.lock();
        let correct: Vec<u8> = x
            .iter()
            .take(global_work_size)
            .copied()
            .map(transform_byte)
            .collect();
        match &self.device.behavior {
            Behavior::DispatchFails(e) => bail!("{e}"),
            Behavior::Output(output) => *y = output.clone(),
            Behavior::Truncated => *y = correct[..correct.len() - 1].to_vec(),
            Behavior::Hangs(duration) => {
                std::thread::sleep(*duration);
                *y = correct;
            }
            _ => *y = correct,
        }
        Ok(())
    }
    fn download(&self, buffer: &Self::Buffer) -> Result<Vec<u8>> {
        self.push(Event::Download(self.device.id.clone()));
        Ok(buffer.lock().clone())
    }
}
